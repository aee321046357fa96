// 🧠 In-Memory Store
// Mutex-guarded tables; each unit of work edits a private copy

use super::{ParkingStore, UnitOfWork};
use crate::error::{EngineResult, StorageError};
use crate::models::{
    Facility, NewFacility, NewReceipt, NewStay, NewTariff, Receipt, Stay, StayState, Tariff,
    VehicleType,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct Tables {
    facilities: Vec<Facility>,
    tariffs: Vec<Tariff>,
    stays: Vec<Stay>,
    receipts: Vec<Receipt>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Store kept entirely in process memory.
///
/// The lock is held for the whole unit of work, so units are serialized.
/// Work runs against a clone of the tables which replaces the originals
/// only on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParkingStore for MemoryStore {
    fn atomically<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
    {
        let mut committed = self.tables.lock().map_err(|_| StorageError::Poisoned)?;
        let mut scratch = committed.clone();

        let value = work(&mut scratch)?;
        *committed = scratch;
        Ok(value)
    }
}

impl UnitOfWork for Tables {
    fn facility(&mut self, id: i64) -> EngineResult<Option<Facility>> {
        Ok(self.facilities.iter().find(|f| f.id == id).cloned())
    }

    fn insert_facility(&mut self, facility: &NewFacility, created_at: DateTime<Utc>) -> EngineResult<Facility> {
        let facility = Facility {
            id: self.next_id(),
            name: facility.name.clone(),
            capacity: facility.capacity.clone(),
            created_at,
        };
        self.facilities.push(facility.clone());
        Ok(facility)
    }

    fn tariff(&mut self, id: i64) -> EngineResult<Option<Tariff>> {
        Ok(self.tariffs.iter().find(|t| t.id == id).cloned())
    }

    fn tariffs_for(&mut self, facility_id: i64, vehicle_type: VehicleType) -> EngineResult<Vec<Tariff>> {
        // ids are handed out in increasing order, so insertion order is id order
        Ok(self
            .tariffs
            .iter()
            .filter(|t| t.facility_id == facility_id && t.vehicle_type == vehicle_type)
            .cloned()
            .collect())
    }

    fn insert_tariff(&mut self, tariff: &NewTariff, created_at: DateTime<Utc>) -> EngineResult<Tariff> {
        let tariff = Tariff {
            id: self.next_id(),
            facility_id: tariff.facility_id,
            vehicle_type: tariff.vehicle_type,
            base_rate: tariff.base_rate,
            base_hours: tariff.base_hours,
            hourly_rate: tariff.hourly_rate,
            daily_rate: tariff.daily_rate,
            daily_rate_hours: tariff.daily_rate_hours,
            created_at,
        };
        self.tariffs.push(tariff.clone());
        Ok(tariff)
    }

    fn stay(&mut self, id: i64) -> EngineResult<Option<Stay>> {
        Ok(self.stays.iter().find(|s| s.id == id).cloned())
    }

    fn insert_stay(&mut self, stay: &NewStay) -> EngineResult<Stay> {
        let stay = Stay {
            id: self.next_id(),
            facility_id: stay.facility_id,
            vehicle_type: stay.vehicle_type,
            license_plate: stay.license_plate.clone(),
            entry_time: stay.entry_time,
            state: StayState::Active,
        };
        self.stays.push(stay.clone());
        Ok(stay)
    }

    fn close_stay(&mut self, id: i64, exit_time: DateTime<Utc>) -> EngineResult<bool> {
        match self.stays.iter_mut().find(|s| s.id == id && s.is_active()) {
            Some(stay) => {
                stay.state = StayState::Closed { exit_time };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count_active(&mut self, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, u32>> {
        let mut counts = BTreeMap::new();
        for stay in self
            .stays
            .iter()
            .filter(|s| s.facility_id == facility_id && s.is_active())
        {
            *counts.entry(stay.vehicle_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn insert_receipt(&mut self, receipt: &NewReceipt) -> EngineResult<Receipt> {
        if self.receipts.iter().any(|r| r.stay_id == receipt.stay_id) {
            return Err(StorageError::Constraint(format!(
                "receipt already exists for stay {}",
                receipt.stay_id
            ))
            .into());
        }

        let receipt = Receipt {
            id: self.next_id(),
            receipt_number: uuid::Uuid::new_v4().to_string(),
            stay_id: receipt.stay_id,
            entry_time: receipt.entry_time,
            exit_time: receipt.exit_time,
            duration: receipt.duration.clone(),
            fee: receipt.fee,
        };
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    fn receipt_for_stay(&mut self, stay_id: i64) -> EngineResult<Option<Receipt>> {
        Ok(self.receipts.iter().find(|r| r.stay_id == stay_id).cloned())
    }
}

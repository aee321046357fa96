// 🚦 Parking Engine - Admission, Exit & Billing
// Each operation is exactly one unit of work against the store

use crate::availability;
use crate::error::{EngineError, EngineResult, StorageError};
use crate::models::{
    Facility, NewFacility, NewReceipt, NewStay, NewTariff, Receipt, Stay, StayState, Tariff,
    VehicleType,
};
use crate::pricing;
use crate::store::ParkingStore;
use crate::tariff;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for entry and exit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ParkingEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: ParkingStore> ParkingEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        ParkingEngine { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Facilities
    // ------------------------------------------------------------------------

    pub fn create_facility(&self, facility: NewFacility) -> EngineResult<Facility> {
        facility.validate()?;

        let created = self
            .store
            .atomically(|uow| uow.insert_facility(&facility, self.clock.now()))?;

        info!(facility_id = created.id, name = %created.name, "parking lot created");
        Ok(created)
    }

    pub fn get_facility(&self, facility_id: i64) -> EngineResult<Facility> {
        self.store
            .atomically(|uow| uow.facility(facility_id))?
            .ok_or(EngineError::FacilityNotFound { facility_id })
    }

    pub fn get_available_spots(&self, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, i64>> {
        self.store
            .atomically(|uow| availability::available_spots(uow, facility_id))
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Create an active stay if a spot of the vehicle's type is free.
    ///
    /// The availability check and the insert share one unit of work, so
    /// concurrent admissions can never oversell a facility.
    pub fn admit(&self, facility_id: i64, vehicle_type: VehicleType, license_plate: &str) -> EngineResult<Stay> {
        let license_plate = license_plate.trim();
        if license_plate.is_empty() {
            return Err(EngineError::invalid("license plate is empty"));
        }

        let result = self.store.atomically(|uow| {
            let available = availability::available_spots(uow, facility_id)?;
            if available.get(&vehicle_type).copied().unwrap_or(0) <= 0 {
                return Err(EngineError::NoAvailableSpots {
                    facility_id,
                    vehicle_type,
                });
            }

            uow.insert_stay(&NewStay {
                facility_id,
                vehicle_type,
                license_plate: license_plate.to_string(),
                entry_time: self.clock.now(),
            })
        });

        match &result {
            Ok(stay) => info!(
                stay_id = stay.id,
                facility_id,
                %vehicle_type,
                license_plate,
                "vehicle admitted"
            ),
            Err(EngineError::NoAvailableSpots { .. }) => {
                warn!(facility_id, %vehicle_type, license_plate, "admission refused: lot full")
            }
            Err(_) => {}
        }

        result
    }

    // ------------------------------------------------------------------------
    // Exit & receipts
    // ------------------------------------------------------------------------

    /// Close a stay, bill it and issue its receipt.
    ///
    /// The stay is closed only if the receipt can be issued in the same unit
    /// of work. A stay that is already closed is never touched again.
    pub fn exit(&self, stay_id: i64) -> EngineResult<(Stay, Receipt)> {
        let (stay, receipt) = self.store.atomically(|uow| {
            let stay = uow
                .stay(stay_id)?
                .ok_or(EngineError::StayNotFound { stay_id })?;
            if !stay.is_active() {
                return Err(EngineError::AlreadyExited { stay_id });
            }

            let exit_time = self.clock.now().max(stay.entry_time);
            if !uow.close_stay(stay_id, exit_time)? {
                return Err(EngineError::AlreadyExited { stay_id });
            }
            let stay = Stay {
                state: StayState::Closed { exit_time },
                ..stay
            };

            let tariff = tariff::resolve_tariff(uow, stay.facility_id, stay.vehicle_type)?;
            let fee = pricing::compute_fee(&stay, &tariff)?;

            let receipt = uow.insert_receipt(&NewReceipt {
                stay_id,
                entry_time: stay.entry_time,
                exit_time,
                duration: pricing::format_duration(exit_time - stay.entry_time),
                fee,
            })?;

            Ok((stay, receipt))
        })?;

        info!(
            stay_id,
            receipt = %receipt.receipt_number,
            fee = %receipt.fee,
            duration = %receipt.duration,
            "vehicle exited"
        );
        Ok((stay, receipt))
    }

    /// Fee of a closed stay: the billed amount when a receipt exists,
    /// otherwise computed from the current tariff.
    pub fn calculate_fee(&self, stay_id: i64) -> EngineResult<Decimal> {
        self.store.atomically(|uow| {
            let stay = uow
                .stay(stay_id)?
                .ok_or(EngineError::StayNotFound { stay_id })?;
            if stay.is_active() {
                return Err(EngineError::VehicleNotExited { stay_id });
            }

            if let Some(receipt) = uow.receipt_for_stay(stay_id)? {
                return Ok(receipt.fee);
            }

            let tariff = tariff::resolve_tariff(uow, stay.facility_id, stay.vehicle_type)?;
            pricing::compute_fee(&stay, &tariff)
        })
    }

    pub fn get_stay(&self, stay_id: i64) -> EngineResult<Stay> {
        self.store
            .atomically(|uow| uow.stay(stay_id))?
            .ok_or(EngineError::StayNotFound { stay_id })
    }

    pub fn get_receipt(&self, stay_id: i64) -> EngineResult<Receipt> {
        self.store.atomically(|uow| {
            let stay = uow
                .stay(stay_id)?
                .ok_or(EngineError::StayNotFound { stay_id })?;
            if stay.is_active() {
                return Err(EngineError::VehicleNotExited { stay_id });
            }

            uow.receipt_for_stay(stay_id)?.ok_or_else(|| {
                StorageError::Corrupt {
                    table: "receipts",
                    message: format!("closed stay {stay_id} has no receipt"),
                }
                .into()
            })
        })
    }

    // ------------------------------------------------------------------------
    // Tariffs
    // ------------------------------------------------------------------------

    pub fn create_tariff(&self, new_tariff: NewTariff) -> EngineResult<Tariff> {
        let created = self
            .store
            .atomically(|uow| tariff::register_tariff(uow, &new_tariff, self.clock.now()))?;

        info!(
            tariff_id = created.id,
            facility_id = created.facility_id,
            vehicle_type = %created.vehicle_type,
            "tariff created"
        );
        Ok(created)
    }

    pub fn get_tariff(&self, tariff_id: i64) -> EngineResult<Tariff> {
        self.store
            .atomically(|uow| uow.tariff(tariff_id))?
            .ok_or(EngineError::UnknownTariff { tariff_id })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    /// Clock that only moves when told to
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(ManualClock(Mutex::new(
                Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
            )))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn setup(capacity: &[(VehicleType, u32)]) -> (ParkingEngine<MemoryStore>, Arc<ManualClock>, Facility) {
        let clock = ManualClock::new();
        let engine = ParkingEngine::with_clock(MemoryStore::new(), clock.clone());
        let lot = engine
            .create_facility(NewFacility {
                name: "Central".to_string(),
                capacity: capacity.iter().copied().collect(),
            })
            .unwrap();
        (engine, clock, lot)
    }

    fn car_tariff(facility_id: i64) -> NewTariff {
        NewTariff {
            facility_id,
            vehicle_type: VehicleType::CarSUV,
            base_rate: dec("10.00"),
            base_hours: 2,
            hourly_rate: dec("5.00"),
            daily_rate: Decimal::ZERO,
            daily_rate_hours: 0,
        }
    }

    #[test]
    fn test_admission_gating() {
        let (engine, _clock, lot) = setup(&[(VehicleType::CarSUV, 1)]);

        let first = engine.admit(lot.id, VehicleType::CarSUV, "CAR-1").unwrap();
        assert!(first.is_active());

        let second = engine.admit(lot.id, VehicleType::CarSUV, "CAR-2");
        assert!(matches!(second, Err(EngineError::NoAvailableSpots { .. })));

        let spots = engine.get_available_spots(lot.id).unwrap();
        assert_eq!(spots, BTreeMap::from([(VehicleType::CarSUV, 0)]));
    }

    #[test]
    fn test_admission_rejections() {
        let (engine, _clock, lot) = setup(&[(VehicleType::CarSUV, 3)]);

        assert!(matches!(
            engine.admit(lot.id + 100, VehicleType::CarSUV, "X"),
            Err(EngineError::FacilityNotFound { .. })
        ));
        assert!(matches!(
            engine.admit(lot.id, VehicleType::BusTruck, "BUS-1"),
            Err(EngineError::NoAvailableSpots { .. })
        ));
        assert!(matches!(
            engine.admit(lot.id, VehicleType::CarSUV, "   "),
            Err(EngineError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.get_available_spots(lot.id + 100),
            Err(EngineError::FacilityNotFound { .. })
        ));
    }

    #[test]
    fn test_exit_bills_and_frees_the_spot() {
        let (engine, clock, lot) = setup(&[(VehicleType::CarSUV, 1)]);
        engine.create_tariff(car_tariff(lot.id)).unwrap();

        let stay = engine.admit(lot.id, VehicleType::CarSUV, "CAR-1").unwrap();
        clock.advance(Duration::hours(2) + Duration::minutes(30));

        let (closed, receipt) = engine.exit(stay.id).unwrap();
        let exit_time = stay.entry_time + Duration::minutes(150);

        assert_eq!(closed.exit_time(), Some(exit_time));
        assert_eq!(receipt.stay_id, stay.id);
        assert_eq!(receipt.entry_time, stay.entry_time);
        assert_eq!(receipt.exit_time, exit_time);
        assert_eq!(receipt.duration, "2h 30m 0s");
        assert_eq!(receipt.fee, dec("15.00"));

        assert_eq!(engine.get_available_spots(lot.id).unwrap()[&VehicleType::CarSUV], 1);
        assert!(engine.admit(lot.id, VehicleType::CarSUV, "CAR-2").is_ok());
    }

    #[test]
    fn test_exit_twice_keeps_first_exit() {
        let (engine, clock, lot) = setup(&[(VehicleType::CarSUV, 2)]);
        engine.create_tariff(car_tariff(lot.id)).unwrap();

        let stay = engine.admit(lot.id, VehicleType::CarSUV, "CAR-1").unwrap();
        clock.advance(Duration::minutes(45));
        let (first, receipt) = engine.exit(stay.id).unwrap();

        clock.advance(Duration::hours(5));
        let second = engine.exit(stay.id);
        assert!(matches!(second, Err(EngineError::AlreadyExited { .. })));

        let stored = engine.get_stay(stay.id).unwrap();
        assert_eq!(stored.exit_time(), first.exit_time());
        assert_eq!(engine.get_receipt(stay.id).unwrap(), receipt);
    }

    #[test]
    fn test_exit_without_tariff_leaves_stay_active() {
        let (engine, clock, lot) = setup(&[(VehicleType::MotorcycleScooter, 1)]);

        let stay = engine
            .admit(lot.id, VehicleType::MotorcycleScooter, "MOTO-1")
            .unwrap();
        clock.advance(Duration::hours(1));

        assert!(matches!(
            engine.exit(stay.id),
            Err(EngineError::TariffNotFound { .. })
        ));
        assert!(engine.get_stay(stay.id).unwrap().is_active());

        engine
            .create_tariff(NewTariff {
                facility_id: lot.id,
                vehicle_type: VehicleType::MotorcycleScooter,
                base_rate: Decimal::ZERO,
                base_hours: 0,
                hourly_rate: dec("2.00"),
                daily_rate: Decimal::ZERO,
                daily_rate_hours: 0,
            })
            .unwrap();
        let (_, receipt) = engine.exit(stay.id).unwrap();
        assert_eq!(receipt.fee, dec("2.00"));
    }

    #[test]
    fn test_oversized_fee_rejects_exit_and_store_stays_usable() {
        let (engine, clock, lot) = setup(&[(VehicleType::CarSUV, 2)]);
        let mut tariff = car_tariff(lot.id);
        tariff.hourly_rate = dec("10000000000000000000000000000");
        engine.create_tariff(tariff).unwrap();

        let stay = engine.admit(lot.id, VehicleType::CarSUV, "CAR-1").unwrap();
        clock.advance(Duration::hours(10));

        assert!(matches!(
            engine.exit(stay.id),
            Err(EngineError::InvalidInput { .. })
        ));
        assert!(engine.get_stay(stay.id).unwrap().is_active());

        let next = engine.admit(lot.id, VehicleType::CarSUV, "CAR-2").unwrap();
        assert!(next.is_active());
        assert_eq!(engine.get_available_spots(lot.id).unwrap()[&VehicleType::CarSUV], 0);
    }

    #[test]
    fn test_tariff_lookup_by_id() {
        let (engine, _clock, lot) = setup(&[(VehicleType::CarSUV, 1)]);
        let created = engine.create_tariff(car_tariff(lot.id)).unwrap();

        assert_eq!(engine.get_tariff(created.id).unwrap(), created);
        assert!(matches!(
            engine.get_tariff(created.id + 100),
            Err(EngineError::UnknownTariff { tariff_id }) if tariff_id == created.id + 100
        ));
    }

    #[test]
    fn test_bus_daily_billing_end_to_end() {
        let (engine, clock, lot) = setup(&[(VehicleType::BusTruck, 1)]);
        engine
            .create_tariff(NewTariff {
                facility_id: lot.id,
                vehicle_type: VehicleType::BusTruck,
                base_rate: Decimal::ZERO,
                base_hours: 0,
                hourly_rate: dec("3.00"),
                daily_rate: dec("50.00"),
                daily_rate_hours: 24,
            })
            .unwrap();

        let stay = engine.admit(lot.id, VehicleType::BusTruck, "BUS-7").unwrap();
        clock.advance(Duration::hours(30));
        let (_, receipt) = engine.exit(stay.id).unwrap();

        assert_eq!(receipt.fee, dec("122.00"));
        assert_eq!(engine.calculate_fee(stay.id).unwrap(), dec("122.00"));
    }

    #[test]
    fn test_fee_and_receipt_lookups() {
        let (engine, _clock, lot) = setup(&[(VehicleType::CarSUV, 1)]);
        let stay = engine.admit(lot.id, VehicleType::CarSUV, "CAR-1").unwrap();

        assert!(matches!(
            engine.calculate_fee(stay.id),
            Err(EngineError::VehicleNotExited { .. })
        ));
        assert!(matches!(
            engine.get_receipt(stay.id),
            Err(EngineError::VehicleNotExited { .. })
        ));
        assert!(matches!(
            engine.exit(stay.id + 100),
            Err(EngineError::StayNotFound { .. })
        ));
        assert!(matches!(
            engine.get_stay(stay.id + 100),
            Err(EngineError::StayNotFound { .. })
        ));
    }

    #[test]
    fn test_registration_validates_input() {
        let (engine, _clock, lot) = setup(&[(VehicleType::CarSUV, 1)]);

        let empty = engine.create_facility(NewFacility {
            name: "Empty".to_string(),
            capacity: BTreeMap::new(),
        });
        assert!(matches!(empty, Err(EngineError::InvalidInput { .. })));

        let mut negative = car_tariff(lot.id);
        negative.base_rate = dec("-1.00");
        assert!(matches!(
            engine.create_tariff(negative),
            Err(EngineError::InvalidInput { .. })
        ));

        assert!(matches!(
            engine.create_tariff(car_tariff(lot.id + 100)),
            Err(EngineError::FacilityNotFound { .. })
        ));
        assert_eq!(engine.get_facility(lot.id).unwrap(), lot);
    }
}

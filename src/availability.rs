// 📊 Occupancy & Availability
// Free spots are always derived from active stays, never stored

use crate::error::{EngineError, EngineResult};
use crate::models::{Facility, VehicleType};
use crate::store::UnitOfWork;
use std::collections::BTreeMap;

/// Active stays per vehicle type at a facility.
pub fn occupancy(uow: &mut dyn UnitOfWork, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, u32>> {
    uow.count_active(facility_id)
}

/// Capacity minus occupancy for every type the facility declares.
///
/// Negative values mean the facility is oversold.
pub fn free_spots(facility: &Facility, occupied: &BTreeMap<VehicleType, u32>) -> BTreeMap<VehicleType, i64> {
    facility
        .capacity
        .iter()
        .map(|(vehicle_type, capacity)| {
            let taken = occupied.get(vehicle_type).copied().unwrap_or(0);
            (*vehicle_type, i64::from(*capacity) - i64::from(taken))
        })
        .collect()
}

pub fn available_spots(uow: &mut dyn UnitOfWork, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, i64>> {
    let facility = uow
        .facility(facility_id)?
        .ok_or(EngineError::FacilityNotFound { facility_id })?;
    let occupied = occupancy(uow, facility_id)?;

    Ok(free_spots(&facility, &occupied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn facility(capacity: &[(VehicleType, u32)]) -> Facility {
        Facility {
            id: 1,
            name: "Harbour".to_string(),
            capacity: capacity.iter().copied().collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_spots_covers_declared_types_only() {
        let lot = facility(&[(VehicleType::CarSUV, 10), (VehicleType::BusTruck, 2)]);
        let occupied = BTreeMap::from([
            (VehicleType::CarSUV, 4),
            (VehicleType::MotorcycleScooter, 3),
        ]);

        let free = free_spots(&lot, &occupied);
        assert_eq!(
            free,
            BTreeMap::from([(VehicleType::CarSUV, 6), (VehicleType::BusTruck, 2)])
        );
    }

    #[test]
    fn test_oversold_facility_reports_negative() {
        let lot = facility(&[(VehicleType::MotorcycleScooter, 1)]);
        let occupied = BTreeMap::from([(VehicleType::MotorcycleScooter, 3)]);

        assert_eq!(free_spots(&lot, &occupied)[&VehicleType::MotorcycleScooter], -2);
    }
}

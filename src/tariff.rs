// 🏷️ Tariff Lookup & Registration

use crate::error::{EngineError, EngineResult};
use crate::models::{NewTariff, Tariff, VehicleType};
use crate::store::UnitOfWork;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Resolve the tariff billing a vehicle type at a facility.
///
/// Several tariffs may be registered for the same pair. The most recently
/// created one (highest identity) wins.
pub fn resolve_tariff(
    uow: &mut dyn UnitOfWork,
    facility_id: i64,
    vehicle_type: VehicleType,
) -> EngineResult<Tariff> {
    let candidates = uow.tariffs_for(facility_id, vehicle_type)?;
    let count = candidates.len();

    let tariff = candidates
        .into_iter()
        .max_by_key(|t| t.id)
        .ok_or(EngineError::TariffNotFound {
            facility_id,
            vehicle_type,
        })?;

    debug!(facility_id, %vehicle_type, tariff_id = tariff.id, candidates = count, "tariff resolved");
    Ok(tariff)
}

/// Persist a tariff for an existing facility. Duplicates are allowed and
/// shadow older tariffs for the same pair.
pub fn register_tariff(
    uow: &mut dyn UnitOfWork,
    tariff: &NewTariff,
    now: DateTime<Utc>,
) -> EngineResult<Tariff> {
    tariff.validate()?;

    if uow.facility(tariff.facility_id)?.is_none() {
        return Err(EngineError::FacilityNotFound {
            facility_id: tariff.facility_id,
        });
    }

    uow.insert_tariff(tariff, now)
}

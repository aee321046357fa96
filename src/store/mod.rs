// 🗄️ Persistence Boundary
// The engine only ever talks to storage through a unit of work

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::EngineResult;
use crate::models::{
    Facility, NewFacility, NewReceipt, NewStay, NewTariff, Receipt, Stay, Tariff, VehicleType,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Operations available inside one atomic unit of work.
///
/// Everything read through a unit of work reflects a single consistent
/// snapshot, and everything written becomes visible together or not at all.
pub trait UnitOfWork {
    fn facility(&mut self, id: i64) -> EngineResult<Option<Facility>>;

    fn insert_facility(&mut self, facility: &NewFacility, created_at: DateTime<Utc>) -> EngineResult<Facility>;

    fn tariff(&mut self, id: i64) -> EngineResult<Option<Tariff>>;

    /// All tariffs for the pair, ordered by identity ascending.
    fn tariffs_for(&mut self, facility_id: i64, vehicle_type: VehicleType) -> EngineResult<Vec<Tariff>>;

    fn insert_tariff(&mut self, tariff: &NewTariff, created_at: DateTime<Utc>) -> EngineResult<Tariff>;

    fn stay(&mut self, id: i64) -> EngineResult<Option<Stay>>;

    fn insert_stay(&mut self, stay: &NewStay) -> EngineResult<Stay>;

    /// Set the exit time of an active stay.
    ///
    /// Returns false, changing nothing, when the stay is missing or already
    /// closed.
    fn close_stay(&mut self, id: i64, exit_time: DateTime<Utc>) -> EngineResult<bool>;

    /// Active stays at a facility, grouped by vehicle type. Types with no
    /// active stay are absent.
    fn count_active(&mut self, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, u32>>;

    fn insert_receipt(&mut self, receipt: &NewReceipt) -> EngineResult<Receipt>;

    fn receipt_for_stay(&mut self, stay_id: i64) -> EngineResult<Option<Receipt>>;
}

/// A shared store the engine can run serializable units of work against.
pub trait ParkingStore: Send + Sync {
    /// Run `work` atomically. Its writes are committed when it returns `Ok`
    /// and discarded when it returns `Err`.
    fn atomically<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>;
}

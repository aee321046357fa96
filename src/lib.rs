// Parking Engine - Core Library
// Allocation and billing for parking facilities; used by the CLI, the API
// server and the tests

pub mod availability;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pricing;
pub mod store;
pub mod tariff;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Clock, ParkingEngine, SystemClock};
pub use error::{EngineError, EngineResult, StorageError};
pub use models::{
    Facility, NewFacility, NewTariff, Receipt, Stay, StayState, Tariff, VehicleType,
};
pub use pricing::{billable_hours, compute_fee, round_money, PricingRule};
pub use store::{MemoryStore, ParkingStore, SqliteStore, UnitOfWork};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

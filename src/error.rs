// ⚠️ Engine Errors
// Domain outcomes callers branch on, kept apart from storage failures

use crate::models::VehicleType;
use thiserror::Error;

// ============================================================================
// STORAGE ERRORS
// ============================================================================

/// Failures of the persistence layer itself.
///
/// These are never folded into the domain taxonomy below. Callers decide
/// whether to retry or give up; the engine performs no retries of its own.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt {table} row: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

// ============================================================================
// ENGINE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parking lot not found: {facility_id}")]
    FacilityNotFound { facility_id: i64 },

    #[error("parking entry not found: {stay_id}")]
    StayNotFound { stay_id: i64 },

    #[error("tariff not found for parking lot {facility_id} and vehicle type {vehicle_type}")]
    TariffNotFound {
        facility_id: i64,
        vehicle_type: VehicleType,
    },

    #[error("tariff not found: {tariff_id}")]
    UnknownTariff { tariff_id: i64 },

    #[error("no available spots for {vehicle_type} in parking lot {facility_id}")]
    NoAvailableSpots {
        facility_id: i64,
        vehicle_type: VehicleType,
    },

    #[error("vehicle has already exited (entry {stay_id})")]
    AlreadyExited { stay_id: i64 },

    #[error("vehicle has not exited yet (entry {stay_id})")]
    VehicleNotExited { stay_id: i64 },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
        }
    }

    /// True for the expected outcomes of the taxonomy, false for storage failures.
    pub fn is_domain(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(StorageError::Sqlite(err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// 🗃️ SQLite Store - rusqlite + WAL
// Every unit of work is a BEGIN IMMEDIATE transaction, so the write lock is
// taken before the first read and admissions cannot interleave.

use super::{ParkingStore, UnitOfWork};
use crate::error::{EngineResult, StorageError};
use crate::models::{
    Facility, NewFacility, NewReceipt, NewStay, NewTariff, Receipt, Stay, StayState, Tariff,
    VehicleType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Backing {
    /// A fresh connection per unit of work, shared through the file
    File(PathBuf),

    /// One private connection, for tests and throwaway runs
    Memory(Mutex<Connection>),
}

pub struct SqliteStore {
    backing: Backing,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) a database file and bootstrap the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let store = SqliteStore {
            backing: Backing::File(path.clone()),
            busy_timeout,
        };

        let conn = store.connect(&path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        setup_schema(&conn)?;
        debug!(path = %path.display(), journal_mode = %mode, "sqlite store opened");

        Ok(store)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        setup_schema(&conn)?;

        Ok(SqliteStore {
            backing: Backing::Memory(Mutex::new(conn)),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    fn connect(&self, path: &Path) -> EngineResult<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

impl ParkingStore for SqliteStore {
    fn atomically<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
    {
        match &self.backing {
            Backing::File(path) => {
                let mut conn = self.connect(path)?;
                run_unit(&mut conn, work)
            }
            Backing::Memory(conn) => {
                let mut conn = conn.lock().map_err(|_| StorageError::Poisoned)?;
                run_unit(&mut conn, work)
            }
        }
    }
}

fn run_unit<T, F>(conn: &mut Connection, work: F) -> EngineResult<T>
where
    F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
{
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Dropping tx on the error path rolls back
    let value = work(&mut tx)?;
    tx.commit()?;
    Ok(value)
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS parking_lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            capacity TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tariffs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parking_lot_id INTEGER NOT NULL REFERENCES parking_lots(id),
            vehicle_type TEXT NOT NULL,
            base_rate TEXT NOT NULL,
            base_hours INTEGER NOT NULL,
            hourly_rate TEXT NOT NULL,
            daily_rate TEXT NOT NULL,
            daily_rate_hours INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS parking_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parking_lot_id INTEGER NOT NULL REFERENCES parking_lots(id),
            vehicle_type TEXT NOT NULL,
            license_plate TEXT NOT NULL,
            entry_time TEXT NOT NULL,
            exit_time TEXT
        );

        CREATE TABLE IF NOT EXISTS receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_number TEXT UNIQUE NOT NULL,
            parking_entry_id INTEGER UNIQUE NOT NULL REFERENCES parking_entries(id),
            entry_time TEXT NOT NULL,
            exit_time TEXT NOT NULL,
            duration TEXT NOT NULL,
            fee TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tariffs_lookup
            ON tariffs(parking_lot_id, vehicle_type);

        CREATE INDEX IF NOT EXISTS idx_entries_active
            ON parking_entries(parking_lot_id, vehicle_type)
            WHERE exit_time IS NULL;",
    )
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

const FACILITY_COLUMNS: &str = "id, name, capacity, created_at";
const TARIFF_COLUMNS: &str = "id, parking_lot_id, vehicle_type, base_rate, base_hours,
    hourly_rate, daily_rate, daily_rate_hours, created_at";
const STAY_COLUMNS: &str = "id, parking_lot_id, vehicle_type, license_plate, entry_time, exit_time";
const RECEIPT_COLUMNS: &str =
    "id, receipt_number, parking_entry_id, entry_time, exit_time, duration, fee";

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    raw.parse::<Decimal>().map_err(|e| conversion_error(idx, e))
}

fn get_vehicle_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<VehicleType> {
    let raw: String = row.get(idx)?;
    raw.parse::<VehicleType>()
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn facility_from_row(row: &Row<'_>) -> rusqlite::Result<Facility> {
    let capacity_json: String = row.get(2)?;
    let capacity: BTreeMap<VehicleType, u32> =
        serde_json::from_str(&capacity_json).map_err(|e| conversion_error(2, e))?;

    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        capacity,
        created_at: get_time(row, 3)?,
    })
}

fn tariff_from_row(row: &Row<'_>) -> rusqlite::Result<Tariff> {
    Ok(Tariff {
        id: row.get(0)?,
        facility_id: row.get(1)?,
        vehicle_type: get_vehicle_type(row, 2)?,
        base_rate: get_decimal(row, 3)?,
        base_hours: row.get(4)?,
        hourly_rate: get_decimal(row, 5)?,
        daily_rate: get_decimal(row, 6)?,
        daily_rate_hours: row.get(7)?,
        created_at: get_time(row, 8)?,
    })
}

fn stay_from_row(row: &Row<'_>) -> rusqlite::Result<Stay> {
    let exit_time: Option<String> = row.get(5)?;
    let state = match exit_time {
        None => StayState::Active,
        Some(_) => StayState::Closed {
            exit_time: get_time(row, 5)?,
        },
    };

    Ok(Stay {
        id: row.get(0)?,
        facility_id: row.get(1)?,
        vehicle_type: get_vehicle_type(row, 2)?,
        license_plate: row.get(3)?,
        entry_time: get_time(row, 4)?,
        state,
    })
}

fn receipt_from_row(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: row.get(0)?,
        receipt_number: row.get(1)?,
        stay_id: row.get(2)?,
        entry_time: get_time(row, 3)?,
        exit_time: get_time(row, 4)?,
        duration: row.get(5)?,
        fee: get_decimal(row, 6)?,
    })
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

impl UnitOfWork for Transaction<'_> {
    fn facility(&mut self, id: i64) -> EngineResult<Option<Facility>> {
        let sql = format!("SELECT {FACILITY_COLUMNS} FROM parking_lots WHERE id = ?1");
        Ok(self.query_row(&sql, [id], facility_from_row).optional()?)
    }

    fn insert_facility(&mut self, facility: &NewFacility, created_at: DateTime<Utc>) -> EngineResult<Facility> {
        let capacity_json = serde_json::to_string(&facility.capacity).map_err(|e| {
            StorageError::Corrupt {
                table: "parking_lots",
                message: e.to_string(),
            }
        })?;

        self.execute(
            "INSERT INTO parking_lots (name, capacity, created_at) VALUES (?1, ?2, ?3)",
            params![facility.name, capacity_json, created_at.to_rfc3339()],
        )?;

        Ok(Facility {
            id: self.last_insert_rowid(),
            name: facility.name.clone(),
            capacity: facility.capacity.clone(),
            created_at,
        })
    }

    fn tariff(&mut self, id: i64) -> EngineResult<Option<Tariff>> {
        let sql = format!("SELECT {TARIFF_COLUMNS} FROM tariffs WHERE id = ?1");
        Ok(self.query_row(&sql, [id], tariff_from_row).optional()?)
    }

    fn tariffs_for(&mut self, facility_id: i64, vehicle_type: VehicleType) -> EngineResult<Vec<Tariff>> {
        let sql = format!(
            "SELECT {TARIFF_COLUMNS} FROM tariffs
             WHERE parking_lot_id = ?1 AND vehicle_type = ?2
             ORDER BY id"
        );
        let mut stmt = self.prepare(&sql)?;
        let tariffs = stmt
            .query_map(params![facility_id, vehicle_type.as_str()], tariff_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tariffs)
    }

    fn insert_tariff(&mut self, tariff: &NewTariff, created_at: DateTime<Utc>) -> EngineResult<Tariff> {
        self.execute(
            "INSERT INTO tariffs (
                parking_lot_id, vehicle_type, base_rate, base_hours,
                hourly_rate, daily_rate, daily_rate_hours, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tariff.facility_id,
                tariff.vehicle_type.as_str(),
                tariff.base_rate.to_string(),
                tariff.base_hours,
                tariff.hourly_rate.to_string(),
                tariff.daily_rate.to_string(),
                tariff.daily_rate_hours,
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(Tariff {
            id: self.last_insert_rowid(),
            facility_id: tariff.facility_id,
            vehicle_type: tariff.vehicle_type,
            base_rate: tariff.base_rate,
            base_hours: tariff.base_hours,
            hourly_rate: tariff.hourly_rate,
            daily_rate: tariff.daily_rate,
            daily_rate_hours: tariff.daily_rate_hours,
            created_at,
        })
    }

    fn stay(&mut self, id: i64) -> EngineResult<Option<Stay>> {
        let sql = format!("SELECT {STAY_COLUMNS} FROM parking_entries WHERE id = ?1");
        Ok(self.query_row(&sql, [id], stay_from_row).optional()?)
    }

    fn insert_stay(&mut self, stay: &NewStay) -> EngineResult<Stay> {
        self.execute(
            "INSERT INTO parking_entries (parking_lot_id, vehicle_type, license_plate, entry_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                stay.facility_id,
                stay.vehicle_type.as_str(),
                stay.license_plate,
                stay.entry_time.to_rfc3339(),
            ],
        )?;

        Ok(Stay {
            id: self.last_insert_rowid(),
            facility_id: stay.facility_id,
            vehicle_type: stay.vehicle_type,
            license_plate: stay.license_plate.clone(),
            entry_time: stay.entry_time,
            state: StayState::Active,
        })
    }

    fn close_stay(&mut self, id: i64, exit_time: DateTime<Utc>) -> EngineResult<bool> {
        let changed = self.execute(
            "UPDATE parking_entries SET exit_time = ?1 WHERE id = ?2 AND exit_time IS NULL",
            params![exit_time.to_rfc3339(), id],
        )?;
        Ok(changed == 1)
    }

    fn count_active(&mut self, facility_id: i64) -> EngineResult<BTreeMap<VehicleType, u32>> {
        let mut stmt = self.prepare(
            "SELECT vehicle_type, COUNT(*) FROM parking_entries
             WHERE parking_lot_id = ?1 AND exit_time IS NULL
             GROUP BY vehicle_type",
        )?;
        let counts = stmt
            .query_map([facility_id], |row| {
                Ok((get_vehicle_type(row, 0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(counts)
    }

    fn insert_receipt(&mut self, receipt: &NewReceipt) -> EngineResult<Receipt> {
        let receipt_number = uuid::Uuid::new_v4().to_string();

        let result = self.execute(
            "INSERT INTO receipts (
                receipt_number, parking_entry_id, entry_time, exit_time, duration, fee
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                receipt_number,
                receipt.stay_id,
                receipt.entry_time.to_rfc3339(),
                receipt.exit_time.to_rfc3339(),
                receipt.duration,
                receipt.fee.to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(Receipt {
                id: self.last_insert_rowid(),
                receipt_number,
                stay_id: receipt.stay_id,
                entry_time: receipt.entry_time,
                exit_time: receipt.exit_time,
                duration: receipt.duration.clone(),
                fee: receipt.fee,
            }),
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::Constraint(message.unwrap_or_else(|| {
                    format!("receipt rejected for stay {}", receipt.stay_id)
                }))
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn receipt_for_stay(&mut self, stay_id: i64) -> EngineResult<Option<Receipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE parking_entry_id = ?1");
        Ok(self.query_row(&sql, [stay_id], receipt_from_row).optional()?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

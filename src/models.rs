// 🅿️ Parking Records - Facility, Tariff, Stay, Receipt
// Records are values; identities are assigned by the store

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// VEHICLE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    /// Two-wheeled and light vehicles
    MotorcycleScooter,

    /// Cars and SUVs
    CarSUV,

    /// Buses and trucks
    BusTruck,
}

impl VehicleType {
    pub const ALL: [VehicleType; 3] = [
        VehicleType::MotorcycleScooter,
        VehicleType::CarSUV,
        VehicleType::BusTruck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::MotorcycleScooter => "MotorcycleScooter",
            VehicleType::CarSUV => "CarSUV",
            VehicleType::BusTruck => "BusTruck",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleType::ALL
            .into_iter()
            .find(|vt| vt.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::invalid(format!("unknown vehicle type: {s}")))
    }
}

// ============================================================================
// FACILITY
// ============================================================================

/// A parking lot with a fixed capacity per vehicle type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub capacity: BTreeMap<VehicleType, u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFacility {
    pub name: String,
    pub capacity: BTreeMap<VehicleType, u32>,
}

impl NewFacility {
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid("name is empty"));
        }
        if self.capacity.is_empty() {
            return Err(EngineError::invalid("capacity is empty"));
        }
        Ok(())
    }
}

// ============================================================================
// TARIFF
// ============================================================================

/// Pricing rule for one (facility, vehicle type) pair.
///
/// Which of the rate fields apply depends on the vehicle type, see
/// [`crate::pricing::PricingRule::for_tariff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: i64,
    pub facility_id: i64,
    pub vehicle_type: VehicleType,
    pub base_rate: Decimal,
    pub base_hours: u32,
    pub hourly_rate: Decimal,
    pub daily_rate: Decimal,
    pub daily_rate_hours: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTariff {
    pub facility_id: i64,
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub base_rate: Decimal,
    #[serde(default)]
    pub base_hours: u32,
    #[serde(default)]
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub daily_rate: Decimal,
    #[serde(default)]
    pub daily_rate_hours: u32,
}

impl NewTariff {
    pub fn validate(&self) -> EngineResult<()> {
        let rates = [
            ("base_rate", self.base_rate),
            ("hourly_rate", self.hourly_rate),
            ("daily_rate", self.daily_rate),
        ];
        for (field, rate) in rates {
            if rate < Decimal::ZERO {
                return Err(EngineError::invalid(format!("{field} is negative")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// STAY
// ============================================================================

/// Lifecycle of a stay. A closed stay always has an exit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StayState {
    Active,
    Closed { exit_time: DateTime<Utc> },
}

/// One vehicle's occupancy of a facility, from entry to exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stay {
    pub id: i64,
    pub facility_id: i64,
    pub vehicle_type: VehicleType,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    #[serde(flatten)]
    pub state: StayState,
}

impl Stay {
    pub fn is_active(&self) -> bool {
        matches!(self.state, StayState::Active)
    }

    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        match self.state {
            StayState::Active => None,
            StayState::Closed { exit_time } => Some(exit_time),
        }
    }
}

/// Input for inserting a stay; the store assigns the identity.
#[derive(Debug, Clone)]
pub struct NewStay {
    pub facility_id: i64,
    pub vehicle_type: VehicleType,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
}

// ============================================================================
// RECEIPT
// ============================================================================

/// Immutable record of a closed stay and what it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub receipt_number: String,
    pub stay_id: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration: String,
    pub fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub stay_id: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration: String,
    pub fee: Decimal,
}

// 💰 Fee Calculator - Tiered pricing per vehicle type
// A tariff is turned into one PricingRule; every rule bills whole hours

use crate::error::{EngineError, EngineResult};
use crate::models::{Stay, Tariff, VehicleType};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Fees are kept to the currency's minor unit.
pub const MONEY_SCALE: u32 = 2;

// ============================================================================
// PRICING RULE
// ============================================================================

/// The closed set of billing schemes a tariff can resolve to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricingRule {
    /// hours × hourly rate
    FlatHourly { hourly_rate: Decimal },

    /// Base rate covers the first `base_hours`, hourly rate after that
    BaseThenHourly {
        base_rate: Decimal,
        base_hours: u32,
        hourly_rate: Decimal,
    },

    /// Hourly up to `daily_rate_hours`, then whole days at the daily rate
    HourlyThenDaily {
        hourly_rate: Decimal,
        daily_rate: Decimal,
        daily_rate_hours: u32,
    },
}

impl PricingRule {
    /// Pick the rule for a tariff. The vehicle type selects which tiers are
    /// eligible; a tier whose window is not configured falls back to flat
    /// hourly billing.
    pub fn for_tariff(tariff: &Tariff) -> Self {
        let flat = PricingRule::FlatHourly {
            hourly_rate: tariff.hourly_rate,
        };

        match tariff.vehicle_type {
            VehicleType::MotorcycleScooter => flat,
            VehicleType::CarSUV => {
                if tariff.base_rate > Decimal::ZERO && tariff.base_hours > 0 {
                    PricingRule::BaseThenHourly {
                        base_rate: tariff.base_rate,
                        base_hours: tariff.base_hours,
                        hourly_rate: tariff.hourly_rate,
                    }
                } else {
                    flat
                }
            }
            VehicleType::BusTruck => {
                if tariff.daily_rate > Decimal::ZERO && tariff.daily_rate_hours > 0 {
                    PricingRule::HourlyThenDaily {
                        hourly_rate: tariff.hourly_rate,
                        daily_rate: tariff.daily_rate,
                        daily_rate_hours: tariff.daily_rate_hours,
                    }
                } else {
                    flat
                }
            }
        }
    }

    /// Unrounded fee for a number of billable hours.
    ///
    /// Rates are unbounded, so a fee too large for `Decimal` is rejected
    /// as invalid input rather than overflowing.
    pub fn fee_for_hours(&self, hours: i64) -> EngineResult<Decimal> {
        let hours = hours.max(0);

        let fee = match *self {
            PricingRule::FlatHourly { hourly_rate } => times(hours, hourly_rate),
            PricingRule::BaseThenHourly {
                base_rate,
                base_hours,
                hourly_rate,
            } => {
                let base_hours = i64::from(base_hours);
                if hours <= base_hours {
                    Some(base_rate)
                } else {
                    times(hours - base_hours, hourly_rate)
                        .and_then(|overage| base_rate.checked_add(overage))
                }
            }
            PricingRule::HourlyThenDaily {
                hourly_rate,
                daily_rate,
                daily_rate_hours,
            } => {
                let threshold = i64::from(daily_rate_hours);
                if hours <= threshold {
                    times(hours, hourly_rate)
                } else {
                    let days = (hours + 23) / 24;
                    times(threshold, hourly_rate)
                        .zip(times(days - 1, daily_rate))
                        .and_then(|(hourly, daily)| hourly.checked_add(daily))
                }
            }
        };

        fee.ok_or_else(|| {
            EngineError::invalid(format!("fee for {hours}h exceeds the representable amount"))
        })
    }
}

fn times(count: i64, rate: Decimal) -> Option<Decimal> {
    Decimal::from(count).checked_mul(rate)
}

// ============================================================================
// DURATION & ROUNDING
// ============================================================================

/// Whole hours to bill between entry and exit.
///
/// Any started hour counts in full, and every stay bills at least one hour.
pub fn billable_hours(entry: DateTime<Utc>, exit: DateTime<Utc>) -> EngineResult<i64> {
    if exit < entry {
        return Err(EngineError::invalid("exit time precedes entry time"));
    }

    let elapsed = exit - entry;
    let whole = elapsed.num_hours();
    let hours = if elapsed > Duration::hours(whole) {
        whole + 1
    } else {
        whole
    };

    Ok(hours.max(1))
}

/// Round half-up (midpoint away from zero) to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Human readable elapsed time, e.g. "3h 10m 0s".
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

// ============================================================================
// FEE CALCULATION
// ============================================================================

/// Fee for a stay between two instants under a tariff, rounded to cents.
pub fn fee_between(entry: DateTime<Utc>, exit: DateTime<Utc>, tariff: &Tariff) -> EngineResult<Decimal> {
    let hours = billable_hours(entry, exit)?;
    let rule = PricingRule::for_tariff(tariff);
    Ok(round_money(rule.fee_for_hours(hours)?))
}

/// Fee for a closed stay. Active stays have nothing to bill yet.
pub fn compute_fee(stay: &Stay, tariff: &Tariff) -> EngineResult<Decimal> {
    let exit = stay
        .exit_time()
        .ok_or(EngineError::VehicleNotExited { stay_id: stay.id })?;
    fee_between(stay.entry_time, exit, tariff)
}

// ============================================================================
// TESTS
// ============================================================================

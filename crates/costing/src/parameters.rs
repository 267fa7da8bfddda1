//! Cost parameter snapshot.
//!
//! Parameters are captured once per calculation run and passed in explicitly,
//! so every calculation can be reproduced from its stored inputs.

use std::collections::HashMap;

use quoteforge_core::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CostingError;

pub const LABOR_RATE_KEY: &str = "labor_rate";
pub const ELECTRICITY_RATE_KEY: &str = "electricity_rate";
pub const OVERHEAD_RATE_KEY: &str = "overhead_rate";

/// Current cost parameters at calculation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostParameters {
    /// Currency per labour hour per head.
    pub labor_rate: Decimal,
    /// Currency per kWh.
    pub electricity_rate: Decimal,
    /// Overhead as a fraction of process cost (1.5 = 150%).
    pub overhead_rate: Decimal,
}

impl CostParameters {
    pub fn default_labor_rate() -> Decimal {
        Decimal::new(150, 1)
    }

    pub fn default_electricity_rate() -> Decimal {
        Decimal::new(12, 2)
    }

    pub fn default_overhead_rate() -> Decimal {
        Decimal::new(15, 1)
    }

    /// Build a snapshot from a key/value parameter lookup.
    ///
    /// Missing keys fall back to the documented defaults; negative values are
    /// rejected.
    pub fn from_lookup(values: &HashMap<String, Decimal>) -> Result<Self, CostingError> {
        let read = |key: &str, default: Decimal| -> Result<Decimal, CostingError> {
            match values.get(key) {
                Some(v) if v.is_sign_negative() && !v.is_zero() => {
                    Err(CostingError::InvalidParameter {
                        key: key.to_string(),
                        value: *v,
                    })
                }
                Some(v) => Ok(*v),
                None => Ok(default),
            }
        };

        Ok(Self {
            labor_rate: read(LABOR_RATE_KEY, Self::default_labor_rate())?,
            electricity_rate: read(ELECTRICITY_RATE_KEY, Self::default_electricity_rate())?,
            overhead_rate: read(OVERHEAD_RATE_KEY, Self::default_overhead_rate())?,
        })
    }

    /// Overhead expressed as a percentage, for display.
    pub fn overhead_percentage(&self) -> Decimal {
        self.overhead_rate * Decimal::ONE_HUNDRED
    }
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            labor_rate: Self::default_labor_rate(),
            electricity_rate: Self::default_electricity_rate(),
            overhead_rate: Self::default_overhead_rate(),
        }
    }
}

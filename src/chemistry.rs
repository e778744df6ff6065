//! Battery chemistries and the charge estimation each one provides.

pub mod lead_acid;
pub mod lifepo;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

pub use self::{lead_acid::LeadAcid, lifepo::LiFePo4};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chemistry {
    #[serde(rename = "pb")]
    LeadAcid,
    #[serde(rename = "lifepo4")]
    LiFePo4,
}

impl Chemistry {
    /// Build the charge estimator for this chemistry.
    ///
    /// `calc_charge` makes the estimator derive charge from voltage even when
    /// the device reports its own value.
    pub fn estimator(self, nominal_voltage: f64, calc_charge: bool) -> Box<dyn ChargeEstimator> {
        match self {
            Self::LeadAcid => Box::new(LeadAcid::new(nominal_voltage, calc_charge)),
            Self::LiFePo4 => Box::new(LiFePo4),
        }
    }
}

/// Charge/discharge mode of the current sample and the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeMode {
    pub discharging: bool,
    pub was_discharging: bool,
}

/// Charging stage, tracked while the pack is on mains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargeStage {
    /// Discharging, or not yet classified.
    #[default]
    None,
    /// Bulk/absorption: voltage is still climbing towards the boost level.
    Boost,
    /// Maintenance: voltage has settled at the float level.
    Float,
}

/// Scratch state an estimator carries between samples. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeState {
    /// Per-cell voltage seen on the previous sample, or negative if none.
    pub last_voltage: f64,
    pub stage: ChargeStage,
}

impl Default for ChargeState {
    fn default() -> Self {
        Self {
            last_voltage: -1.0,
            stage: ChargeStage::None,
        }
    }
}

/// Converts telemetry into a charge percentage for one battery chemistry.
pub trait ChargeEstimator: Debug {
    fn chemistry(&self) -> Chemistry;

    /// Voltage of a single nominal cell block, if the sample has a voltage.
    fn cell_voltage(&self, sample: &Sample) -> Option<f64>;

    /// Estimated charge in percent, rounded to one decimal place.
    fn estimate_charge(
        &self,
        sample: &Sample,
        mode: ChargeMode,
        state: &mut ChargeState,
    ) -> Option<f64>;

    /// Whether samples for this chemistry feed the statistics at all.
    fn records_stats(&self) -> bool {
        true
    }
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

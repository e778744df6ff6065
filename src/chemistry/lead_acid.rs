use super::{ChargeEstimator, ChargeMode, ChargeStage, ChargeState, Chemistry, round1};
use crate::sample::Sample;

/// Resting voltage of a 12 V block at 0%, 10%, ..., 100% charge.
const VOLTS_AT_CHARGE: [f64; 11] = [
    10.8, 11.51, 11.66, 11.81, 11.95, 12.05, 12.15, 12.3, 12.5, 12.75, 12.85,
];

/// Voltage span of each decile. The curve is far from linear.
const DECILE_DELTA: [f64; 10] = [0.71, 0.15, 0.15, 0.14, 0.1, 0.1, 0.15, 0.2, 0.25, 0.1];

/// At or above this, call it 99%.
pub const V_99: f64 = 12.80;

/// Maintenance charging voltage.
pub const V_FLOAT: f64 = 13.5;

/// Bulk/absorption charging voltage.
pub const V_BOOST: f64 = 14.1;

/// Below this the pack is in danger of permanent damage.
pub const V_FATAL: f64 = 10.5;

/// Nominal voltage of one block.
pub const BLOCK_VOLTAGE: f64 = 12.0;

/// Minimal boost-to-float voltage drop, with room for jitter.
const FLOAT_DROP: f64 = 0.3;

/// How far from the float voltage a floating pack may wander before it is
/// considered to be in bulk charge again.
const FLOAT_TOLERANCE: f64 = 0.1;

/// Approximate charge of a resting 12 V block from its voltage.
pub fn voltage_to_charge(v: f64) -> f64 {
    if v >= VOLTS_AT_CHARGE[10] {
        return 100.0;
    }
    if v >= V_99 {
        return 99.0;
    }
    if v <= VOLTS_AT_CHARGE[0] {
        return 0.0;
    }

    let decile = (1..9).find(|&i| v < VOLTS_AT_CHARGE[i]).unwrap_or(9) - 1;

    round1(10.0 * decile as f64 + 10.0 * (v - VOLTS_AT_CHARGE[decile]) / DECILE_DELTA[decile])
}

/// Linear charge estimate while in bulk charge.
fn bulk_charge(v: f64) -> f64 {
    round1((v - V_FATAL) / (V_BOOST - V_FATAL) * 100.0).clamp(0.0, 100.0)
}

/// Charging stage after seeing `v`, given the stage and voltage before it.
fn next_stage(stage: ChargeStage, last_voltage: f64, v: f64) -> ChargeStage {
    match stage {
        ChargeStage::Boost if last_voltage > V_FLOAT && last_voltage - v >= FLOAT_DROP => {
            ChargeStage::Float
        }
        ChargeStage::Boost => ChargeStage::Boost,
        // catches discharge cycles we never saw
        _ if (v - V_FLOAT).abs() > FLOAT_TOLERANCE => ChargeStage::Boost,
        other => other,
    }
}

/// Charge estimation for lead-acid packs built from 12 V blocks.
#[derive(Debug, Clone, Copy)]
pub struct LeadAcid {
    /// Number of 12 V blocks in series.
    blocks: f64,
    /// Derive charge from voltage even when the device reports one.
    calc_charge: bool,
}

impl LeadAcid {
    pub fn new(nominal_voltage: f64, calc_charge: bool) -> Self {
        Self {
            blocks: nominal_voltage / BLOCK_VOLTAGE,
            calc_charge,
        }
    }
}

impl ChargeEstimator for LeadAcid {
    fn chemistry(&self) -> Chemistry {
        Chemistry::LeadAcid
    }

    fn cell_voltage(&self, sample: &Sample) -> Option<f64> {
        if self.blocks <= 0.0 {
            return None;
        }

        sample.battery_voltage.map(|v| v / self.blocks)
    }

    fn estimate_charge(
        &self,
        sample: &Sample,
        mode: ChargeMode,
        state: &mut ChargeState,
    ) -> Option<f64> {
        if !self.calc_charge
            && let Some(charge) = sample.battery_charge
        {
            return Some(round1(charge));
        }

        let v = self.cell_voltage(sample)?;

        if mode.discharging {
            state.stage = ChargeStage::None;
            return Some(voltage_to_charge(v));
        }

        if mode.was_discharging {
            state.stage = ChargeStage::Boost;
        }

        state.stage = next_stage(state.stage, state.last_voltage, v);

        Some(match state.stage {
            ChargeStage::Boost => bulk_charge(v),
            _ => 100.0,
        })
    }
}

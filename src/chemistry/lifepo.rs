use super::{ChargeEstimator, ChargeMode, ChargeState, Chemistry};
use crate::sample::Sample;

/// Placeholder for LiFePO4 packs: always full, and nothing is recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiFePo4;

impl ChargeEstimator for LiFePo4 {
    fn chemistry(&self) -> Chemistry {
        Chemistry::LiFePo4
    }

    fn cell_voltage(&self, _sample: &Sample) -> Option<f64> {
        None
    }

    fn estimate_charge(
        &self,
        _sample: &Sample,
        _mode: ChargeMode,
        _state: &mut ChargeState,
    ) -> Option<f64> {
        Some(100.0)
    }

    fn records_stats(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_full() {
        let sample = Sample {
            battery_voltage: Some(40.0),
            battery_charge: Some(12.0),
            load: Some(50.0),
            status: Some("OB".to_string()),
        };
        let mode = ChargeMode {
            discharging: true,
            was_discharging: true,
        };
        let mut state = ChargeState::default();

        assert_eq!(LiFePo4.estimate_charge(&sample, mode, &mut state), Some(100.0));
        assert_eq!(state, ChargeState::default());
        assert!(!LiFePo4.records_stats());
    }
}

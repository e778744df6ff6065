//! Long-term battery health statistics for UPS devices.
//!
//! Feed [`BattStats`] one [`Sample`] per polling interval and save it now and
//! then. It keeps a year of weekly blackout and charge/discharge speed history
//! and a per-hour load profile, and estimates the current charge.

pub mod chemistry;
pub mod error;
pub mod sample;
pub mod settings;
pub mod stats;

pub use chemistry::{ChargeEstimator, Chemistry};
pub use error::StoreError;
pub use sample::Sample;
pub use settings::{DeviceConfig, StatsConfig};
pub use stats::{BattStats, INVALID_CHARGE, PersistentStats};

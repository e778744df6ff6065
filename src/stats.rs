//! Long-term battery statistics for one UPS.
//!
//! [`BattStats`] is fed one [`Sample`] per polling interval. It keeps blackout
//! totals and hourly load averages, and records how long the battery takes to
//! cross each 5%-wide charge sector at a given load, separately for charging
//! and discharging. Everything worth keeping lives in a [`PersistentStats`]
//! record that is written to disk on request.

pub mod averages;
pub mod clock;
pub mod persistence;
pub mod record;
pub mod sector;

use std::path::{Path, PathBuf};

use chrono::Timelike;

pub use self::{
    averages::{update_avg_float, update_avg_int},
    clock::{Clock, SystemClock},
    record::{
        CHARGE_STEPS, DeviceDescriptor, HourlyLoad, PersistentStats, SECTOR_WIDTH, SpeedKind,
        WEEKS_IN_A_YEAR, WeeklyHistory,
    },
    sector::SectorState,
};
use crate::{
    chemistry::{ChargeEstimator, ChargeMode, ChargeState},
    error::StoreError,
    sample::{Sample, is_on_battery},
    settings::DeviceConfig,
};

/// Charge reported while the statistics are invalid, so dashboards show a
/// problem instead of an empty battery.
pub const INVALID_CHARGE: f64 = -1.0;

#[derive(Debug)]
pub struct BattStats {
    device: DeviceConfig,
    file_path: Option<PathBuf>,
    record: PersistentStats,

    /// The stored file was rejected. Updates are ignored and saving is
    /// refused until an operator sorts it out.
    invalid: bool,

    estimator: Box<dyn ChargeEstimator>,
    clock: Box<dyn Clock>,

    /// Dwell in the current sector. `None` until the first sample.
    sector: Option<SectorState>,
    charge_state: ChargeState,
    in_blackout: bool,
    last_charge: Option<f64>,
}

impl BattStats {
    /// Load or create statistics for `device`, stored in `storage_dir`.
    /// Without a storage directory nothing is loaded and saving fails.
    pub fn new(storage_dir: Option<&Path>, device: DeviceConfig) -> Self {
        Self::with_clock(storage_dir, device, Box::new(SystemClock))
    }

    pub fn with_clock(
        storage_dir: Option<&Path>,
        device: DeviceConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        let file_path =
            storage_dir.map(|dir| persistence::stats_file_path(dir, &device.descriptor.dev_id));

        let loaded = persistence::load(file_path.as_deref(), &device.descriptor, clock.timestamp());
        if loaded.invalid {
            log::error!(
                "statistics for {} are invalid, not recording anything",
                device.descriptor.dev_id
            );
        }

        let estimator = device
            .descriptor
            .chemistry
            .estimator(device.descriptor.nominal_voltage, device.calc_charge);

        Self {
            device,
            file_path,
            record: loaded.stats,
            invalid: loaded.invalid,
            estimator,
            clock,
            sector: None,
            charge_state: ChargeState::default(),
            in_blackout: false,
            last_charge: None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Diagnostics collected so far, mostly errors.
    pub fn messages(&self) -> &[String] {
        &self.record.messages
    }

    pub fn stats(&self) -> &PersistentStats {
        &self.record
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Dwell in the current sector, if any sample has been seen.
    pub fn sector(&self) -> Option<&SectorState> {
        self.sector.as_ref()
    }

    /// Latest charge estimate in percent, [`INVALID_CHARGE`] if the statistics
    /// are invalid, or `None` before the first usable sample.
    pub fn charge_percent(&self) -> Option<f64> {
        if self.invalid {
            return Some(INVALID_CHARGE);
        }

        self.last_charge
    }

    /// Whether the previous sample was taken on battery.
    fn was_discharging(&self) -> bool {
        self.sector.as_ref().is_some_and(SectorState::discharging)
    }

    /// Feed one sample. Samples without a battery voltage, load or status are
    /// skipped without a trace.
    pub fn update_stats(&mut self, sample: &Sample) {
        if self.invalid {
            return;
        }

        if !self.estimator.records_stats() {
            let mode = ChargeMode {
                discharging: sample.on_battery().unwrap_or(false),
                was_discharging: false,
            };
            self.last_charge =
                self.estimator
                    .estimate_charge(sample, mode, &mut self.charge_state);
            return;
        }

        let (Some(load), Some(status)) = (sample.load, sample.status.as_deref()) else {
            return;
        };
        let Some(voltage) = self.estimator.cell_voltage(sample) else {
            return;
        };

        let now = self.clock.timestamp();
        let was_discharging = self.was_discharging();
        self.update_blackouts(was_discharging, now);
        self.update_hourly_load(load);

        let discharging = is_on_battery(status);

        let Some(mut state) = self.sector.take() else {
            self.enter_sector(sample, discharging, was_discharging, load, voltage);
            return;
        };

        let Some(charge) = self.estimate(sample, discharging, was_discharging) else {
            self.sector = Some(state);
            return;
        };
        let new_sector = sector::sector_of(charge);
        self.charge_state.last_voltage = voltage;

        if state.continues(discharging, new_sector) {
            state.dwell(self.device.sample_interval, load);
            self.sector = Some(state);
            return;
        }

        match state.speed() {
            Some(speed) => {
                let kind = SpeedKind::from_discharging(state.discharging());
                log::debug!(
                    "recording {kind:?} speed {speed:.3} for sector {}",
                    state.sector()
                );
                self.record
                    .weekly
                    .add_speed(kind, state.sector(), speed, now);
            }
            None => log::debug!(
                "leaving sector {} without recording its speed",
                state.sector()
            ),
        }

        self.enter_sector(sample, discharging, was_discharging, load, voltage);
    }

    /// Start dwelling in the sector the sample's charge falls into.
    fn enter_sector(
        &mut self,
        sample: &Sample,
        discharging: bool,
        was_discharging: bool,
        load: f64,
        voltage: f64,
    ) {
        let charge = self.estimate(sample, discharging, was_discharging);

        self.sector = charge.map(|charge| SectorState::enter(charge, discharging, load));
        self.charge_state = ChargeState {
            last_voltage: voltage,
            ..Default::default()
        };

        if let Some(state) = &self.sector {
            log::debug!(
                "entered sector {} at {:.1}% ({})",
                state.sector(),
                state.entry_charge,
                if discharging { "discharging" } else { "charging" }
            );
        }
    }

    fn estimate(&mut self, sample: &Sample, discharging: bool, was_discharging: bool) -> Option<f64> {
        let mode = ChargeMode {
            discharging,
            was_discharging,
        };

        let charge = self
            .estimator
            .estimate_charge(sample, mode, &mut self.charge_state);
        if charge.is_some() {
            self.last_charge = charge;
        }

        charge
    }

    /// Blackouts are counted from the mode of the previous sample.
    fn update_blackouts(&mut self, was_discharging: bool, now: i64) {
        if !was_discharging {
            self.in_blackout = false;
            return;
        }

        if !self.in_blackout {
            self.in_blackout = true;
            self.record.weekly.add_blackout(now);
        }

        let hours = (self.device.sample_interval as f64 / 3600.0 * 10_000.0).round() / 10_000.0;
        self.record.weekly.add_blackout_hours(hours, now);
    }

    fn update_hourly_load(&mut self, load: f64) {
        let hour = self.clock.now().hour() as usize;
        self.record.hourly.record(hour, load as i64);
    }

    /// Write the statistics to disk, keeping the previous file as a backup.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let Some(path) = &self.file_path else {
            return Err(StoreError::NoStorage);
        };

        persistence::save(path, &mut self.record, self.invalid, self.clock.timestamp())
    }
}

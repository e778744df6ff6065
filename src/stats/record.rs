use serde::{Deserialize, Serialize};

use super::averages::{update_avg_float, update_avg_int};
use crate::chemistry::Chemistry;

/// Width of one state-of-charge sector, in percent.
pub const SECTOR_WIDTH: f64 = 5.0;

/// Number of sectors between 0% and 100%.
pub const CHARGE_STEPS: usize = (100.0 / SECTOR_WIDTH) as usize;

/// Weekly history is capped at one year.
pub const WEEKS_IN_A_YEAR: usize = 52;

pub const SECONDS_IN_A_WEEK: i64 = 604_800;

pub const HOURS_IN_A_DAY: usize = 24;

/// Identity of the device a statistics file belongs to. A loaded file must
/// match the configured descriptor exactly to be used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub dev_id: String,
    #[serde(rename = "batt_type")]
    pub chemistry: Chemistry,
    /// Nominal pack voltage (12, 24, 48, ...).
    #[serde(rename = "batt_vnom")]
    pub nominal_voltage: f64,
    /// Pack capacity, Ah.
    #[serde(rename = "batt_cap")]
    pub capacity: f64,
}

/// Which per-sector speed channel a dwell sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedKind {
    Discharge,
    Charge,
}

impl SpeedKind {
    pub fn from_discharging(discharging: bool) -> Self {
        if discharging {
            Self::Discharge
        } else {
            Self::Charge
        }
    }
}

/// Rotating per-week history. Every sequence is parallel: index 0 is the
/// current week, higher indices are older weeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyHistory {
    /// Unix timestamp the week started at.
    #[serde(rename = "start_ts")]
    pub(crate) week_start: Vec<i64>,

    /// Average of dwell time divided by average load, per sector.
    pub(crate) discharge_speed_avg: Vec<[f64; CHARGE_STEPS]>,
    pub(crate) discharge_speed_samples: Vec<[u32; CHARGE_STEPS]>,
    pub(crate) charge_speed_avg: Vec<[f64; CHARGE_STEPS]>,
    pub(crate) charge_speed_samples: Vec<[u32; CHARGE_STEPS]>,

    #[serde(rename = "blackouts_count")]
    pub(crate) blackout_count: Vec<u32>,
    #[serde(rename = "blackouts_time")]
    pub(crate) blackout_hours: Vec<f64>,
}

impl WeeklyHistory {
    /// Create a history holding a single, empty week starting at `now`.
    pub fn new(now: i64) -> Self {
        let mut weekly = Self {
            week_start: Vec::with_capacity(WEEKS_IN_A_YEAR),
            discharge_speed_avg: Vec::with_capacity(WEEKS_IN_A_YEAR),
            discharge_speed_samples: Vec::with_capacity(WEEKS_IN_A_YEAR),
            charge_speed_avg: Vec::with_capacity(WEEKS_IN_A_YEAR),
            charge_speed_samples: Vec::with_capacity(WEEKS_IN_A_YEAR),
            blackout_count: Vec::with_capacity(WEEKS_IN_A_YEAR),
            blackout_hours: Vec::with_capacity(WEEKS_IN_A_YEAR),
        };
        weekly.rotate(now);
        weekly
    }

    /// Number of weeks held.
    pub fn len(&self) -> usize {
        self.week_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.week_start.is_empty()
    }

    /// Whether all sequences have the same, non-zero length within the cap.
    pub fn is_consistent(&self) -> bool {
        let len = self.len();
        (1..=WEEKS_IN_A_YEAR).contains(&len)
            && self.discharge_speed_avg.len() == len
            && self.discharge_speed_samples.len() == len
            && self.charge_speed_avg.len() == len
            && self.charge_speed_samples.len() == len
            && self.blackout_count.len() == len
            && self.blackout_hours.len() == len
    }

    /// Start a new, all-zero week at `now` and drop the oldest weeks beyond
    /// [`WEEKS_IN_A_YEAR`].
    pub fn rotate(&mut self, now: i64) {
        self.week_start.insert(0, now);
        self.discharge_speed_avg.insert(0, [0.0; CHARGE_STEPS]);
        self.discharge_speed_samples.insert(0, [0; CHARGE_STEPS]);
        self.charge_speed_avg.insert(0, [0.0; CHARGE_STEPS]);
        self.charge_speed_samples.insert(0, [0; CHARGE_STEPS]);
        self.blackout_count.insert(0, 0);
        self.blackout_hours.insert(0, 0.0);

        self.week_start.truncate(WEEKS_IN_A_YEAR);
        self.discharge_speed_avg.truncate(WEEKS_IN_A_YEAR);
        self.discharge_speed_samples.truncate(WEEKS_IN_A_YEAR);
        self.charge_speed_avg.truncate(WEEKS_IN_A_YEAR);
        self.charge_speed_samples.truncate(WEEKS_IN_A_YEAR);
        self.blackout_count.truncate(WEEKS_IN_A_YEAR);
        self.blackout_hours.truncate(WEEKS_IN_A_YEAR);

        log::debug!("started new statistics week at {now}, holding {} weeks", self.len());
    }

    /// Rotate if the current week is at least a week old. Returns whether a
    /// rotation happened.
    pub fn rotate_if_due(&mut self, now: i64) -> bool {
        let due = self
            .week_start
            .first()
            .is_none_or(|start| now - start >= SECONDS_IN_A_WEEK);

        if due {
            self.rotate(now);
        }

        due
    }

    /// Fold one speed sample into the current week's average for `sector`.
    pub fn add_speed(&mut self, kind: SpeedKind, sector: usize, speed: f64, now: i64) {
        if sector >= CHARGE_STEPS {
            log::warn!("ignoring speed for invalid sector {sector}");
            return;
        }

        self.rotate_if_due(now);

        let (avgs, samples) = match kind {
            SpeedKind::Discharge => (
                &mut self.discharge_speed_avg[0],
                &mut self.discharge_speed_samples[0],
            ),
            SpeedKind::Charge => (
                &mut self.charge_speed_avg[0],
                &mut self.charge_speed_samples[0],
            ),
        };

        (avgs[sector], samples[sector]) = update_avg_float(avgs[sector], speed, samples[sector]);
    }

    /// Count the start of a blackout in the current week.
    pub fn add_blackout(&mut self, now: i64) {
        self.rotate_if_due(now);
        self.blackout_count[0] += 1;
    }

    pub fn add_blackout_hours(&mut self, hours: f64, now: i64) {
        self.rotate_if_due(now);
        self.blackout_hours[0] += hours;
    }

    pub fn week_start(&self, week: usize) -> Option<i64> {
        self.week_start.get(week).copied()
    }

    /// Per-sector average speeds for `week`.
    pub fn speed_avg(&self, kind: SpeedKind, week: usize) -> Option<&[f64; CHARGE_STEPS]> {
        match kind {
            SpeedKind::Discharge => self.discharge_speed_avg.get(week),
            SpeedKind::Charge => self.charge_speed_avg.get(week),
        }
    }

    pub fn speed_samples(&self, kind: SpeedKind, week: usize) -> Option<&[u32; CHARGE_STEPS]> {
        match kind {
            SpeedKind::Discharge => self.discharge_speed_samples.get(week),
            SpeedKind::Charge => self.charge_speed_samples.get(week),
        }
    }

    pub fn blackout_count(&self, week: usize) -> Option<u32> {
        self.blackout_count.get(week).copied()
    }

    pub fn blackout_hours(&self, week: usize) -> Option<f64> {
        self.blackout_hours.get(week).copied()
    }
}

/// Running load average per wall-clock hour. Never decays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyLoad {
    #[serde(rename = "hourly_load_avg")]
    pub(crate) avg: [i64; HOURS_IN_A_DAY],
    #[serde(rename = "hourly_load_samples")]
    pub(crate) samples: [u32; HOURS_IN_A_DAY],
}

impl Default for HourlyLoad {
    fn default() -> Self {
        Self {
            avg: [0; HOURS_IN_A_DAY],
            samples: [0; HOURS_IN_A_DAY],
        }
    }
}

impl HourlyLoad {
    pub fn record(&mut self, hour: usize, load: i64) {
        let Some(slot) = self.avg.get_mut(hour) else {
            log::warn!("ignoring load for invalid hour {hour}");
            return;
        };

        (*slot, self.samples[hour]) = update_avg_int(*slot, load, self.samples[hour]);
    }

    pub fn avg(&self, hour: usize) -> Option<i64> {
        self.avg.get(hour).copied()
    }

    pub fn samples(&self, hour: usize) -> Option<u32> {
        self.samples.get(hour).copied()
    }
}

/// Everything about a device that survives a restart. Serialized as one JSON
/// object per device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentStats {
    #[serde(flatten)]
    pub identity: DeviceDescriptor,

    /// Unix timestamp this record was first created.
    #[serde(rename = "started")]
    pub created_at: i64,

    /// Unix timestamp of the last successful save.
    #[serde(rename = "ts")]
    pub last_saved_at: i64,

    /// Diagnostics for humans. A record that was saved with messages is not
    /// trusted on the next load.
    #[serde(default)]
    pub messages: Vec<String>,

    pub weekly: WeeklyHistory,

    #[serde(flatten)]
    pub hourly: HourlyLoad,
}

impl PersistentStats {
    /// A fresh record with one empty week and zeroed hourly loads.
    pub fn new(identity: DeviceDescriptor, now: i64) -> Self {
        Self {
            identity,
            created_at: now,
            last_saved_at: now,
            messages: Vec::new(),
            weekly: WeeklyHistory::new(now),
            hourly: HourlyLoad::default(),
        }
    }
}

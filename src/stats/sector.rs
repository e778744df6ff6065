use super::{
    averages::update_avg_float,
    record::{CHARGE_STEPS, SECTOR_WIDTH},
};

/// Sector holding `charge`. A full charge lands in sector [`CHARGE_STEPS`],
/// one past the last recorded slot, so reaching 100% ends the dwell below it.
pub fn sector_of(charge: f64) -> usize {
    ((charge / SECTOR_WIDTH).max(0.0) as usize).min(CHARGE_STEPS)
}

/// Dwell accumulated while continuously inside one sector and one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorState {
    pub(crate) sector: usize,
    pub(crate) discharging: bool,
    /// Charge when the sector was entered.
    pub(crate) entry_charge: f64,
    /// Seconds spent in the sector.
    pub(crate) time_in_sector: u64,
    pub(crate) load_avg: f64,
    pub(crate) samples: u32,
}

impl SectorState {
    /// Start dwelling in the sector holding `charge`, with `load` as the first
    /// load sample.
    pub fn enter(charge: f64, discharging: bool, load: f64) -> Self {
        Self {
            sector: sector_of(charge),
            discharging,
            entry_charge: charge,
            time_in_sector: 0,
            load_avg: load,
            samples: 1,
        }
    }

    pub fn sector(&self) -> usize {
        self.sector
    }

    pub fn discharging(&self) -> bool {
        self.discharging
    }

    /// Whether a sample in `sector` continues the current dwell. A jolt
    /// against the direction of travel (up while discharging, down while
    /// charging) is jitter and doesn't end the dwell.
    pub fn continues(&self, discharging: bool, sector: usize) -> bool {
        discharging == self.discharging
            && (sector == self.sector
                || (discharging && sector > self.sector)
                || (!discharging && sector < self.sector))
    }

    /// Fold one more sample into the dwell.
    pub fn dwell(&mut self, interval: u64, load: f64) {
        self.time_in_sector += interval;
        (self.load_avg, self.samples) = update_avg_float(self.load_avg, load, self.samples);
    }

    /// Part of the sector, in percent, that was behind the entry point and
    /// so never observed.
    pub fn charge_remaining(&self) -> f64 {
        let sector = self.sector as f64;
        if self.discharging {
            (sector + 1.0) * SECTOR_WIDTH - self.entry_charge
        } else {
            self.entry_charge - sector * SECTOR_WIDTH
        }
    }

    /// Speed (time per unit of load) to record for the finished sector, or
    /// `None` if too little of the sector was observed or there was no load.
    ///
    /// At least half the sector must have been covered. The dwell time is
    /// extrapolated over the part that wasn't. Time spent at full charge has
    /// no slot and is never recorded.
    pub fn speed(&self) -> Option<f64> {
        if self.sector >= CHARGE_STEPS {
            return None;
        }

        let remaining = self.charge_remaining();
        if remaining / SECTOR_WIDTH > 0.5 {
            return None;
        }

        let mut time = self.time_in_sector;
        if remaining > 0.0 {
            time += (time as f64 * remaining / SECTOR_WIDTH) as u64;
        }

        (self.load_avg > 0.0).then(|| time as f64 / self.load_avg)
    }
}

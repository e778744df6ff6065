use std::fmt::Debug;
#[cfg(test)]
use std::{cell::Cell, rc::Rc};

use chrono::{DateTime, Local};

/// Source of wall-clock time for hour bucketing and week rotation.
pub trait Clock: Debug {
    fn now(&self) -> DateTime<Local>;

    /// Current time as unix seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock for tests that only moves when told to. Clones share the same time,
/// so a test can keep a handle after giving one to an engine.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock(Rc<Cell<i64>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(timestamp: i64) -> Self {
        Self(Rc::new(Cell::new(timestamp)))
    }

    pub fn set(&self, timestamp: i64) {
        self.0.set(timestamp);
    }

    pub fn advance(&self, seconds: i64) {
        self.0.set(self.0.get() + seconds);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        DateTime::from_timestamp(self.0.get(), 0)
            .unwrap_or_default()
            .with_timezone(&Local)
    }

    fn timestamp(&self) -> i64 {
        self.0.get()
    }
}

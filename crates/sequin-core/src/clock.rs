use jiff::Zoned;

/// Source of the wall-clock time used for date-derived prefixes and the
/// timestamp handed to formatters.
pub trait Clock: Send + Sync {
    /// Returns the current time of the clock.
    fn now(&self) -> Zoned;
}

/// The real system clock in the system time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Zoned {
        Zoned::now()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Zoned,
}

impl FixedClock {
    pub fn new(now: Zoned) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Zoned {
        self.now.clone()
    }
}

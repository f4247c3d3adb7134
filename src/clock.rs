use time::{Date, OffsetDateTime, UtcOffset};

/// Source of "today" for the rating policy and default calendar views.
pub trait Clock: Send + Sync {
    fn today(&self) -> Date;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(utc_offset_hours: i8) -> Self {
        Self {
            offset: UtcOffset::from_hms(utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.offset).date()
    }
}

/// Clock pinned to one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0
    }
}

#[cfg(test)]
mod clock_tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn fixed_clock_returns_its_day() {
        assert_eq!(FixedClock(date!(2025 - 01 - 15)).today(), date!(2025 - 01 - 15));
    }

    #[test]
    fn system_clock_respects_offset() {
        let utc = SystemClock::new(0).today();
        let ahead = SystemClock::new(14).today();
        let diff = (ahead - utc).whole_days();
        assert!((0..=1).contains(&diff));
    }
}

//! Run predicate shared by the scheduled modules.

use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// When a module may run: at most once per `interval`, only inside an
/// optional inclusive UTC hour window, and never on excluded weekdays.
#[derive(Clone, Debug)]
pub struct Schedule {
    interval: Duration,
    window: Option<(u32, u32)>,
    excluded_days: Vec<Weekday>,
    last_run: DateTime<Utc>,
}

impl Schedule {
    /// Run every `interval`, starting one interval after `now`.
    pub fn every(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            window: None,
            excluded_days: Vec::new(),
            last_run: now,
        }
    }

    /// Only run between `start` and `stop` UTC hours, both inclusive.
    pub fn with_window(mut self, start: u32, stop: u32) -> Self {
        self.window = Some((start, stop));
        self
    }

    /// Never run on these weekdays (UTC).
    pub fn excluding(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.excluded_days = days.into_iter().collect();
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_run(&self) -> DateTime<Utc> {
        self.last_run
    }

    /// True if `now` falls on an allowed day and hour.
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        if self.excluded_days.contains(&now.weekday()) {
            return false;
        }
        match self.window {
            Some((start, stop)) => (start..=stop).contains(&now.hour()),
            None => true,
        }
    }

    /// True if `now` is allowed and strictly more than one interval past the
    /// previous run. A clock that went backwards is never due.
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        if !self.allows(now) {
            return false;
        }
        match (now - self.last_run).to_std() {
            Ok(elapsed) => elapsed > self.interval,
            Err(_) => false,
        }
    }

    pub fn record_run(&mut self, now: DateTime<Utc>) {
        self.last_run = now;
    }

    /// Move the previous run two intervals back so the next check is due.
    /// Leaves the schedule untouched when that would overflow.
    pub fn rewind(&mut self) {
        let back = self
            .interval
            .checked_mul(2)
            .and_then(|d| chrono::Duration::from_std(d).ok());
        if let Some(earlier) = back.and_then(|back| self.last_run.checked_sub_signed(back)) {
            self.last_run = earlier;
        }
    }
}

//! Business-hours throttle.
//!
//! A coarse rate limiter for known-busy periods. Inside the configured
//! window, executions are spaced at least `min_spacing` apart (or, in
//! defer-until-close mode, held until the window ends). Outside the window
//! nothing waits.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;
use flare_types::ThrottleSettings;
use serde::Serialize;
use tracing::debug;

use crate::SchedulerError;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += TimeDelta::from_std(by).unwrap_or_else(|_| TimeDelta::zero());
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Timezone the window hours are expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowZone {
    /// Constant offset from UTC, no daylight saving
    Fixed(FixedOffset),
    /// IANA zone, daylight saving aware
    Named(Tz),
}

impl WindowZone {
    /// Parse an IANA name (`America/New_York`, `UTC`) or an offset
    /// (`-05:00`, `+0530`, `-5`).
    pub fn parse(value: &str) -> Result<Self, SchedulerError> {
        let value = value.trim();
        if let Ok(tz) = value.parse::<Tz>() {
            return Ok(WindowZone::Named(tz));
        }
        parse_offset(value)
            .map(WindowZone::Fixed)
            .ok_or_else(|| SchedulerError::InvalidTimezone(value.to_string()))
    }

    pub fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            WindowZone::Fixed(offset) => now.with_timezone(offset).naive_local(),
            WindowZone::Named(tz) => now.with_timezone(tz).naive_local(),
        }
    }

    /// UTC instant of a local time. `None` when the local time does not exist
    /// (skipped by a daylight-saving transition).
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            WindowZone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .single()
                .map(|t| t.with_timezone(&Utc)),
            WindowZone::Named(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for WindowZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowZone::Fixed(offset) => write!(f, "{}", offset),
            WindowZone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => (rest.get(..2)?, rest.get(2..)?),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Static window configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleWindow {
    pub start_hour: u32,
    /// Exclusive; 24 means midnight at the end of the day
    pub end_hour: u32,
    pub zone: WindowZone,
    pub excluded_weekdays: Vec<Weekday>,
    pub min_spacing: Duration,
    pub defer_until_close: bool,
}

impl ThrottleWindow {
    pub fn from_settings(settings: &ThrottleSettings) -> Result<Self, SchedulerError> {
        settings.validate().map_err(SchedulerError::Config)?;
        Ok(Self {
            start_hour: settings.start_hour,
            end_hour: settings.end_hour,
            zone: WindowZone::parse(&settings.timezone)?,
            excluded_weekdays: settings.excluded_weekdays.clone(),
            min_spacing: settings.min_spacing(),
            defer_until_close: settings.defer_until_close,
        })
    }

    /// True on a non-excluded weekday between start (inclusive) and end
    /// (exclusive) local time.
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        let local = self.zone.local(now);
        if self.excluded_weekdays.contains(&local.weekday()) {
            return false;
        }
        let hour = local.hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    /// When the window containing `now` closes, or `None` outside the window.
    pub fn window_end(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.in_window(now) {
            return None;
        }
        let local = self.zone.local(now);
        let end_local =
            local.date().and_time(NaiveTime::MIN) + TimeDelta::hours(i64::from(self.end_hour));
        Some(
            self.zone
                .to_utc(end_local)
                .unwrap_or_else(|| now + (end_local - local)),
        )
    }
}

/// Current throttle state, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ThrottleStatus {
    pub now_local: NaiveDateTime,
    pub zone: String,
    pub in_window: bool,
    pub window_end: Option<DateTime<Utc>>,
    pub min_spacing_secs: u64,
    pub defer_until_close: bool,
}

/// Window plus the last-execution slot shared by all workers.
#[derive(Debug)]
pub struct Throttle {
    window: ThrottleWindow,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Throttle {
    pub fn new(window: ThrottleWindow) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: ThrottleWindow, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &ThrottleSettings) -> Result<Self, SchedulerError> {
        Ok(Self::new(ThrottleWindow::from_settings(settings)?))
    }

    pub fn window(&self) -> &ThrottleWindow {
        &self.window
    }

    pub fn in_window(&self) -> bool {
        self.window.in_window(self.clock.now())
    }

    pub fn status(&self) -> ThrottleStatus {
        let now = self.clock.now();
        ThrottleStatus {
            now_local: self.window.zone.local(now),
            zone: self.window.zone.to_string(),
            in_window: self.window.in_window(now),
            window_end: self.window.window_end(now),
            min_spacing_secs: self.window.min_spacing.as_secs(),
            defer_until_close: self.window.defer_until_close,
        }
    }

    /// Reserve the next execution slot and return how long the caller must
    /// wait for it.
    ///
    /// Concurrent callers each get a distinct slot, `min_spacing` apart.
    pub fn reserve(&self) -> Duration {
        let now = self.clock.now();

        if self.window.defer_until_close {
            return self
                .window
                .window_end(now)
                .and_then(|end| (end - now).to_std().ok())
                .unwrap_or_default();
        }

        let spacing = TimeDelta::from_std(self.window.min_spacing).unwrap_or_else(|_| TimeDelta::zero());
        let mut last = lock(&self.last);
        let slot = match *last {
            Some(previous) if self.window.in_window(now) => (previous + spacing).max(now),
            _ => now,
        };
        *last = Some(slot);
        (slot - now).to_std().unwrap_or_default()
    }

    /// Wait, if the window requires it, before an execution proceeds.
    ///
    /// No lock is held while sleeping. Returns the time waited.
    pub async fn maybe_wait(&self) -> Duration {
        let wait = self.reserve();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Business hours; delaying execution");
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

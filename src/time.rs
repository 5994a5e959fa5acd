use std::fmt::{Debug, Formatter};
use std::ops::{Add, Sub};
use std::time::{Duration, Instant};
#[cfg(test)] use mockall::automock;

/// A point on the engine's monotonic millisecond clock.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct TimeMilli(u64);
impl Debug for TimeMilli {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl TimeMilli {
    pub const ZERO: TimeMilli = TimeMilli(0);

    pub const fn from_millis(millis: u64) -> TimeMilli {
        TimeMilli(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl Add<u32> for TimeMilli {
    type Output = TimeMilli;

    fn add(self, rhs: u32) -> Self::Output {
        TimeMilli(self.0.saturating_add(rhs.into()))
    }
}

impl Sub for TimeMilli {
    type Output = Duration;

    /// saturates at zero for deadlines in the past
    fn sub(self, rhs: TimeMilli) -> Self::Output {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}


#[cfg_attr(test, automock)]
pub trait Clock {
    fn now(&self) -> TimeMilli;
}

/// [Clock] based on [Instant], counting milliseconds since the clock was created. Clones share
///  the epoch.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}
impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            epoch: Instant::now(),
        }
    }

    /// maps a [TimeMilli] of this clock back to an [Instant], e.g. for sleeping until a deadline
    pub fn instant_of(&self, time: TimeMilli) -> Instant {
        self.epoch + Duration::from_millis(time.as_millis())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> TimeMilli {
        let millis = self.epoch.elapsed().as_millis();
        TimeMilli(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}


/// A single-shot deadline. Components multiplex all of their logical deadlines onto one of
///  these, re-arming it to the earliest outstanding deadline after every sweep.
#[derive(Debug, Default)]
pub struct TimerMilli {
    fire_time: Option<TimeMilli>,
}
impl TimerMilli {
    pub fn fire_at(&mut self, fire_time: TimeMilli) {
        self.fire_time = Some(fire_time);
    }

    pub fn fire_at_if_earlier(&mut self, fire_time: TimeMilli) {
        match self.fire_time {
            Some(current) if current <= fire_time => {}
            _ => self.fire_time = Some(fire_time),
        }
    }

    /// arms the timer for `fire_time` if there is one, stops it otherwise
    pub fn fire_at_opt(&mut self, fire_time: Option<TimeMilli>) {
        self.fire_time = fire_time;
    }

    pub fn stop(&mut self) {
        self.fire_time = None;
    }

    pub fn is_running(&self) -> bool {
        self.fire_time.is_some()
    }

    pub fn fire_time(&self) -> Option<TimeMilli> {
        self.fire_time
    }

    pub fn is_due(&self, now: TimeMilli) -> bool {
        matches!(self.fire_time, Some(t) if t <= now)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::unarmed(None, 10, Some(10))]
    #[case::earlier(Some(20), 10, Some(10))]
    #[case::later(Some(5), 10, Some(5))]
    #[case::same(Some(10), 10, Some(10))]
    fn test_fire_at_if_earlier(#[case] initial: Option<u64>, #[case] new: u64, #[case] expected: Option<u64>) {
        let mut timer = TimerMilli::default();
        timer.fire_at_opt(initial.map(TimeMilli::from_millis));

        timer.fire_at_if_earlier(TimeMilli::from_millis(new));
        assert_eq!(timer.fire_time(), expected.map(TimeMilli::from_millis));
    }

    #[rstest]
    #[case::unarmed(None, 100, false)]
    #[case::before(Some(101), 100, false)]
    #[case::exact(Some(100), 100, true)]
    #[case::after(Some(99), 100, true)]
    fn test_is_due(#[case] fire_time: Option<u64>, #[case] now: u64, #[case] expected: bool) {
        let mut timer = TimerMilli::default();
        timer.fire_at_opt(fire_time.map(TimeMilli::from_millis));
        assert_eq!(timer.is_due(TimeMilli::from_millis(now)), expected);
    }

    #[test]
    fn test_stop() {
        let mut timer = TimerMilli::default();
        timer.fire_at(TimeMilli::from_millis(3));
        assert!(timer.is_running());
        timer.stop();
        assert!(!timer.is_running());
        assert!(!timer.is_due(TimeMilli::from_millis(1000)));
    }

    #[test]
    fn test_time_arithmetic() {
        let t = TimeMilli::from_millis(1000) + 500;
        assert_eq!(t, TimeMilli::from_millis(1500));
        assert_eq!(t - TimeMilli::from_millis(1000), Duration::from_millis(500));
        assert_eq!(TimeMilli::from_millis(1000) - t, Duration::ZERO);
    }
}

/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time remains.
    Running { remaining: u32 },
    /// This tick reached zero. Reported once.
    Expired,
    /// The countdown is frozen and the tick was ignored.
    Frozen,
}

/// Remaining time of a timed quiz, in whole seconds.
///
/// Remaining time never increases. Reaching zero freezes the countdown for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    frozen: bool,
}

impl Countdown {
    /// Countdown for a limit in minutes. `None` for a zero limit.
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::from_secs(minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn from_secs(secs: u32) -> Option<Self> {
        (secs > 0).then_some(Self {
            remaining: secs,
            frozen: false,
        })
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.frozen || self.remaining == 0 {
            return TickOutcome::Frozen;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.frozen = true;
            return TickOutcome::Expired;
        }
        TickOutcome::Running {
            remaining: self.remaining,
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Unfreezes unless time already ran out. Returns whether the countdown runs again.
    pub fn resume(&mut self) -> bool {
        if self.remaining > 0 {
            self.frozen = false;
        }
        !self.frozen
    }
}

/// Formats seconds as `m:ss`.
#[must_use]
pub fn format_remaining(secs: u32) -> String {
    let minutes = secs / 60;
    let remainder = secs % 60;
    format!("{minutes}:{remainder:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_has_no_countdown() {
        assert!(Countdown::from_minutes(0).is_none());
        assert_eq!(Countdown::from_minutes(2).unwrap().remaining(), 120);
    }

    #[test]
    fn ticks_decrease_by_one_and_expire_once() {
        let mut countdown = Countdown::from_secs(3).unwrap();
        assert_eq!(countdown.tick(), TickOutcome::Running { remaining: 2 });
        assert_eq!(countdown.tick(), TickOutcome::Running { remaining: 1 });
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        assert_eq!(countdown.tick(), TickOutcome::Frozen);
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.is_frozen());
    }

    #[test]
    fn frozen_countdown_ignores_ticks() {
        let mut countdown = Countdown::from_secs(10).unwrap();
        countdown.freeze();
        assert_eq!(countdown.tick(), TickOutcome::Frozen);
        assert_eq!(countdown.remaining(), 10);
        assert!(countdown.resume());
        assert_eq!(countdown.tick(), TickOutcome::Running { remaining: 9 });
    }

    #[test]
    fn expired_countdown_never_resumes() {
        let mut countdown = Countdown::from_secs(1).unwrap();
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        assert!(!countdown.resume());
        assert_eq!(countdown.tick(), TickOutcome::Frozen);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(59), "0:59");
        assert_eq!(format_remaining(600), "10:00");
        assert_eq!(format_remaining(61), "1:01");
    }
}

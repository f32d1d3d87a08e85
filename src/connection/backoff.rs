use std::time::Duration;

/// Exponential backoff schedule for session reconnect attempts.
///
/// Grows from `initial` by `multiplier` per attempt, capped at `max`. The
/// schedule never gives up: a session only ends on explicit disconnect or a
/// fatal error, so there is no attempt limit. `reset()` is called whenever a
/// connection succeeds.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier,
            attempt: 0,
        }
    }

    /// Returns the delay before the next attempt and advances the schedule.
    pub(crate) fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let delay = self.current;

        let next = self.current.as_secs_f64() * self.multiplier;
        self.current = Duration::from_secs_f64(next).min(self.max);

        delay
    }

    /// Back to the initial delay; call on successful connection.
    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    /// 1 s initial, doubling, capped at 60 s.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let mut backoff = Backoff::default();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));

        for _ in 0..16 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn never_exhausts() {
        let mut backoff = Backoff::default();
        for _ in 0..1000 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }
}

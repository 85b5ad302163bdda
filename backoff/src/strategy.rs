//! Cool-off interval strategies. Each strategy is a plain `Iterator` over
//! [`Duration`]s so it can be bounded with `take` or chained freely.

use std::time::Duration;

use rand::Rng;

/// Yields the same interval forever. Bound it with `take`.
#[derive(Debug, Clone)]
pub struct Fixed {
    interval: Duration,
}

impl Fixed {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            interval: Duration::from_millis(millis),
        }
    }
}

impl Iterator for Fixed {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// Exponentially growing interval, `base * factor^attempt`, capped at `max`
/// and optionally randomized with a jitter fraction in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct Exponential {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    attempts_left: Option<u32>,
    next_ms: f64,
}

impl Exponential {
    /// `attempts` bounds the number of intervals yielded; `None` never stops.
    pub fn new(
        base: Duration,
        max: Duration,
        factor: f64,
        jitter: f64,
        attempts: Option<u32>,
    ) -> Self {
        Self {
            base,
            max,
            factor,
            jitter,
            attempts_left: attempts,
            next_ms: base.as_millis() as f64,
        }
    }

    pub fn from_millis(
        base_ms: u64,
        max_ms: u64,
        factor: f64,
        jitter: f64,
        attempts: Option<u32>,
    ) -> Self {
        Self::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            factor,
            jitter,
            attempts,
        )
    }
}

impl Iterator for Exponential {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        match self.attempts_left.as_mut() {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }

        let raw_ms = self.next_ms;
        self.next_ms = (self.next_ms * self.factor).min(self.max.as_millis() as f64);

        let jittered_ms = if self.jitter == 0.0 {
            raw_ms
        } else {
            raw_ms * rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter)
        };
        Some(Duration::from_millis(jittered_ms as u64).min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_repeats() {
        let intervals: Vec<_> = Fixed::from_millis(10).take(3).collect();
        assert_eq!(intervals, vec![Duration::from_millis(10); 3]);
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let mut b = Exponential::from_millis(100, 10_000, 2.0, 0.0, None);
        assert_eq!(b.next(), Some(Duration::from_millis(100)));
        assert_eq!(b.next(), Some(Duration::from_millis(200)));
        assert_eq!(b.next(), Some(Duration::from_millis(400)));
        assert_eq!(b.next(), Some(Duration::from_millis(800)));
    }

    #[test]
    fn exponential_caps_at_max() {
        let mut b = Exponential::from_millis(100, 300, 2.0, 0.0, None);
        assert_eq!(b.next(), Some(Duration::from_millis(100)));
        assert_eq!(b.next(), Some(Duration::from_millis(200)));
        assert_eq!(b.next(), Some(Duration::from_millis(300)));
        assert_eq!(b.next(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn exponential_bounded_attempts() {
        let mut b = Exponential::from_millis(100, 10_000, 2.0, 0.0, Some(2));
        assert!(b.next().is_some());
        assert!(b.next().is_some());
        assert_eq!(b.next(), None);
    }

    #[test]
    fn exponential_jitter_stays_in_band() {
        let mut b = Exponential::from_millis(100, 10_000, 2.0, 0.5, None);
        let d = b.next().unwrap();
        assert!(d >= Duration::from_millis(50));
        assert!(d <= Duration::from_millis(150));
    }
}

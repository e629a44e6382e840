//! # Fibonacci Backoff
//!
//! Progressive retry delays for failing resources: 1, 1, 2, 3, 5, 8 ...
//! minutes, capped at a maximum.

/// Fibonacci backoff between `min_minutes` and `max_minutes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciBackoff {
    max_minutes: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            max_minutes: max_minutes.max(min_minutes),
            previous: 0,
            current: min_minutes,
        }
    }

    /// Next delay in seconds, advancing the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let minutes = self.current.min(self.max_minutes);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next;
        minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_fibonacci_in_minutes() {
        let mut backoff = FibonacciBackoff::new(1, 60);
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_backoff_seconds() / 60).collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 5, 8, 13]);
    }

    #[test]
    fn test_sequence_is_capped() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_backoff_seconds() / 60).collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 5, 8, 10, 10]);
    }

    #[test]
    fn test_zero_minimum_starts_at_one_minute() {
        let mut backoff = FibonacciBackoff::new(0, 10);
        assert_eq!(backoff.next_backoff_seconds(), 60);
    }
}

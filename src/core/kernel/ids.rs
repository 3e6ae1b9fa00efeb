use crate::core::errors::ExchangeError;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of sub-indices multiplexed into one tick
pub const FANOUT: u64 = 400;

/// 2024-01-01T00:00:00Z expressed in 10 ms ticks
const FIXED_OFFSET: u64 = 170_406_720_000;

/// Tick resolution in milliseconds
const TICK_MS: u64 = 10;

/// Generates strictly increasing, time-ordered correlation ids
///
/// An id is `tick * FANOUT + sub_index`, where `tick` follows the wall clock at
/// 10 ms resolution but is bumped by one whenever the clock has not advanced
/// since the previous call. Ids from one generator never repeat or go backwards,
/// even if the wall clock does.
#[derive(Debug, Default)]
pub struct CorrelationIdGenerator {
    last_tick: Mutex<u64>,
}

impl CorrelationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for sub-index 0
    pub fn generate(&self) -> u64 {
        self.issue(Self::now_ms(), 0)
    }

    /// Next id carrying `sub_index`, which must be below [`FANOUT`]
    pub fn next_id(&self, sub_index: u64) -> Result<u64, ExchangeError> {
        if sub_index >= FANOUT {
            return Err(ExchangeError::InvalidParameters(format!(
                "sub index {} exceeds fan-out {}",
                sub_index, FANOUT
            )));
        }
        Ok(self.issue(Self::now_ms(), sub_index))
    }

    /// Recover the sub-index an id was issued with
    pub const fn decode_sub_index(id: u64) -> u64 {
        id % FANOUT
    }

    fn issue(&self, now_ms: u64, sub_index: u64) -> u64 {
        let tick = (now_ms / TICK_MS).saturating_sub(FIXED_OFFSET);
        let chosen = {
            let mut last = self.last_tick.lock();
            let chosen = if tick <= *last { *last + 1 } else { tick };
            *last = chosen;
            chosen
        };
        chosen * FANOUT + sub_index
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_same_tick_is_bumped() {
        let generator = CorrelationIdGenerator::new();
        let now = 1_750_000_000_000;
        let first = generator.issue(now, 0);
        let second = generator.issue(now, 0);
        let third = generator.issue(now + 3, 0);
        assert!(first < second);
        assert!(second < third);
        assert_eq!(second - first, FANOUT);
    }

    #[test]
    fn test_clock_going_backwards_stays_monotonic() {
        let generator = CorrelationIdGenerator::new();
        let later = generator.issue(1_750_000_100_000, 0);
        let earlier = generator.issue(1_750_000_000_000, 0);
        assert!(earlier > later);
    }

    #[test]
    fn test_decode_sub_index() {
        let generator = CorrelationIdGenerator::new();
        for k in [0, 1, 7, 199, FANOUT - 1] {
            let id = generator.next_id(k).unwrap();
            assert_eq!(CorrelationIdGenerator::decode_sub_index(id), k);
        }
    }

    #[test]
    fn test_sub_index_out_of_range() {
        let generator = CorrelationIdGenerator::new();
        assert!(matches!(
            generator.next_id(FANOUT),
            Err(ExchangeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_concurrent_ids_are_unique_and_increasing() {
        let generator = Arc::new(CorrelationIdGenerator::new());
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || {
                    (0..250u64)
                        .map(|i| generator.next_id((worker * 31 + i) % FANOUT).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(all.len(), 2000);
    }
}

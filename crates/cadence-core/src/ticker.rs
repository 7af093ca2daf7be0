// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Drift-free periodic ticking.

use crate::clock::{MonotonicClock, TimeSource};
use std::sync::Arc;
use std::time::Duration;

/// Reports, on each poll, whether another full period has elapsed.
///
/// When a period elapses the start mark moves forward by exactly one period
/// rather than snapping to the current time, so irregular polling never
/// accumulates drift: over a long run the number of `true` results tracks
/// `elapsed / period`.
#[derive(Debug, Clone)]
pub struct Ticker {
    source: Arc<dyn TimeSource>,
    start: Duration,
    period: Duration,
}

impl Ticker {
    /// Creates a ticker on the process clock, starting now.
    /// ## Arguments
    /// * `period` - The interval between successive ticks.
    /// ## Returns
    /// A new instance of the Ticker struct.
    pub fn new(period: Duration) -> Self {
        Self::with_source(period, Arc::new(*MonotonicClock::process()))
    }

    /// Creates a ticker reading time from `source`, starting now.
    pub fn with_source(period: Duration, source: Arc<dyn TimeSource>) -> Self {
        let start = source.now();
        Self {
            source,
            start,
            period,
        }
    }

    /// Polls the ticker.
    /// ## Returns
    /// `true` if at least one full period has elapsed since the current start
    /// mark, in which case the mark advances by one period. A caller that
    /// fell several periods behind gets one `true` per poll until it catches
    /// up.
    pub fn tick(&mut self) -> bool {
        let current = self.source.now();
        if current.saturating_sub(self.start) >= self.period {
            self.start += self.period;
            true
        } else {
            false
        }
    }

    /// Replaces the period. The start mark is left where it is.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// Restarts the ticker from the current time.
    pub fn reset(&mut self) {
        self.start = self.source.now();
    }

    /// The current period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn manual(period_ms: u64) -> (Arc<ManualClock>, Ticker) {
        let clock = Arc::new(ManualClock::new());
        let ticker = Ticker::with_source(Duration::from_millis(period_ms), clock.clone());
        (clock, ticker)
    }

    #[test]
    fn does_not_tick_before_a_full_period() {
        let (clock, mut ticker) = manual(10);
        assert!(!ticker.tick());
        clock.advance(Duration::from_millis(9));
        assert!(!ticker.tick());
        clock.advance(Duration::from_millis(1));
        assert!(ticker.tick());
        assert!(!ticker.tick());
    }

    #[test]
    fn advances_by_exactly_one_period_per_tick() {
        let (clock, mut ticker) = manual(10);

        // 2.5 periods late: two catch-up ticks, then the half period remains.
        clock.advance(Duration::from_millis(25));
        assert!(ticker.tick());
        assert!(ticker.tick());
        assert!(!ticker.tick());

        // Only 5 ms more completes the third period.
        clock.advance(Duration::from_millis(5));
        assert!(ticker.tick());
    }

    #[test]
    fn irregular_polling_does_not_drift() {
        let (clock, mut ticker) = manual(10);
        let mut ticks = 0;
        // Poll every 7 ms for 700 ms.
        for _ in 0..100 {
            clock.advance(Duration::from_millis(7));
            if ticker.tick() {
                ticks += 1;
            }
        }
        // A reset-to-now policy would lose the 4 ms remainder on every
        // other tick and end up near 50.
        assert!(ticks >= 69, "only {ticks} ticks in 700 ms at a 10 ms period");
    }

    #[test]
    fn zero_period_ticks_on_every_poll() {
        let (_clock, mut ticker) = manual(0);
        for _ in 0..5 {
            assert!(ticker.tick());
        }
    }

    #[test]
    fn set_period_keeps_the_start_mark() {
        let (clock, mut ticker) = manual(100);
        clock.advance(Duration::from_millis(30));
        ticker.set_period(Duration::from_millis(20));
        assert_eq!(ticker.period(), Duration::from_millis(20));
        assert!(ticker.tick());
    }

    #[test]
    fn reset_restarts_from_now() {
        let (clock, mut ticker) = manual(10);
        clock.advance(Duration::from_millis(50));
        ticker.reset();
        assert!(!ticker.tick());
        clock.advance(Duration::from_millis(10));
        assert!(ticker.tick());
    }

    #[test]
    fn ticks_on_the_process_clock() {
        let mut ticker = Ticker::new(Duration::from_millis(20));
        assert!(!ticker.tick());
        thread::sleep(Duration::from_millis(30));
        assert!(ticker.tick());
    }
}

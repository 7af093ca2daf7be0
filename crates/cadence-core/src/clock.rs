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

//! Monotonic time sources.
//!
//! Every reading is a [`Duration`] elapsed since a fixed reference point, so
//! readings from the same source can be subtracted without ever going
//! negative.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

/// A source of monotonic time and blocking waits.
///
/// The control table and [`Ticker`](crate::Ticker) only ever talk to time
/// through this trait, which lets tests and embedders swap the wall clock for
/// something else.
pub trait TimeSource: Send + Sync + Debug {
    /// Time elapsed since this source's reference point. Never decreases.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for approximately `duration`.
    ///
    /// Not cancellable.
    fn wait(&self, duration: Duration);

    /// Requests that the source report `time` from now on.
    ///
    /// Sources that cannot be rebased without going backward ignore this.
    fn set_time(&self, time: Duration) {
        log::debug!("TimeSource: set_time({time:?}) ignored by {self:?}");
    }
}

/// The process clock, backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

static PROCESS_CLOCK: OnceLock<MonotonicClock> = OnceLock::new();

impl MonotonicClock {
    /// Creates a clock whose reference point is the moment of this call.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Returns the process-wide clock.
    ///
    /// Its reference point is captured the first time any thread asks for it;
    /// concurrent first calls all observe the same epoch.
    pub fn process() -> &'static MonotonicClock {
        PROCESS_CLOCK.get_or_init(|| {
            log::trace!("MonotonicClock: process epoch captured");
            MonotonicClock::new()
        })
    }

    /// The instant readings are measured from.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        *Self::process()
    }
}

impl TimeSource for MonotonicClock {
    #[inline]
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Time elapsed since the process epoch.
#[inline]
pub fn now() -> Duration {
    MonotonicClock::process().now()
}

/// Sleeps the calling thread for approximately `duration`.
#[inline]
pub fn wait(duration: Duration) {
    MonotonicClock::process().wait(duration)
}

/// A hand-driven time source.
///
/// Time only moves when [`advance`](Self::advance) or
/// [`set_time`](TimeSource::set_time) is called, or when a thread waits on
/// it: `wait` advances the clock by the requested amount and returns
/// immediately. Useful for deterministic simulation and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(to_nanos(delta), Ordering::AcqRel);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn wait(&self, duration: Duration) {
        self.advance(duration);
        thread::yield_now();
    }

    /// Jumps forward to `time`. Earlier times are ignored.
    fn set_time(&self, time: Duration) {
        self.nanos.fetch_max(to_nanos(time), Ordering::AcqRel);
    }
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

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

//! The shared control table.

use crate::config::ControlConfig;
use crate::entry::{ControlEntry, CycleStats, ThreadState};
use crate::error::{ControlError, ControlResult};
use crate::event::ControlEvent;
use cadence_core::{MonotonicClock, TimeSource};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Paces worker loops and relays suspend, resume, and terminate requests
/// between threads.
///
/// Workers register implicitly on their first [`cycle`](Self::cycle). Every
/// operation may be called from any thread; all state sits behind one
/// table-wide lock that is never held across a sleep. Blocked threads poll
/// the table every [`ControlConfig::poll_interval`].
#[derive(Debug)]
pub struct ControlTable {
    config: ControlConfig,
    source: Arc<dyn TimeSource>,
    entries: Mutex<HashMap<ThreadId, ControlEntry>>,
    event_tx: Sender<ControlEvent>,
    event_rx: Receiver<ControlEvent>,
}

impl ControlTable {
    /// Creates a table with the default configuration on the process clock.
    pub fn new() -> Self {
        Self::with_config(ControlConfig::default())
    }

    /// Creates a table with the given configuration on the process clock.
    pub fn with_config(config: ControlConfig) -> Self {
        Self::with_time_source(config, Arc::new(*MonotonicClock::process()))
    }

    /// Creates a table that reads and waits on a custom time source.
    ///
    /// An invalid configuration is not fatal: the offending values are
    /// replaced with their defaults and a warning is logged.
    pub fn with_time_source(mut config: ControlConfig, source: Arc<dyn TimeSource>) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("ControlTable: {e}; using the default poll interval");
            config.poll_interval = ControlConfig::default().poll_interval;
        }
        let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_buffer_size);
        Self {
            config,
            source,
            entries: Mutex::new(HashMap::new()),
            event_tx,
            event_rx,
        }
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Returns a receiver for lifecycle events.
    ///
    /// All receivers share one bounded queue, so each event is seen by a
    /// single receiver. When nobody drains it, events past
    /// [`ControlConfig::event_buffer_size`] are dropped.
    pub fn events(&self) -> Receiver<ControlEvent> {
        self.event_rx.clone()
    }

    /// Paces the calling thread's loop. Call exactly once per iteration and
    /// use the result as the loop condition.
    ///
    /// The call registers the thread if needed, parks it for as long as a
    /// suspend request is outstanding, then sleeps off whatever remains of
    /// `period` after the work done since the previous call. A loop that
    /// overruns its period proceeds immediately.
    ///
    /// ## Returns
    /// `false` exactly once after the thread was marked for termination; its
    /// entry has been removed by then. A later call registers it afresh.
    pub fn cycle(&self, period: Duration) -> bool {
        let id = thread::current().id();

        // Register, then raise the trap flag before the first suspend check.
        let registered = {
            let mut entries = self.entries();
            let mut registered = false;
            let entry = entries.entry(id).or_insert_with(|| {
                registered = true;
                ControlEntry::new(self.source.now())
            });
            entry.trapped = true;
            registered
        };
        if registered {
            log::debug!("ControlTable: registered {id:?}");
            self.emit(ControlEvent::Registered(id));
        }

        // Leaving the loop re-checks the request and drops the trap flag under
        // one lock, so a controller that saw us trapped keeps us here.
        let mut parked = false;
        let mut entry = loop {
            {
                let mut entries = self.entries();
                let entry = entries
                    .entry(id)
                    .or_insert_with(|| ControlEntry::new(self.source.now()));
                if !entry.suspend_requested {
                    entry.trapped = false;
                    break *entry;
                }
            }
            if !parked {
                parked = true;
                log::debug!("ControlTable: {id:?} suspended");
                self.emit(ControlEvent::Trapped(id));
            }
            self.source.wait(self.config.poll_interval);
        };
        if parked {
            log::debug!("ControlTable: {id:?} resumed");
            self.emit(ControlEvent::Released(id));
        }

        entry.requested_period = period;
        entry.cycle_end = self.source.now();
        entry.work_duration = entry.cycle_end.saturating_sub(entry.cycle_start);
        entry.halt_duration = period.saturating_sub(entry.work_duration);
        if !entry.halt_duration.is_zero() {
            self.source.wait(entry.halt_duration);
        }
        entry.total_duration = entry.work_duration + entry.halt_duration;
        entry.cycle_start = self.source.now();

        // Requests that arrived while we slept live in the table, not in our copy.
        let terminate = {
            let mut entries = self.entries();
            let shared = entries
                .entry(id)
                .or_insert_with(|| ControlEntry::new(entry.cycle_start));
            shared.publish_cycle(&entry);
            let terminate = shared.terminate_requested;
            if terminate {
                entries.remove(&id);
            }
            terminate
        };
        if terminate {
            log::debug!("ControlTable: {id:?} terminated");
            self.emit(ControlEvent::Removed(id));
        }

        !terminate
    }

    /// Does nothing: a thread cannot suspend itself, since it would have to
    /// be inside `cycle` to notice the request.
    pub fn suspend_current(&self) {
        self.suspend(thread::current().id());
    }

    /// Suspends `id` and blocks until it is parked.
    ///
    /// Returns immediately if `id` is the calling thread or is not registered.
    pub fn suspend(&self, id: ThreadId) {
        self.suspend_set(&[id]);
    }

    /// Suspends every listed thread and blocks until all of the ones still
    /// registered are parked.
    ///
    /// The calling thread is skipped. Waits indefinitely for a target that
    /// never calls `cycle` again; see [`try_suspend_set`](Self::try_suspend_set)
    /// for a bounded wait.
    pub fn suspend_set(&self, ids: &[ThreadId]) {
        // Without a timeout this can only return Ok.
        let _ = self.suspend_within(ids, None);
    }

    /// Suspends every registered thread other than the caller, as of this call.
    pub fn suspend_all(&self) {
        let ids = self.registered();
        self.suspend_set(&ids);
    }

    /// [`suspend`](Self::suspend) with a bound on the wait.
    pub fn try_suspend(&self, id: ThreadId, timeout: Duration) -> ControlResult<()> {
        self.try_suspend_set(&[id], timeout)
    }

    /// [`suspend_set`](Self::suspend_set) with a bound on the wait.
    ///
    /// On timeout the suspend requests stay in place, so targets still park
    /// when they next poll; call [`resume_set`](Self::resume_set) to withdraw
    /// them.
    pub fn try_suspend_set(&self, ids: &[ThreadId], timeout: Duration) -> ControlResult<()> {
        self.suspend_within(ids, Some(timeout))
    }

    fn suspend_within(&self, ids: &[ThreadId], timeout: Option<Duration>) -> ControlResult<()> {
        let caller = thread::current().id();
        let targets: Vec<ThreadId> = ids.iter().copied().filter(|id| *id != caller).collect();
        if targets.len() != ids.len() {
            log::debug!("ControlTable: {caller:?} cannot suspend itself; skipped");
        }
        if targets.is_empty() {
            return Ok(());
        }

        log::info!("ControlTable: suspending {} thread(s)", targets.len());
        let started = self.source.now();
        loop {
            let pending: Vec<ThreadId> = {
                let mut entries = self.entries();
                // Re-flagged on every pass; a concurrent resume does not win.
                for id in &targets {
                    if let Some(entry) = entries.get_mut(id) {
                        entry.suspend_requested = true;
                    }
                }
                targets
                    .iter()
                    .copied()
                    .filter(|id| entries.get(id).is_some_and(|entry| !entry.trapped))
                    .collect()
            };
            if pending.is_empty() {
                return Ok(());
            }

            if let Some(timeout) = timeout {
                let waited = self.source.now().saturating_sub(started);
                if waited >= timeout {
                    log::warn!(
                        "ControlTable: {} thread(s) did not suspend within {timeout:?}",
                        pending.len()
                    );
                    return Err(ControlError::SuspendTimeout { pending, waited });
                }
            }
            log::trace!("ControlTable: waiting on {} thread(s)", pending.len());
            self.source.wait(self.config.poll_interval);
        }
    }

    /// Withdraws the suspend request for `id`. Does not wait for it to wake.
    pub fn resume(&self, id: ThreadId) {
        self.resume_set(&[id]);
    }

    /// Withdraws the suspend request for every listed thread.
    pub fn resume_set(&self, ids: &[ThreadId]) {
        log::info!("ControlTable: resuming {} thread(s)", ids.len());
        let mut entries = self.entries();
        for id in ids {
            if let Some(entry) = entries.get_mut(id) {
                entry.suspend_requested = false;
            }
        }
    }

    /// Resumes every registered thread, as of this call.
    pub fn resume_all(&self) {
        let ids = self.registered();
        self.resume_set(&ids);
    }

    /// Marks the calling thread for termination; its next `cycle` returns `false`.
    pub fn terminate_current(&self) {
        self.terminate(thread::current().id());
    }

    /// Marks `id` for termination. The entry is removed by that thread's next
    /// `cycle`.
    pub fn terminate(&self, id: ThreadId) {
        self.terminate_set(&[id]);
    }

    /// Marks every listed thread for termination.
    pub fn terminate_set(&self, ids: &[ThreadId]) {
        log::info!("ControlTable: terminating {} thread(s)", ids.len());
        let mut entries = self.entries();
        for id in ids {
            if let Some(entry) = entries.get_mut(id) {
                entry.terminate_requested = true;
            }
        }
    }

    /// Marks every registered thread for termination, as of this call.
    ///
    /// Suspended threads only observe this once resumed.
    pub fn terminate_all(&self) {
        let ids = self.registered();
        self.terminate_set(&ids);
    }

    /// Whether the calling thread currently has an entry.
    pub fn exists(&self) -> bool {
        self.entries().contains_key(&thread::current().id())
    }

    /// Work time of the calling thread's last completed cycle.
    pub fn work_time(&self) -> Duration {
        self.stats().map(|s| s.work_time).unwrap_or_default()
    }

    /// Pacing sleep of the calling thread's last completed cycle.
    pub fn halt_time(&self) -> Duration {
        self.stats().map(|s| s.halt_time).unwrap_or_default()
    }

    /// Work plus pacing sleep of the calling thread's last completed cycle.
    pub fn total_time(&self) -> Duration {
        self.stats().map(|s| s.total_time).unwrap_or_default()
    }

    /// Timings of the calling thread's last completed cycle, or `None` if it
    /// is not registered. Never registers the caller.
    pub fn stats(&self) -> Option<CycleStats> {
        self.entries()
            .get(&thread::current().id())
            .map(ControlEntry::stats)
    }

    /// Where `id` stands in the control protocol, or `None` if it has no entry.
    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.entries().get(&id).map(ControlEntry::state)
    }

    /// Snapshot of every registered thread.
    pub fn registered(&self) -> Vec<ThreadId> {
        self.entries().keys().copied().collect()
    }

    /// Number of registered threads.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if no thread is registered.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    // Entries are plain data written field by field, so a panic elsewhere
    // cannot leave one half-updated.
    fn entries(&self) -> MutexGuard<'_, HashMap<ThreadId, ControlEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ControlEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::trace!("ControlTable: event buffer full, dropped {event:?}");
        }
    }
}

impl Default for ControlTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::ManualClock;

    fn manual_table() -> (Arc<ManualClock>, ControlTable) {
        let clock = Arc::new(ManualClock::new());
        let table = ControlTable::with_time_source(ControlConfig::default(), clock.clone());
        (clock, table)
    }

    #[test]
    fn first_cycle_registers_the_caller() {
        let (_clock, table) = manual_table();
        assert!(!table.exists());
        assert!(table.is_empty());

        assert!(table.cycle(Duration::from_millis(10)));

        assert!(table.exists());
        assert_eq!(table.len(), 1);
        assert_eq!(table.state(thread::current().id()), Some(ThreadState::Active));
    }

    #[test]
    fn cycle_sleeps_off_the_rest_of_the_period() {
        let (clock, table) = manual_table();
        let period = Duration::from_millis(10);

        table.cycle(period);
        assert_eq!(table.work_time(), Duration::ZERO);
        assert_eq!(table.halt_time(), period);
        assert_eq!(clock.now(), period);

        clock.advance(Duration::from_millis(3));
        table.cycle(period);
        assert_eq!(table.work_time(), Duration::from_millis(3));
        assert_eq!(table.halt_time(), Duration::from_millis(7));
        assert_eq!(table.total_time(), period);
        assert_eq!(clock.now(), Duration::from_millis(20));
    }

    #[test]
    fn overrun_cycles_do_not_halt() {
        let (clock, table) = manual_table();
        let period = Duration::from_millis(10);
        table.cycle(period);

        clock.advance(Duration::from_millis(25));
        let before = clock.now();
        table.cycle(period);

        let stats = table.stats().unwrap();
        assert_eq!(stats.work_time, Duration::from_millis(25));
        assert_eq!(stats.halt_time, Duration::ZERO);
        assert_eq!(stats.total_time, stats.work_time + stats.halt_time);
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn latest_period_wins() {
        let (_clock, table) = manual_table();
        table.cycle(Duration::from_millis(10));
        table.cycle(Duration::from_millis(40));

        let stats = table.stats().unwrap();
        assert_eq!(stats.requested_period, Duration::from_millis(40));
        assert_eq!(stats.total_time, Duration::from_millis(40));
    }

    #[test]
    fn terminate_current_ends_the_loop_once() {
        let (_clock, table) = manual_table();
        table.cycle(Duration::ZERO);

        table.terminate_current();
        assert_eq!(
            table.state(thread::current().id()),
            Some(ThreadState::TerminatePending)
        );
        assert!(!table.cycle(Duration::ZERO));
        assert!(!table.exists());

        // The identity may come back.
        assert!(table.cycle(Duration::ZERO));
        assert!(table.exists());
    }

    #[test]
    fn queries_do_not_register() {
        let (_clock, table) = manual_table();
        assert_eq!(table.work_time(), Duration::ZERO);
        assert_eq!(table.halt_time(), Duration::ZERO);
        assert_eq!(table.total_time(), Duration::ZERO);
        assert_eq!(table.stats(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn self_suspension_is_skipped() {
        let (_clock, table) = manual_table();
        table.cycle(Duration::ZERO);
        let me = thread::current().id();

        table.suspend_current();
        table.suspend(me);
        table.suspend_set(&[me]);
        table.suspend_all();

        assert_eq!(table.state(me), Some(ThreadState::Active));
        assert!(table.try_suspend(me, Duration::ZERO).is_ok());
    }

    #[test]
    fn requests_for_unknown_threads_are_ignored() {
        let (_clock, table) = manual_table();
        let stranger = thread::spawn(|| thread::current().id()).join().unwrap();

        table.suspend(stranger);
        table.resume(stranger);
        table.terminate(stranger);

        assert!(table.is_empty());
        assert_eq!(table.state(stranger), None);
    }

    #[test]
    fn lifecycle_events_are_published() {
        let (_clock, table) = manual_table();
        let events = table.events();
        let me = thread::current().id();

        table.cycle(Duration::ZERO);
        table.terminate_current();
        table.cycle(Duration::ZERO);

        let seen: Vec<_> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![ControlEvent::Registered(me), ControlEvent::Removed(me)]
        );
    }

    #[test]
    fn full_event_buffer_drops_instead_of_blocking() {
        let config = ControlConfig {
            event_buffer_size: 1,
            ..Default::default()
        };
        let table = ControlTable::with_time_source(config, Arc::new(ManualClock::new()));
        table.cycle(Duration::ZERO);
        table.terminate_current();
        table.cycle(Duration::ZERO);

        let seen: Vec<_> = table.events().try_iter().collect();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn invalid_config_falls_back_to_default_poll_interval() {
        let config = ControlConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        let table = ControlTable::with_config(config);
        assert_eq!(
            table.config().poll_interval,
            ControlConfig::default().poll_interval
        );
    }

    #[test]
    fn try_suspend_times_out_on_a_silent_thread() {
        let (clock, table) = manual_table();
        let table = Arc::new(table);
        let (registered_tx, registered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let worker = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                table.cycle(Duration::ZERO);
                registered_tx.send(thread::current().id()).unwrap();
                // Never polls again until released.
                release_rx.recv().unwrap();
                table.cycle(Duration::ZERO)
            })
        };
        let id = registered_rx.recv().unwrap();

        let before = clock.now();
        let err = table
            .try_suspend(id, Duration::from_millis(5))
            .unwrap_err();
        assert!(clock.now() >= before + Duration::from_millis(5));
        match err {
            ControlError::SuspendTimeout { pending, waited } => {
                assert_eq!(pending, vec![id]);
                assert!(waited >= Duration::from_millis(5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(table.state(id), Some(ThreadState::SuspendPending));

        table.resume(id);
        release_tx.send(()).unwrap();
        assert!(worker.join().unwrap());
    }
}

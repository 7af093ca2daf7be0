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

//! Per-thread control records and the snapshots derived from them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One thread's flags and timings, owned by the table.
///
/// The three request flags are written by controllers; `trapped` and the
/// timings are written only by the owning thread from inside `cycle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ControlEntry {
    pub suspend_requested: bool,
    pub trapped: bool,
    pub terminate_requested: bool,

    pub cycle_start: Duration,
    pub cycle_end: Duration,
    pub work_duration: Duration,
    pub halt_duration: Duration,
    pub total_duration: Duration,
    pub requested_period: Duration,
}

impl ControlEntry {
    /// A fresh entry whose first unit of work starts at `now`.
    pub fn new(now: Duration) -> Self {
        Self {
            cycle_start: now,
            ..Default::default()
        }
    }

    /// Copies the owner-written fields of `local` into this entry, leaving the
    /// controller-written request flags untouched.
    pub fn publish_cycle(&mut self, local: &ControlEntry) {
        self.trapped = local.trapped;
        self.cycle_start = local.cycle_start;
        self.cycle_end = local.cycle_end;
        self.work_duration = local.work_duration;
        self.halt_duration = local.halt_duration;
        self.total_duration = local.total_duration;
        self.requested_period = local.requested_period;
    }

    pub fn stats(&self) -> CycleStats {
        CycleStats {
            requested_period: self.requested_period,
            work_time: self.work_duration,
            halt_time: self.halt_duration,
            total_time: self.total_duration,
        }
    }

    pub fn state(&self) -> ThreadState {
        if self.suspend_requested {
            if self.trapped {
                ThreadState::Suspended
            } else {
                ThreadState::SuspendPending
            }
        } else if self.terminate_requested {
            ThreadState::TerminatePending
        } else {
            ThreadState::Active
        }
    }
}

/// Timings of a thread's most recently completed cycle.
///
/// `total_time` is always `work_time + halt_time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    /// The period passed to the last `cycle` call.
    pub requested_period: Duration,
    /// Time spent between the end of the previous cycle and the start of this
    /// one's pacing sleep.
    pub work_time: Duration,
    /// Time slept to fill out the period. Zero when the work overran.
    pub halt_time: Duration,
    /// `work_time + halt_time`.
    pub total_time: Duration,
}

/// Where a registered thread stands in the control protocol.
///
/// Unregistered and removed threads have no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Running its loop normally.
    Active,
    /// Asked to suspend, but has not reached its wait loop yet.
    SuspendPending,
    /// Parked inside `cycle` until resumed.
    Suspended,
    /// Will leave the table when its next `cycle` completes.
    TerminatePending,
}

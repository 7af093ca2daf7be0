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

//! Lifecycle notifications published by the control table.

use std::thread::ThreadId;

/// A change in a thread's control state.
///
/// Events are delivered best-effort over a bounded channel; see
/// [`ControlTable::events`](crate::ControlTable::events).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The thread called `cycle` for the first time and now has an entry.
    Registered(ThreadId),
    /// The thread entered its suspend-wait loop with a suspend request pending.
    Trapped(ThreadId),
    /// The thread left its suspend-wait loop after being resumed.
    Released(ThreadId),
    /// The thread completed a cycle while marked for termination; its entry is gone.
    Removed(ThreadId),
}

impl ControlEvent {
    /// The thread this event is about.
    pub fn thread(&self) -> ThreadId {
        match *self {
            ControlEvent::Registered(id)
            | ControlEvent::Trapped(id)
            | ControlEvent::Released(id)
            | ControlEvent::Removed(id) => id,
        }
    }
}

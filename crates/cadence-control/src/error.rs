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

//! Error types for the control table.

use std::thread::ThreadId;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for control table operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors surfaced by the control table.
///
/// Requests against unknown threads are not errors; they are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The configuration cannot drive a table.
    #[error("invalid control configuration: {0}")]
    InvalidConfig(String),

    /// A bounded suspend gave up before every target acknowledged.
    #[error("timed out after {waited:?} waiting for {} thread(s) to suspend", .pending.len())]
    SuspendTimeout {
        /// Targets that were still registered but not yet parked.
        pending: Vec<ThreadId>,
        /// How long the requester waited.
        waited: Duration,
    },
}

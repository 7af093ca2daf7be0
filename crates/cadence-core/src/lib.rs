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

//! # Cadence Core
//!
//! Time primitives shared by the pacing and control layers: a process-scoped
//! monotonic clock, the [`TimeSource`] seam used to substitute it, and the
//! drift-free [`Ticker`].

#![warn(missing_docs)]

pub mod clock;
pub mod ticker;

pub use clock::{now, wait, ManualClock, MonotonicClock, TimeSource};
pub use ticker::Ticker;

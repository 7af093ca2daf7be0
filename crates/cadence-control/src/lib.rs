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

//! # Cadence Control
//!
//! A cooperative thread-pacing and control facility. Worker loops call
//! [`ControlTable::cycle`] once per iteration; a controller thread uses the
//! same table to suspend, resume, or terminate them by [`ThreadId`].
//!
//! ```no_run
//! use cadence_control::ControlTable;
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let table = Arc::new(ControlTable::new());
//! let worker = {
//!     let table = Arc::clone(&table);
//!     thread::spawn(move || while table.cycle(Duration::from_millis(16)) {})
//! };
//! let id = worker.thread().id();
//!
//! table.suspend(id); // returns once the worker is parked
//! table.resume(id);
//! table.terminate(id);
//! worker.join().unwrap();
//! ```
//!
//! [`ThreadId`]: std::thread::ThreadId

#![warn(missing_docs)]

pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod table;

pub use config::ControlConfig;
pub use entry::{CycleStats, ThreadState};
pub use error::{ControlError, ControlResult};
pub use event::ControlEvent;
pub use table::ControlTable;

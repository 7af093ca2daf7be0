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

//! Configuration for the control table.

use crate::error::{ControlError, ControlResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`ControlTable`](crate::ControlTable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// How long a blocked thread sleeps between re-reads of the table.
    ///
    /// This bounds the latency of every suspend, resume, and terminate
    /// request. Must be non-zero.
    pub poll_interval: Duration,
    /// Maximum number of [`ControlEvent`](crate::ControlEvent)s to buffer.
    /// If the buffer is full, new events are dropped.
    pub event_buffer_size: usize,
}

impl ControlConfig {
    /// Checks that the configuration can drive a table.
    pub fn validate(&self) -> ControlResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ControlError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            event_buffer_size: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ControlConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = ControlConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ControlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ControlConfig =
            serde_json::from_str(r#"{ "event_buffer_size": 8 }"#).unwrap();
        assert_eq!(config.event_buffer_size, 8);
        assert_eq!(config.poll_interval, ControlConfig::default().poll_interval);
    }
}

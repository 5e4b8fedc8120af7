//! Dispatcher configuration types
//!
//! The dispatcher itself is a direct call path; these flags only control the
//! optional bookkeeping around it.

use serde::{Deserialize, Serialize};

/// Configuration for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Track live transports/channels and reject events that break the
    /// per-entity ordering contract
    #[serde(default = "default_true")]
    pub track_lifecycle: bool,

    /// When a transport closes, deliver `ChannelClosed` for its still-open
    /// channels before `TransportClosed` (needs `track_lifecycle`)
    #[serde(default = "default_true")]
    pub cascade_channel_close: bool,

    /// Log every event at trace level before it is delivered
    #[serde(default)]
    pub trace_events: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            track_lifecycle: true,
            cascade_channel_close: true,
            trace_events: false,
        }
    }
}

impl DispatcherConfig {
    /// Create a new dispatcher configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain pass-through: no tracking, no cascading
    pub fn passthrough() -> Self {
        Self {
            track_lifecycle: false,
            cascade_channel_close: false,
            trace_events: false,
        }
    }

    /// Builder method: enable or disable lifecycle tracking
    pub fn with_lifecycle_tracking(mut self, enabled: bool) -> Self {
        self.track_lifecycle = enabled;
        self
    }

    /// Builder method: enable or disable cascading channel closes
    pub fn with_cascade_channel_close(mut self, enabled: bool) -> Self {
        self.cascade_channel_close = enabled;
        self
    }

    /// Builder method: enable per-event trace logging
    pub fn with_trace_events(mut self, enabled: bool) -> Self {
        self.trace_events = enabled;
        self
    }

    /// Check if channel closes are synthesized on transport close
    pub fn cascades(&self) -> bool {
        self.track_lifecycle && self.cascade_channel_close
    }
}

//! Event envelope
//!
//! The closed set of notifications a native engine can report. Each event is
//! one-way: the sink returns nothing and acknowledges nothing.
//!
//! `BridgeEvent` owns its payload (strings and bytes are copies), so it can be
//! queued, recorded or serialized after the call that produced it returned.

use crate::types::{ChannelId, Role, TransportId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven event kinds, in boundary slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TransportOpened,
    TransportClosed,
    ChannelOpened,
    ChannelClosed,
    ChannelError,
    MessageReceived,
    DataReceived,
}

impl EventKind {
    /// All kinds in slot order
    pub const ALL: [EventKind; 7] = [
        EventKind::TransportOpened,
        EventKind::TransportClosed,
        EventKind::ChannelOpened,
        EventKind::ChannelClosed,
        EventKind::ChannelError,
        EventKind::MessageReceived,
        EventKind::DataReceived,
    ];

    /// Stable numeric code (slot index)
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Kind for a numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// snake_case name, as used in scenario files and logs
    pub fn name(self) -> &'static str {
        match self {
            EventKind::TransportOpened => "transport_opened",
            EventKind::TransportClosed => "transport_closed",
            EventKind::ChannelOpened => "channel_opened",
            EventKind::ChannelClosed => "channel_closed",
            EventKind::ChannelError => "channel_error",
            EventKind::MessageReceived => "message_received",
            EventKind::DataReceived => "data_received",
        }
    }

    /// True for the kinds that end an entity's life
    pub fn is_close(self) -> bool {
        matches!(self, EventKind::TransportClosed | EventKind::ChannelClosed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One notification from the native engine, with an owned payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A transport became usable
    TransportOpened { transport: TransportId, role: Role },

    /// A transport is permanently gone
    TransportClosed { transport: TransportId, role: Role },

    /// A channel became usable on a transport
    ChannelOpened {
        transport: TransportId,
        channel: ChannelId,
    },

    /// A channel is permanently gone
    ChannelClosed { channel: ChannelId },

    /// A non-fatal diagnostic on a channel
    ChannelError { channel: ChannelId, message: String },

    /// A text payload arrived
    MessageReceived { channel: ChannelId, message: String },

    /// A binary payload arrived (may be empty, may contain zero bytes)
    DataReceived { channel: ChannelId, data: Vec<u8> },
}

impl BridgeEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::TransportOpened { .. } => EventKind::TransportOpened,
            BridgeEvent::TransportClosed { .. } => EventKind::TransportClosed,
            BridgeEvent::ChannelOpened { .. } => EventKind::ChannelOpened,
            BridgeEvent::ChannelClosed { .. } => EventKind::ChannelClosed,
            BridgeEvent::ChannelError { .. } => EventKind::ChannelError,
            BridgeEvent::MessageReceived { .. } => EventKind::MessageReceived,
            BridgeEvent::DataReceived { .. } => EventKind::DataReceived,
        }
    }

    /// Get the transport handle carried by this event (if any)
    pub fn transport_id(&self) -> Option<TransportId> {
        match self {
            BridgeEvent::TransportOpened { transport, .. }
            | BridgeEvent::TransportClosed { transport, .. }
            | BridgeEvent::ChannelOpened { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    /// Get the channel handle carried by this event (if any)
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            BridgeEvent::ChannelOpened { channel, .. }
            | BridgeEvent::ChannelClosed { channel }
            | BridgeEvent::ChannelError { channel, .. }
            | BridgeEvent::MessageReceived { channel, .. }
            | BridgeEvent::DataReceived { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Text payload of message and error events
    pub fn text(&self) -> Option<&str> {
        match self {
            BridgeEvent::ChannelError { message, .. }
            | BridgeEvent::MessageReceived { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::TransportOpened { transport, role } => {
                write!(f, "{} opened ({})", transport, role)
            }
            BridgeEvent::TransportClosed { transport, role } => {
                write!(f, "{} closed ({})", transport, role)
            }
            BridgeEvent::ChannelOpened { transport, channel } => {
                write!(f, "{} opened on {}", channel, transport)
            }
            BridgeEvent::ChannelClosed { channel } => write!(f, "{} closed", channel),
            BridgeEvent::ChannelError { channel, message } => {
                write!(f, "{} error: {}", channel, message)
            }
            BridgeEvent::MessageReceived { channel, message } => {
                write!(f, "{} message: {:?}", channel, message)
            }
            BridgeEvent::DataReceived { channel, data } => {
                write!(f, "{} data: {} bytes", channel, data.len())
            }
        }
    }
}

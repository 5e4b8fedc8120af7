//! Event sinks
//!
//! An `EventSink` is the host-side receiver of notifications: one method per
//! event kind. Every method has a no-op default, so a host implements only
//! the kinds it cares about.
//!
//! String and byte arguments are borrowed for the duration of the call. A
//! sink that needs to keep a payload must copy it.

use crate::event::BridgeEvent;
use crate::types::{ChannelId, Role, TransportId};
use std::sync::Mutex;

/// Host-side receiver of bridge events
///
/// Sinks are called synchronously on the thread that detected the event and
/// may be called concurrently for different entities.
pub trait EventSink: Send + Sync {
    fn on_transport_opened(&self, _transport: TransportId, _role: Role) {}

    fn on_transport_closed(&self, _transport: TransportId, _role: Role) {}

    fn on_channel_opened(&self, _transport: TransportId, _channel: ChannelId) {}

    fn on_channel_closed(&self, _channel: ChannelId) {}

    fn on_channel_error(&self, _channel: ChannelId, _message: &str) {}

    fn on_message_received(&self, _channel: ChannelId, _message: &str) {}

    fn on_data_received(&self, _channel: ChannelId, _data: &[u8]) {}
}

/// Sink that ignores everything
///
/// Registering it is the way to "unregister" interest in a kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {}

/// Sink that copies every event it receives into memory, in call order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<BridgeEvent> {
        self.lock().clone()
    }

    /// Take the recorded events, leaving the recorder empty
    pub fn take(&self) -> Vec<BridgeEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, event: BridgeEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BridgeEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for RecordingSink {
    fn on_transport_opened(&self, transport: TransportId, role: Role) {
        self.push(BridgeEvent::TransportOpened { transport, role });
    }

    fn on_transport_closed(&self, transport: TransportId, role: Role) {
        self.push(BridgeEvent::TransportClosed { transport, role });
    }

    fn on_channel_opened(&self, transport: TransportId, channel: ChannelId) {
        self.push(BridgeEvent::ChannelOpened { transport, channel });
    }

    fn on_channel_closed(&self, channel: ChannelId) {
        self.push(BridgeEvent::ChannelClosed { channel });
    }

    fn on_channel_error(&self, channel: ChannelId, message: &str) {
        self.push(BridgeEvent::ChannelError {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_message_received(&self, channel: ChannelId, message: &str) {
        self.push(BridgeEvent::MessageReceived {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_data_received(&self, channel: ChannelId, data: &[u8]) {
        self.push(BridgeEvent::DataReceived {
            channel,
            data: data.to_vec(),
        });
    }
}

/// Deliver an owned event to a sink's matching method
pub fn deliver_to(sink: &dyn EventSink, event: &BridgeEvent) {
    match event {
        BridgeEvent::TransportOpened { transport, role } => {
            sink.on_transport_opened(*transport, *role)
        }
        BridgeEvent::TransportClosed { transport, role } => {
            sink.on_transport_closed(*transport, *role)
        }
        BridgeEvent::ChannelOpened { transport, channel } => {
            sink.on_channel_opened(*transport, *channel)
        }
        BridgeEvent::ChannelClosed { channel } => sink.on_channel_closed(*channel),
        BridgeEvent::ChannelError { channel, message } => sink.on_channel_error(*channel, message),
        BridgeEvent::MessageReceived { channel, message } => {
            sink.on_message_received(*channel, message)
        }
        BridgeEvent::DataReceived { channel, data } => sink.on_data_received(*channel, data),
    }
}

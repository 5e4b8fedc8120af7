//! Polled event queue
//!
//! Some hosts cannot run code on the engine's threads (a game loop that only
//! touches its objects from the main thread, for instance). `QueueSink` turns
//! the synchronous callbacks into owned `BridgeEvent`s on an mpsc channel and
//! the host drains them from its own thread with an `EventReceiver`.
//!
//! Per-entity order is preserved: events from one engine thread are sent in
//! the order the callbacks ran.

use crate::event::BridgeEvent;
use crate::sink::EventSink;
use crate::types::{ChannelId, Role, TransportId};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

/// Sink that copies each event into a queue
#[derive(Debug)]
pub struct QueueSink {
    // Sender is only Sync from Rust 1.72 on.
    tx: Mutex<Sender<BridgeEvent>>,
}

/// Host-side end of a `QueueSink`
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<BridgeEvent>,
}

impl QueueSink {
    /// Create a queue sink and the receiver that drains it
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, EventReceiver { rx })
    }

    fn send(&self, event: BridgeEvent) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if tx.send(event).is_err() {
            log::debug!("Event receiver dropped, discarding event");
        }
    }
}

impl EventSink for QueueSink {
    fn on_transport_opened(&self, transport: TransportId, role: Role) {
        self.send(BridgeEvent::TransportOpened { transport, role });
    }

    fn on_transport_closed(&self, transport: TransportId, role: Role) {
        self.send(BridgeEvent::TransportClosed { transport, role });
    }

    fn on_channel_opened(&self, transport: TransportId, channel: ChannelId) {
        self.send(BridgeEvent::ChannelOpened { transport, channel });
    }

    fn on_channel_closed(&self, channel: ChannelId) {
        self.send(BridgeEvent::ChannelClosed { channel });
    }

    fn on_channel_error(&self, channel: ChannelId, message: &str) {
        self.send(BridgeEvent::ChannelError {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_message_received(&self, channel: ChannelId, message: &str) {
        self.send(BridgeEvent::MessageReceived {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_data_received(&self, channel: ChannelId, data: &[u8]) {
        self.send(BridgeEvent::DataReceived {
            channel,
            data: data.to_vec(),
        });
    }
}

impl EventReceiver {
    /// Next pending event, without waiting
    pub fn try_next(&self) -> Option<BridgeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Next event, waiting at most `timeout`
    pub fn next_timeout(&self, timeout: Duration) -> Option<BridgeEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Every event pending right now, in arrival order
    pub fn drain(&self) -> Vec<BridgeEvent> {
        self.rx.try_iter().collect()
    }
}

//! Invocation dispatcher
//!
//! The dispatcher turns one native event into exactly one synchronous call to
//! the matching registered callback and then returns control to the engine.
//! There is no queue, no batching and no retry: the call runs on the thread
//! that reported the event, and the engine must not tear down the entity's
//! state until the call returns.
//!
//! Whatever happens on the host side stays there. Unregistered kinds are
//! dropped, invalid payloads are refused before marshaling, and a panicking
//! callback is caught. The returned `Delivery` only describes what happened;
//! the engine is free to ignore it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sylph_bridge::{Dispatcher, RecordingSink, RegistryBuilder, Role};
//!
//! let recorder = Arc::new(RecordingSink::new());
//! let dispatcher = Dispatcher::new(RegistryBuilder::new().with_sink(recorder.clone()).build());
//!
//! let t1 = dispatcher.identifiers().new_transport("t1");
//! let c1 = dispatcher.identifiers().new_channel("c1");
//! dispatcher.transport_opened(t1, Role::Client);
//! dispatcher.channel_opened(t1, c1);
//! dispatcher.data_received(c1, &[0x41, 0x00, 0x42]);
//! dispatcher.channel_closed(c1);
//! dispatcher.transport_closed(t1, Role::Client);
//!
//! assert_eq!(recorder.len(), 5);
//! ```

use crate::config::DispatcherConfig;
use crate::event::{BridgeEvent, EventKind};
use crate::identifier::Identifiers;
use crate::lifecycle::LifecycleTracker;
use crate::registry::CallbackRegistry;
use crate::types::{BridgeError, ChannelId, Result, Role, TransportId};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of one dispatch
#[derive(Debug)]
pub enum Delivery {
    /// The registered callback ran and returned
    Delivered,
    /// No callback is registered for this kind; the event was dropped
    Unregistered,
    /// The event was refused before any callback ran
    Rejected(BridgeError),
    /// The callback panicked; the panic was caught and logged
    SinkPanicked,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Delivery::Rejected(_))
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Delivered => write!(f, "delivered"),
            Delivery::Unregistered => write!(f, "dropped (unregistered)"),
            Delivery::Rejected(e) => write!(f, "rejected: {}", e),
            Delivery::SinkPanicked => write!(f, "callback panicked"),
        }
    }
}

/// Running totals of dispatch outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub unregistered: u64,
    pub rejected: u64,
    pub panicked: u64,
}

impl DispatchStats {
    /// Total number of events handed to the dispatcher (including cascaded closes)
    pub fn total(&self) -> u64 {
        self.delivered + self.unregistered + self.rejected + self.panicked
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    unregistered: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// Synchronous call path from the native engine into the host callbacks
pub struct Dispatcher {
    registry: CallbackRegistry,
    identifiers: Arc<Identifiers>,
    tracker: Option<LifecycleTracker>,
    config: DispatcherConfig,
    counters: Counters,
}

impl Dispatcher {
    /// Create a dispatcher with the default configuration
    pub fn new(registry: CallbackRegistry) -> Self {
        Self::with_config(registry, DispatcherConfig::default())
    }

    /// Create a dispatcher with an explicit configuration
    pub fn with_config(registry: CallbackRegistry, config: DispatcherConfig) -> Self {
        log::info!(
            "Dispatcher ready: {} of {} kinds registered, lifecycle tracking {}",
            registry.registered_kinds().len(),
            EventKind::ALL.len(),
            if config.track_lifecycle { "on" } else { "off" }
        );

        Self {
            registry,
            identifiers: Arc::new(Identifiers::new()),
            tracker: config.track_lifecycle.then(LifecycleTracker::new),
            config,
            counters: Counters::default(),
        }
    }

    /// Builder method: share an existing handle allocator
    pub fn with_identifiers(mut self, identifiers: Arc<Identifiers>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Handle allocator and label book used by this dispatcher
    pub fn identifiers(&self) -> &Arc<Identifiers> {
        &self.identifiers
    }

    /// Snapshot of the outcome counters
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            unregistered: self.counters.unregistered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Number of live (transports, channels), when lifecycle tracking is on
    pub fn live_counts(&self) -> Option<(usize, usize)> {
        self.tracker.as_ref().map(LifecycleTracker::live_counts)
    }

    /// Deliver an owned event through the same path as the typed methods
    pub fn dispatch(&self, event: &BridgeEvent) -> Delivery {
        match event {
            BridgeEvent::TransportOpened { transport, role } => {
                self.transport_opened(*transport, *role)
            }
            BridgeEvent::TransportClosed { transport, role } => {
                self.transport_closed(*transport, *role)
            }
            BridgeEvent::ChannelOpened { transport, channel } => {
                self.channel_opened(*transport, *channel)
            }
            BridgeEvent::ChannelClosed { channel } => self.channel_closed(*channel),
            BridgeEvent::ChannelError { channel, message } => {
                self.channel_error(*channel, message)
            }
            BridgeEvent::MessageReceived { channel, message } => {
                self.message_received(*channel, message)
            }
            BridgeEvent::DataReceived { channel, data } => self.data_received(*channel, data),
        }
    }

    pub fn transport_opened(&self, transport: TransportId, role: Role) -> Delivery {
        let kind = EventKind::TransportOpened;
        self.trace(kind, format_args!("{} ({})", transport, role));

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.open_transport(transport, role) {
                return self.reject(kind, e);
            }
        }
        self.invoke(kind, || self.registry.call_transport_opened(transport, role))
    }

    /// Deliver a transport close
    ///
    /// With cascading enabled, channels still open on the transport are
    /// closed first, so their `ChannelClosed` is observed before this event.
    /// Labels of channels left open on the transport are released either way.
    pub fn transport_closed(&self, transport: TransportId, role: Role) -> Delivery {
        let kind = EventKind::TransportClosed;
        self.trace(kind, format_args!("{} ({})", transport, role));

        if let Some(tracker) = &self.tracker {
            match tracker.close_transport(transport, role) {
                Ok(orphans) if self.config.cascades() => {
                    for channel in orphans {
                        log::debug!("Closing {} left open on {}", channel, transport);
                        self.deliver_channel_closed(channel);
                    }
                }
                Ok(_) => {}
                Err(e) => return self.reject(kind, e),
            }
        }

        let outcome = self.invoke(kind, || self.registry.call_transport_closed(transport, role));
        let forgotten = self.identifiers.release_transport(transport);
        if forgotten > 0 {
            log::debug!("Released {} channel label(s) left on {}", forgotten, transport);
        }
        outcome
    }

    pub fn channel_opened(&self, transport: TransportId, channel: ChannelId) -> Delivery {
        let kind = EventKind::ChannelOpened;
        self.trace(kind, format_args!("{} on {}", channel, transport));

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.open_channel(transport, channel) {
                // The channel never lived unless it is already open elsewhere.
                if !matches!(e, BridgeError::ChannelAlreadyOpen(_)) {
                    self.identifiers.release(channel);
                }
                return self.reject(kind, e);
            }
        }
        self.identifiers.bind_channel(channel, transport);
        self.invoke(kind, || self.registry.call_channel_opened(transport, channel))
    }

    pub fn channel_closed(&self, channel: ChannelId) -> Delivery {
        let kind = EventKind::ChannelClosed;
        self.trace(kind, format_args!("{}", channel));

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.close_channel(channel) {
                return self.reject(kind, e);
            }
        }
        self.deliver_channel_closed(channel)
    }

    pub fn channel_error(&self, channel: ChannelId, message: &str) -> Delivery {
        let kind = EventKind::ChannelError;
        self.trace(kind, format_args!("{}: {}", channel, message));

        if let Err(e) = self.check_text(channel, message) {
            return self.reject(kind, e);
        }
        self.invoke(kind, || self.registry.call_channel_error(channel, message))
    }

    pub fn message_received(&self, channel: ChannelId, message: &str) -> Delivery {
        let kind = EventKind::MessageReceived;
        self.trace(kind, format_args!("{}: {} bytes of text", channel, message.len()));

        if let Err(e) = self.check_text(channel, message) {
            return self.reject(kind, e);
        }
        self.invoke(kind, || self.registry.call_message_received(channel, message))
    }

    /// Deliver a binary payload; an empty slice is delivered as an empty buffer
    pub fn data_received(&self, channel: ChannelId, data: &[u8]) -> Delivery {
        let kind = EventKind::DataReceived;
        self.trace(kind, format_args!("{}: {} bytes", channel, data.len()));

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.check_channel(channel) {
                return self.reject(kind, e);
            }
        }
        self.invoke(kind, || self.registry.call_data_received(channel, data))
    }

    fn deliver_channel_closed(&self, channel: ChannelId) -> Delivery {
        let outcome = self.invoke(EventKind::ChannelClosed, || {
            self.registry.call_channel_closed(channel)
        });
        self.identifiers.release(channel);
        outcome
    }

    /// Text crosses the boundary as a NUL-terminated string
    fn check_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        if let Some(tracker) = &self.tracker {
            tracker.check_channel(channel)?;
        }
        if let Some(pos) = text.find('\0') {
            return Err(BridgeError::InvalidString(format!(
                "interior NUL byte at offset {}",
                pos
            )));
        }
        Ok(())
    }

    fn invoke(&self, kind: EventKind, call: impl FnOnce() -> bool) -> Delivery {
        match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(true) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                Delivery::Delivered
            }
            Ok(false) => {
                log::trace!("No callback registered for {}, dropping event", kind);
                self.counters.unregistered.fetch_add(1, Ordering::Relaxed);
                Delivery::Unregistered
            }
            Err(payload) => {
                log::error!("Callback for {} panicked: {}", kind, panic_message(payload.as_ref()));
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                Delivery::SinkPanicked
            }
        }
    }

    fn reject(&self, kind: EventKind, error: BridgeError) -> Delivery {
        log::warn!("Rejected {} event: {}", kind, error);
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        Delivery::Rejected(error)
    }

    fn trace(&self, kind: EventKind, args: fmt::Arguments<'_>) {
        if self.config.trace_events {
            log::trace!("Dispatching {} {}", kind, args);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::sink::RecordingSink;

    fn recording_dispatcher(config: DispatcherConfig) -> (Dispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let registry = RegistryBuilder::new().with_sink(sink.clone()).build();
        (Dispatcher::with_config(registry, config), sink)
    }

    #[test]
    fn test_unregistered_kind_is_dropped() {
        let dispatcher =
            Dispatcher::with_config(CallbackRegistry::empty(), DispatcherConfig::passthrough());
        let channel = ChannelId::from_raw(1).unwrap();

        let outcome = dispatcher.data_received(channel, b"payload");
        assert!(matches!(outcome, Delivery::Unregistered));
        assert_eq!(dispatcher.stats().unregistered, 1);
        assert_eq!(dispatcher.stats().total(), 1);
    }

    #[test]
    fn test_passthrough_delivers_without_open() {
        let (dispatcher, sink) = recording_dispatcher(DispatcherConfig::passthrough());
        let channel = ChannelId::from_raw(7).unwrap();

        assert!(dispatcher.message_received(channel, "hi").is_delivered());
        assert_eq!(sink.len(), 1);
        assert!(dispatcher.live_counts().is_none());
    }

    #[test]
    fn test_tracking_rejects_unknown_channel() {
        let (dispatcher, sink) = recording_dispatcher(DispatcherConfig::default());
        let channel = dispatcher.identifiers().new_channel("c1");

        let outcome = dispatcher.message_received(channel, "too early");
        assert!(matches!(outcome, Delivery::Rejected(BridgeError::UnknownChannel(_))));
        assert!(sink.is_empty());
        assert_eq!(dispatcher.stats().rejected, 1);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let (dispatcher, sink) = recording_dispatcher(DispatcherConfig::passthrough());
        let channel = ChannelId::from_raw(2).unwrap();

        let outcome = dispatcher.channel_error(channel, "bad\0text");
        assert!(matches!(outcome, Delivery::Rejected(BridgeError::InvalidString(_))));
        assert!(sink.is_empty());

        // Zero bytes are fine in binary payloads
        assert!(dispatcher.data_received(channel, &[0, 0, 0]).is_delivered());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let registry = RegistryBuilder::new()
            .on_channel_closed(|_| panic!("host blew up"))
            .build();
        let dispatcher = Dispatcher::with_config(registry, DispatcherConfig::passthrough());
        let channel = ChannelId::from_raw(3).unwrap();

        let outcome = dispatcher.channel_closed(channel);
        assert!(matches!(outcome, Delivery::SinkPanicked));
        assert_eq!(dispatcher.stats().panicked, 1);

        // The dispatcher keeps working after a panic
        let outcome = dispatcher.channel_closed(channel);
        assert!(matches!(outcome, Delivery::SinkPanicked));
        assert_eq!(dispatcher.stats().panicked, 2);
    }

    #[test]
    fn test_labels_released_after_close() {
        let (dispatcher, _sink) = recording_dispatcher(DispatcherConfig::default());
        let ids = Arc::clone(dispatcher.identifiers());
        let t1 = ids.new_transport("t1");
        let c1 = ids.new_channel("c1");

        dispatcher.transport_opened(t1, Role::Server);
        dispatcher.channel_opened(t1, c1);
        assert_eq!(ids.label(c1).as_deref(), Some("c1"));

        dispatcher.channel_closed(c1);
        assert!(ids.label(c1).is_none());
        assert_eq!(ids.label(t1).as_deref(), Some("t1"));

        dispatcher.transport_closed(t1, Role::Server);
        assert_eq!(ids.live_count(), 0);
    }

    #[test]
    fn test_no_cascade_still_forgets_channels() {
        let config = DispatcherConfig::default().with_cascade_channel_close(false);
        let (dispatcher, sink) = recording_dispatcher(config);
        let t1 = dispatcher.identifiers().new_transport("t1");
        let c1 = dispatcher.identifiers().new_channel("c1");

        dispatcher.transport_opened(t1, Role::Client);
        dispatcher.channel_opened(t1, c1);
        dispatcher.transport_closed(t1, Role::Client);

        let kinds: Vec<_> = sink.events().iter().map(BridgeEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TransportOpened,
                EventKind::ChannelOpened,
                EventKind::TransportClosed
            ]
        );
        assert_eq!(dispatcher.live_counts(), Some((0, 0)));
        assert!(dispatcher.data_received(c1, b"late").is_rejected());
    }

    #[test]
    fn test_passthrough_close_releases_channel_labels() {
        let (dispatcher, sink) = recording_dispatcher(DispatcherConfig::passthrough());
        let ids = Arc::clone(dispatcher.identifiers());
        let t1 = ids.new_transport("t1");
        let c1 = ids.new_channel("c1");
        let c2 = ids.new_channel("c2");

        dispatcher.transport_opened(t1, Role::Client);
        dispatcher.channel_opened(t1, c1);
        dispatcher.channel_opened(t1, c2);
        dispatcher.channel_closed(c1);
        dispatcher.transport_closed(t1, Role::Client);

        // No synthesized close without tracking, but nothing is left behind
        assert_eq!(sink.len(), 5);
        assert_eq!(ids.live_count(), 0);
    }

    #[test]
    fn test_rejected_channel_open_releases_label() {
        let (dispatcher, _sink) = recording_dispatcher(DispatcherConfig::default());
        let ids = Arc::clone(dispatcher.identifiers());
        let t1 = ids.new_transport("t1");
        let c1 = ids.new_channel("c1");

        // Transport never opened
        assert!(dispatcher.channel_opened(t1, c1).is_rejected());
        assert!(ids.label(c1).is_none());
        assert_eq!(ids.label(t1).as_deref(), Some("t1"));

        // A duplicate open keeps the live channel's label
        let c2 = ids.new_channel("c2");
        dispatcher.transport_opened(t1, Role::Client);
        dispatcher.channel_opened(t1, c2);
        assert!(dispatcher.channel_opened(t1, c2).is_rejected());
        assert_eq!(ids.label(c2).as_deref(), Some("c2"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

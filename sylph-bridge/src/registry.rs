//! Callback registry
//!
//! Holds at most one callback per event kind. The registry is assembled with
//! a `RegistryBuilder` before the engine starts emitting events and is
//! immutable once built, so reading it from many threads needs no locking.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sylph_bridge::{EventKind, RecordingSink, RegistryBuilder};
//!
//! let recorder = Arc::new(RecordingSink::new());
//! let registry = RegistryBuilder::new()
//!     .with_sink(recorder.clone())
//!     .on_message_received(|channel, text| println!("{}: {}", channel, text))
//!     .build();
//!
//! assert!(registry.is_registered(EventKind::DataReceived));
//! ```

use crate::event::EventKind;
use crate::sink::EventSink;
use crate::types::{ChannelId, Role, TransportId};
use std::fmt;
use std::sync::Arc;

type TransportFn = Arc<dyn Fn(TransportId, Role) + Send + Sync>;
type ChannelOpenedFn = Arc<dyn Fn(TransportId, ChannelId) + Send + Sync>;
type ChannelFn = Arc<dyn Fn(ChannelId) + Send + Sync>;
type TextFn = Arc<dyn Fn(ChannelId, &str) + Send + Sync>;
type DataFn = Arc<dyn Fn(ChannelId, &[u8]) + Send + Sync>;

#[derive(Clone, Default)]
struct Slots {
    transport_opened: Option<TransportFn>,
    transport_closed: Option<TransportFn>,
    channel_opened: Option<ChannelOpenedFn>,
    channel_closed: Option<ChannelFn>,
    channel_error: Option<TextFn>,
    message_received: Option<TextFn>,
    data_received: Option<DataFn>,
}

impl Slots {
    fn is_set(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::TransportOpened => self.transport_opened.is_some(),
            EventKind::TransportClosed => self.transport_closed.is_some(),
            EventKind::ChannelOpened => self.channel_opened.is_some(),
            EventKind::ChannelClosed => self.channel_closed.is_some(),
            EventKind::ChannelError => self.channel_error.is_some(),
            EventKind::MessageReceived => self.message_received.is_some(),
            EventKind::DataReceived => self.data_received.is_some(),
        }
    }
}

/// Collects callback registrations; registering a kind twice keeps the last one
#[derive(Default)]
pub struct RegistryBuilder {
    slots: Slots,
}

impl RegistryBuilder {
    /// Create a builder with no callbacks registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: route every event kind to `sink`
    pub fn with_sink<S: EventSink + 'static>(self, sink: Arc<S>) -> Self {
        self.with_sink_for(&EventKind::ALL, sink)
    }

    /// Builder method: route only the given kinds to `sink`
    pub fn with_sink_for<S: EventSink + 'static>(
        mut self,
        kinds: &[EventKind],
        sink: Arc<S>,
    ) -> Self {
        for kind in kinds {
            let s = Arc::clone(&sink);
            match kind {
                EventKind::TransportOpened => {
                    self.slots.transport_opened =
                        Some(Arc::new(move |t, r| s.on_transport_opened(t, r)))
                }
                EventKind::TransportClosed => {
                    self.slots.transport_closed =
                        Some(Arc::new(move |t, r| s.on_transport_closed(t, r)))
                }
                EventKind::ChannelOpened => {
                    self.slots.channel_opened =
                        Some(Arc::new(move |t, c| s.on_channel_opened(t, c)))
                }
                EventKind::ChannelClosed => {
                    self.slots.channel_closed = Some(Arc::new(move |c| s.on_channel_closed(c)))
                }
                EventKind::ChannelError => {
                    self.slots.channel_error =
                        Some(Arc::new(move |c, m: &str| s.on_channel_error(c, m)))
                }
                EventKind::MessageReceived => {
                    self.slots.message_received =
                        Some(Arc::new(move |c, m: &str| s.on_message_received(c, m)))
                }
                EventKind::DataReceived => {
                    self.slots.data_received =
                        Some(Arc::new(move |c, d: &[u8]| s.on_data_received(c, d)))
                }
            }
        }
        self
    }

    pub fn on_transport_opened<F>(mut self, f: F) -> Self
    where
        F: Fn(TransportId, Role) + Send + Sync + 'static,
    {
        self.slots.transport_opened = Some(Arc::new(f));
        self
    }

    pub fn on_transport_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(TransportId, Role) + Send + Sync + 'static,
    {
        self.slots.transport_closed = Some(Arc::new(f));
        self
    }

    pub fn on_channel_opened<F>(mut self, f: F) -> Self
    where
        F: Fn(TransportId, ChannelId) + Send + Sync + 'static,
    {
        self.slots.channel_opened = Some(Arc::new(f));
        self
    }

    pub fn on_channel_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(ChannelId) + Send + Sync + 'static,
    {
        self.slots.channel_closed = Some(Arc::new(f));
        self
    }

    pub fn on_channel_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ChannelId, &str) + Send + Sync + 'static,
    {
        self.slots.channel_error = Some(Arc::new(f));
        self
    }

    pub fn on_message_received<F>(mut self, f: F) -> Self
    where
        F: Fn(ChannelId, &str) + Send + Sync + 'static,
    {
        self.slots.message_received = Some(Arc::new(f));
        self
    }

    pub fn on_data_received<F>(mut self, f: F) -> Self
    where
        F: Fn(ChannelId, &[u8]) + Send + Sync + 'static,
    {
        self.slots.data_received = Some(Arc::new(f));
        self
    }

    /// Freeze the registrations into an immutable registry
    pub fn build(self) -> CallbackRegistry {
        let registry = CallbackRegistry { slots: self.slots };
        log::debug!("Callback registry built: {:?}", registry);
        registry
    }
}

/// Immutable table of callbacks, one optional slot per event kind
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    slots: Slots,
}

impl CallbackRegistry {
    /// A registry with nothing registered; every event is dropped
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if a callback is registered for `kind`
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots.is_set(kind)
    }

    /// Kinds with a registered callback, in slot order
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .iter()
            .copied()
            .filter(|k| self.is_registered(*k))
            .collect()
    }

    // Invokers return false when the slot is empty.

    pub(crate) fn call_transport_opened(&self, transport: TransportId, role: Role) -> bool {
        match &self.slots.transport_opened {
            Some(f) => {
                f(transport, role);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_transport_closed(&self, transport: TransportId, role: Role) -> bool {
        match &self.slots.transport_closed {
            Some(f) => {
                f(transport, role);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_channel_opened(&self, transport: TransportId, channel: ChannelId) -> bool {
        match &self.slots.channel_opened {
            Some(f) => {
                f(transport, channel);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_channel_closed(&self, channel: ChannelId) -> bool {
        match &self.slots.channel_closed {
            Some(f) => {
                f(channel);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_channel_error(&self, channel: ChannelId, message: &str) -> bool {
        match &self.slots.channel_error {
            Some(f) => {
                f(channel, message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_message_received(&self, channel: ChannelId, message: &str) -> bool {
        match &self.slots.message_received {
            Some(f) => {
                f(channel, message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn call_data_received(&self, channel: ChannelId, data: &[u8]) -> bool {
        match &self.slots.data_received {
            Some(f) => {
                f(channel, data);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.registered_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_registry() {
        let registry = CallbackRegistry::empty();
        assert!(registry.registered_kinds().is_empty());
        let channel = ChannelId::from_raw(1).unwrap();
        assert!(!registry.call_data_received(channel, &[1, 2, 3]));
    }

    #[test]
    fn test_with_sink_fills_every_slot() {
        let sink = Arc::new(RecordingSink::new());
        let registry = RegistryBuilder::new().with_sink(sink.clone()).build();
        assert_eq!(registry.registered_kinds(), EventKind::ALL.to_vec());

        let channel = ChannelId::from_raw(2).unwrap();
        assert!(registry.call_channel_closed(channel));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_partial_registration() {
        let sink = Arc::new(RecordingSink::new());
        let registry = RegistryBuilder::new()
            .with_sink_for(&[EventKind::MessageReceived, EventKind::ChannelClosed], sink)
            .build();

        assert_eq!(
            registry.registered_kinds(),
            vec![EventKind::ChannelClosed, EventKind::MessageReceived]
        );
        assert!(!registry.is_registered(EventKind::DataReceived));
    }

    #[test]
    fn test_last_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (f, s) = (first.clone(), second.clone());

        let registry = RegistryBuilder::new()
            .on_channel_closed(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .on_channel_closed(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        assert!(registry.call_channel_closed(ChannelId::from_raw(3).unwrap()));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_overrides_sink_slot() {
        let sink = Arc::new(RecordingSink::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let registry = RegistryBuilder::new()
            .with_sink(sink.clone())
            .on_data_received(move |_, data| {
                counter.fetch_add(data.len(), Ordering::SeqCst);
            })
            .build();

        let channel = ChannelId::from_raw(5).unwrap();
        registry.call_data_received(channel, &[0; 16]);
        registry.call_message_received(channel, "still recorded");

        assert_eq!(seen.load(Ordering::SeqCst), 16);
        assert_eq!(sink.len(), 1);
    }
}

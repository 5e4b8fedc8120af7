//! Sylph Bridge Library
//!
//! Event-notification bridge between a native peer-transport / data-channel
//! engine and the host that embeds it. The engine reports "something
//! happened" and the bridge delivers it, synchronously and exactly once, to
//! whatever the host registered for that kind of event.
//!
//! # Architecture
//!
//! - Identifiers: transports and channels are opaque `u64` handles, with a
//!   separately fetchable human-readable label
//! - Events: a closed set of seven one-way notifications
//! - Registry: one optional callback per event kind, built once and immutable
//! - Dispatcher: the synchronous call path from engine to host
//!
//! The library does NOT:
//! - Create, negotiate or reconnect transports
//! - Multiplex channels over a transport
//! - Queue or reorder events (a host that needs buffering uses `QueueSink`)
//!
//! A C ABI over the same pieces lives in `ffi`, with a matching header in
//! `include/sylph_bridge.h`.
//!
//! # Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use sylph_bridge::{BridgeEvent, Dispatcher, RecordingSink, RegistryBuilder, Role};
//!
//! // Host side: register sinks before the engine starts
//! let recorder = Arc::new(RecordingSink::new());
//! let registry = RegistryBuilder::new().with_sink(recorder.clone()).build();
//! let dispatcher = Dispatcher::new(registry);
//!
//! // Engine side: allocate handles and report events
//! let t1 = dispatcher.identifiers().new_transport("t1");
//! let c1 = dispatcher.identifiers().new_channel("c1");
//! dispatcher.transport_opened(t1, Role::Client);
//! dispatcher.channel_opened(t1, c1);
//! dispatcher.message_received(c1, "hello");
//!
//! assert_eq!(
//!     recorder.events().last(),
//!     Some(&BridgeEvent::MessageReceived { channel: c1, message: "hello".into() })
//! );
//! ```

// Public modules
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod ffi;
pub mod identifier;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod types;
pub mod wire;

// Re-export main types for convenience
pub use config::DispatcherConfig;
pub use dispatcher::{Delivery, DispatchStats, Dispatcher};
pub use event::{BridgeEvent, EventKind};
pub use ffi::{SylphBridge, SylphCallbacks, SylphStatus};
pub use identifier::Identifiers;
pub use queue::{EventReceiver, QueueSink};
pub use registry::{CallbackRegistry, RegistryBuilder};
pub use sink::{deliver_to, EventSink, NoopSink, RecordingSink};
pub use types::{BridgeError, ChannelId, Result, Role, TransportId};

// Internal modules (not exposed in public API)
mod lifecycle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

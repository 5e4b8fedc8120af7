//! Host side of the replay: where delivered events end up
//!
//! By default every event is printed. A C host library can take over any
//! subset of kinds by exporting the matching `sylph_on_*` symbols.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::ValueEnum;
use libloading::Library;
use std::path::Path;
use std::sync::Arc;
use sylph_bridge::ffi::SylphCallbacks;
use sylph_bridge::{BridgeEvent, ChannelId, EventSink, Identifiers, Role, TransportId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Sink that prints each event on its own line
pub struct PrintSink {
    format: OutputFormat,
    identifiers: Arc<Identifiers>,
}

impl PrintSink {
    pub fn new(format: OutputFormat, identifiers: Arc<Identifiers>) -> Self {
        Self { format, identifiers }
    }

    /// Render one event; the label is looked up while the handle is still live
    pub fn render(&self, event: &BridgeEvent) -> String {
        let label = event
            .channel_id()
            .map(u64::from)
            .or_else(|| event.transport_id().map(u64::from))
            .and_then(|handle| self.identifiers.label(handle));

        match self.format {
            OutputFormat::Text => {
                let stamp = Local::now().format("%H:%M:%S%.3f");
                match (&label, event) {
                    (_, BridgeEvent::DataReceived { data, .. }) => format!(
                        "{} {:<16} {} [{}] {}",
                        stamp,
                        event.kind().name(),
                        event,
                        label.as_deref().unwrap_or("-"),
                        hex(data)
                    ),
                    (Some(label), _) => {
                        format!("{} {:<16} {} [{}]", stamp, event.kind().name(), event, label)
                    }
                    (None, _) => format!("{} {:<16} {}", stamp, event.kind().name(), event),
                }
            }
            OutputFormat::Json => serde_json::json!({
                "at": Utc::now().to_rfc3339(),
                "label": label,
                "event": event,
            })
            .to_string(),
        }
    }

    fn print(&self, event: BridgeEvent) {
        println!("{}", self.render(&event));
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

impl EventSink for PrintSink {
    fn on_transport_opened(&self, transport: TransportId, role: Role) {
        self.print(BridgeEvent::TransportOpened { transport, role });
    }

    fn on_transport_closed(&self, transport: TransportId, role: Role) {
        self.print(BridgeEvent::TransportClosed { transport, role });
    }

    fn on_channel_opened(&self, transport: TransportId, channel: ChannelId) {
        self.print(BridgeEvent::ChannelOpened { transport, channel });
    }

    fn on_channel_closed(&self, channel: ChannelId) {
        self.print(BridgeEvent::ChannelClosed { channel });
    }

    fn on_channel_error(&self, channel: ChannelId, message: &str) {
        self.print(BridgeEvent::ChannelError {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_message_received(&self, channel: ChannelId, message: &str) {
        self.print(BridgeEvent::MessageReceived {
            channel,
            message: message.to_owned(),
        });
    }

    fn on_data_received(&self, channel: ChannelId, data: &[u8]) {
        self.print(BridgeEvent::DataReceived {
            channel,
            data: data.to_vec(),
        });
    }
}

/// A loaded C host library and the callbacks it exports
///
/// The library stays loaded for as long as this value lives; any registry
/// built from `callbacks` must be dropped first.
pub struct HostLibrary {
    pub callbacks: SylphCallbacks,
    _library: Library,
}

impl HostLibrary {
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: loading runs the library's initializers; the user asked for it.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load host library: {:?}", path))?;

        // SAFETY: each symbol is only read as the function pointer type the
        // header declares for that name.
        let callbacks = unsafe {
            SylphCallbacks {
                on_transport_opened: symbol(&library, b"sylph_on_transport_opened\0"),
                on_transport_closed: symbol(&library, b"sylph_on_transport_closed\0"),
                on_channel_opened: symbol(&library, b"sylph_on_channel_opened\0"),
                on_channel_closed: symbol(&library, b"sylph_on_channel_closed\0"),
                on_channel_error: symbol(&library, b"sylph_on_channel_error\0"),
                on_message_received: symbol(&library, b"sylph_on_message_received\0"),
                on_data_received: symbol(&library, b"sylph_on_data_received\0"),
            }
        };

        let exported = [
            callbacks.on_transport_opened.is_some(),
            callbacks.on_transport_closed.is_some(),
            callbacks.on_channel_opened.is_some(),
            callbacks.on_channel_closed.is_some(),
            callbacks.on_channel_error.is_some(),
            callbacks.on_message_received.is_some(),
            callbacks.on_data_received.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        log::info!("Loaded host library {:?}: {} of 7 callbacks exported", path, exported);

        Ok(Self {
            callbacks,
            _library: library,
        })
    }
}

/// Look up an optional callback symbol
unsafe fn symbol<T: Copy + 'static>(library: &Library, name: &[u8]) -> Option<T> {
    match library.get::<T>(name) {
        Ok(sym) => Some(*sym),
        Err(_) => {
            log::debug!(
                "Host library does not export {}",
                String::from_utf8_lossy(&name[..name.len() - 1])
            );
            None
        }
    }
}

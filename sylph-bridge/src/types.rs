//! Core types for the bridge library
//!
//! This module defines the identifier handles, the transport role and the
//! error type shared by every part of the bridge. Identifiers are opaque
//! handles: the host may compare and store them but must never interpret
//! their bit pattern.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Opaque handle of a transport (a native connection endpoint)
///
/// Handles are never zero. On the C side a zero value means "no handle".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(NonZeroU64);

/// Opaque handle of a channel (a logical stream owned by one transport)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(NonZeroU64);

macro_rules! impl_handle {
    ($name:ident, $prefix:literal) => {
        impl $name {
            pub(crate) fn new(raw: NonZeroU64) -> Self {
                Self(raw)
            }

            /// Rebuild a handle from its raw value, `None` for the null handle
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Rebuild a handle from a raw value received across the boundary
            pub fn try_from_raw(raw: u64) -> Result<Self> {
                Self::from_raw(raw).ok_or(BridgeError::NullHandle)
            }

            /// The raw value passed across the boundary
            pub fn raw(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.raw()
            }
        }
    };
}

impl_handle!(TransportId, "transport");
impl_handle!(ChannelId, "channel");

/// Which side of the connection a transport was created on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Transport created by dialing out
    #[default]
    Client,
    /// Transport created by accepting a connection
    Server,
}

impl Role {
    /// Build a role from the boundary's `isServer` flag
    pub fn from_is_server(is_server: bool) -> Self {
        if is_server {
            Role::Server
        } else {
            Role::Client
        }
    }

    /// The boundary's `isServer` flag
    pub fn is_server(self) -> bool {
        matches!(self, Role::Server)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Errors that can occur while marshaling or checking an event
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown transport: {0}")]
    UnknownTransport(TransportId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("Transport already open: {0}")]
    TransportAlreadyOpen(TransportId),

    #[error("Channel already open: {0}")]
    ChannelAlreadyOpen(ChannelId),

    #[error("Invalid string argument: {0}")]
    InvalidString(String),

    #[error("Handle {0} was already closed")]
    HandleClosed(u64),

    #[error("Null handle")]
    NullHandle,

    #[error("Invalid frame: {0}")]
    Frame(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::ffi::NulError> for BridgeError {
    fn from(e: std::ffi::NulError) -> Self {
        BridgeError::InvalidString(format!("interior NUL byte at offset {}", e.nul_position()))
    }
}

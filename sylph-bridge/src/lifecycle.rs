//! Per-entity lifecycle bookkeeping
//!
//! Tracks which transports and channels are live so the dispatcher can refuse
//! events that arrive for an unknown or already closed entity, and can find
//! the channels still open on a transport when that transport closes.
//!
//! Handles are never reused, so a closed handle stays closed: opening it
//! again, or reporting anything else for it, is refused.
//!
//! The lock is only held while the bookkeeping is updated, never while a
//! callback runs.

use crate::types::{BridgeError, ChannelId, Result, Role, TransportId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct LiveTransport {
    role: Role,
    /// Open channels, ordered by handle (which is creation order)
    channels: BTreeSet<ChannelId>,
}

#[derive(Debug, Default)]
struct State {
    transports: HashMap<TransportId, LiveTransport>,
    channels: HashMap<ChannelId, TransportId>,
    closed: HashSet<u64>,
}

impl State {
    fn ensure_not_closed(&self, handle: impl Into<u64>) -> Result<()> {
        let handle = handle.into();
        if self.closed.contains(&handle) {
            return Err(BridgeError::HandleClosed(handle));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct LifecycleTracker {
    state: Mutex<State>,
}

impl LifecycleTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open_transport(&self, transport: TransportId, role: Role) -> Result<()> {
        let mut state = self.lock();
        state.ensure_not_closed(transport)?;
        if state.transports.contains_key(&transport) {
            return Err(BridgeError::TransportAlreadyOpen(transport));
        }
        state.transports.insert(
            transport,
            LiveTransport {
                role,
                channels: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Forget a transport and every channel still open on it
    ///
    /// Returns the orphaned channels in creation order.
    pub(crate) fn close_transport(
        &self,
        transport: TransportId,
        role: Role,
    ) -> Result<Vec<ChannelId>> {
        let mut state = self.lock();
        state.ensure_not_closed(transport)?;
        let live = state
            .transports
            .remove(&transport)
            .ok_or(BridgeError::UnknownTransport(transport))?;
        state.closed.insert(transport.raw());

        if live.role != role {
            log::warn!(
                "{} opened as {} but closed as {}",
                transport,
                live.role,
                role
            );
        }

        for channel in &live.channels {
            state.channels.remove(channel);
            state.closed.insert(channel.raw());
        }
        Ok(live.channels.into_iter().collect())
    }

    pub(crate) fn open_channel(&self, transport: TransportId, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        state.ensure_not_closed(channel)?;
        state.ensure_not_closed(transport)?;
        if state.channels.contains_key(&channel) {
            return Err(BridgeError::ChannelAlreadyOpen(channel));
        }
        let live = state
            .transports
            .get_mut(&transport)
            .ok_or(BridgeError::UnknownTransport(transport))?;
        live.channels.insert(channel);
        state.channels.insert(channel, transport);
        Ok(())
    }

    pub(crate) fn check_channel(&self, channel: ChannelId) -> Result<()> {
        let state = self.lock();
        state.ensure_not_closed(channel)?;
        if state.channels.contains_key(&channel) {
            Ok(())
        } else {
            Err(BridgeError::UnknownChannel(channel))
        }
    }

    pub(crate) fn close_channel(&self, channel: ChannelId) -> Result<()> {
        let mut state = self.lock();
        state.ensure_not_closed(channel)?;
        let transport = state
            .channels
            .remove(&channel)
            .ok_or(BridgeError::UnknownChannel(channel))?;
        state.closed.insert(channel.raw());
        if let Some(live) = state.transports.get_mut(&transport) {
            live.channels.remove(&channel);
        }
        Ok(())
    }

    pub(crate) fn live_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.transports.len(), state.channels.len())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Handle allocation and human-readable labels
//!
//! Every transport and channel crossing the boundary is named by an opaque
//! `u64` handle. `Identifiers` hands those out from a single monotonically
//! increasing counter, so a handle value is never reused while the allocator
//! lives, and keeps a label for each live handle that hosts can fetch
//! separately. Identity is never derived from a label.

use crate::types::{ChannelId, TransportId};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Allocator of opaque handles plus the label book for live entities
#[derive(Debug)]
pub struct Identifiers {
    next: AtomicU64,
    book: RwLock<LabelBook>,
}

#[derive(Debug, Default)]
struct LabelBook {
    labels: HashMap<u64, String>,
    /// Owning transport of each opened channel that still has a label
    owners: HashMap<u64, u64>,
}

impl Identifiers {
    /// Create an empty allocator; the first handle handed out is 1
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            book: RwLock::new(LabelBook::default()),
        }
    }

    /// Allocate a handle for a new transport and remember its label
    pub fn new_transport(&self, label: impl Into<String>) -> TransportId {
        TransportId::new(self.allocate(label.into()))
    }

    /// Allocate a handle for a new channel and remember its label
    pub fn new_channel(&self, label: impl Into<String>) -> ChannelId {
        ChannelId::new(self.allocate(label.into()))
    }

    /// Label of a live handle
    pub fn label(&self, handle: impl Into<u64>) -> Option<String> {
        self.read().labels.get(&handle.into()).cloned()
    }

    /// Forget the label of a handle whose closed event has been delivered
    ///
    /// The handle value itself is not returned to the pool.
    pub fn release(&self, handle: impl Into<u64>) -> Option<String> {
        let handle = handle.into();
        let mut book = self.write();
        book.owners.remove(&handle);
        book.labels.remove(&handle)
    }

    /// Record that `channel` was opened on `transport`
    pub(crate) fn bind_channel(&self, channel: ChannelId, transport: TransportId) {
        let mut book = self.write();
        if book.labels.contains_key(&channel.raw()) {
            book.owners.insert(channel.raw(), transport.raw());
        }
    }

    /// Forget a transport's label together with the labels of every channel
    /// still bound to it; returns how many channel labels went with it
    pub(crate) fn release_transport(&self, transport: TransportId) -> usize {
        let transport = transport.raw();
        let mut book = self.write();
        book.labels.remove(&transport);

        let orphans: Vec<u64> = book
            .owners
            .iter()
            .filter(|(_, owner)| **owner == transport)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in &orphans {
            book.owners.remove(channel);
            book.labels.remove(channel);
        }
        orphans.len()
    }

    /// Number of handles that still carry a label
    pub fn live_count(&self) -> usize {
        self.read().labels.len()
    }

    fn allocate(&self, label: String) -> NonZeroU64 {
        let mut raw = self.next.fetch_add(1, Ordering::Relaxed);
        if raw == 0 {
            // Wrapped after 2^64 allocations; skip the null handle.
            raw = self.next.fetch_add(1, Ordering::Relaxed);
        }
        let raw = NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN);

        log::trace!("Allocated handle {} for {:?}", raw, label);
        self.write().labels.insert(raw.get(), label);
        raw
    }

    fn read(&self) -> RwLockReadGuard<'_, LabelBook> {
        self.book.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LabelBook> {
        self.book.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Identifiers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_handles_are_unique_across_kinds() {
        let ids = Identifiers::new();
        let t1 = ids.new_transport("t1");
        let c1 = ids.new_channel("c1");
        let t2 = ids.new_transport("t1");

        assert_eq!(t1.raw(), 1);
        assert_ne!(t1.raw(), c1.raw());
        // Same label, different entity
        assert_ne!(t1, t2);
        assert_eq!(ids.label(t1).as_deref(), Some("t1"));
        assert_eq!(ids.label(t2).as_deref(), Some("t1"));
        assert_eq!(ids.label(c1).as_deref(), Some("c1"));
    }

    #[test]
    fn test_release_does_not_recycle_handle() {
        let ids = Identifiers::new();
        let c1 = ids.new_channel("c1");
        assert_eq!(ids.release(c1).as_deref(), Some("c1"));
        assert!(ids.label(c1).is_none());
        assert_eq!(ids.live_count(), 0);

        let c2 = ids.new_channel("c1");
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_release_transport_takes_bound_channels() {
        let ids = Identifiers::new();
        let t1 = ids.new_transport("t1");
        let t2 = ids.new_transport("t2");
        let c1 = ids.new_channel("c1");
        let c2 = ids.new_channel("c2");
        let c3 = ids.new_channel("c3");
        ids.bind_channel(c1, t1);
        ids.bind_channel(c2, t1);
        ids.bind_channel(c3, t2);

        // Released on its own first: no longer bound to t1
        ids.release(c2);
        assert_eq!(ids.release_transport(t1), 1);
        assert!(ids.label(t1).is_none());
        assert!(ids.label(c1).is_none());
        assert_eq!(ids.label(c3).as_deref(), Some("c3"));
        assert_eq!(ids.live_count(), 2);
    }

    #[test]
    fn test_concurrent_allocation() {
        let ids = Arc::new(Identifiers::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|i| ids.new_channel(format!("w{}-{}", n, i)).raw())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for raw in h.join().unwrap() {
                assert!(seen.insert(raw), "handle {} handed out twice", raw);
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(ids.live_count(), 1000);
    }
}

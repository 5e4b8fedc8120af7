//! C ABI
//!
//! Two directions cross this boundary:
//!
//! - Host callbacks: a C host fills a `SylphCallbacks` table of function
//!   pointers, one nullable slot per event kind, and hands it to
//!   `sylph_bridge_new`. A null slot leaves that kind unregistered.
//! - Engine emits: a C engine reports events with the `sylph_emit_*`
//!   functions, which run the dispatcher synchronously.
//!
//! Hosts that cannot take calls on engine threads create the bridge with
//! `sylph_bridge_new_polled` instead and pull wire frames with
//! `sylph_bridge_poll` (see `wire`).
//!
//! Handles are `u64` and never 0. Strings are NUL-terminated UTF-8. Every
//! pointer argument handed to a callback is valid only until it returns.
//! No panic ever unwinds through an exported function.

use crate::config::DispatcherConfig;
use crate::dispatcher::{panic_message, Delivery, Dispatcher};
use crate::queue::{EventReceiver, QueueSink};
use crate::registry::{CallbackRegistry, RegistryBuilder};
use crate::types::{ChannelId, Role, TransportId};
use crate::wire;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex};

pub type SylphOnTransportOpened = extern "C" fn(transport_id: u64, is_server: bool);
pub type SylphOnTransportClosed = extern "C" fn(transport_id: u64, is_server: bool);
pub type SylphOnChannelOpened = extern "C" fn(transport_id: u64, channel_id: u64);
pub type SylphOnChannelClosed = extern "C" fn(channel_id: u64);
pub type SylphOnChannelError = extern "C" fn(channel_id: u64, message: *const c_char);
pub type SylphOnMessageReceived = extern "C" fn(channel_id: u64, message: *const c_char);
pub type SylphOnDataReceived = extern "C" fn(channel_id: u64, data: *const u8, length: usize);

/// Callback table filled by a C host
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SylphCallbacks {
    pub on_transport_opened: Option<SylphOnTransportOpened>,
    pub on_transport_closed: Option<SylphOnTransportClosed>,
    pub on_channel_opened: Option<SylphOnChannelOpened>,
    pub on_channel_closed: Option<SylphOnChannelClosed>,
    pub on_channel_error: Option<SylphOnChannelError>,
    pub on_message_received: Option<SylphOnMessageReceived>,
    pub on_data_received: Option<SylphOnDataReceived>,
}

/// Result of an emit call, as seen by a C engine
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SylphStatus {
    Delivered = 0,
    Unregistered = 1,
    Rejected = 2,
    SinkPanicked = 3,
    InvalidArgument = 4,
}

impl From<Delivery> for SylphStatus {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Delivered => SylphStatus::Delivered,
            Delivery::Unregistered => SylphStatus::Unregistered,
            Delivery::Rejected(_) => SylphStatus::Rejected,
            Delivery::SinkPanicked => SylphStatus::SinkPanicked,
        }
    }
}

impl RegistryBuilder {
    /// Builder method: register every non-null slot of a C callback table
    pub fn with_c_callbacks(mut self, table: &SylphCallbacks) -> Self {
        if let Some(f) = table.on_transport_opened {
            self = self.on_transport_opened(move |t, role| f(t.raw(), role.is_server()));
        }
        if let Some(f) = table.on_transport_closed {
            self = self.on_transport_closed(move |t, role| f(t.raw(), role.is_server()));
        }
        if let Some(f) = table.on_channel_opened {
            self = self.on_channel_opened(move |t, c| f(t.raw(), c.raw()));
        }
        if let Some(f) = table.on_channel_closed {
            self = self.on_channel_closed(move |c| f(c.raw()));
        }
        if let Some(f) = table.on_channel_error {
            self = self.on_channel_error(move |c, message| {
                with_c_string(message, |s| f(c.raw(), s));
            });
        }
        if let Some(f) = table.on_message_received {
            self = self.on_message_received(move |c, message| {
                with_c_string(message, |s| f(c.raw(), s));
            });
        }
        if let Some(f) = table.on_data_received {
            // An empty slice still has a non-null (dangling) pointer.
            self = self.on_data_received(move |c, data| f(c.raw(), data.as_ptr(), data.len()));
        }
        self
    }
}

impl CallbackRegistry {
    /// Registry holding exactly the non-null slots of a C callback table
    pub fn from_c_callbacks(table: &SylphCallbacks) -> Self {
        RegistryBuilder::new().with_c_callbacks(table).build()
    }
}

/// Run `f` with a NUL-terminated copy of `text` that lives until `f` returns
fn with_c_string(text: &str, f: impl FnOnce(*const c_char)) {
    match CString::new(text) {
        Ok(s) => f(s.as_ptr()),
        Err(e) => log::error!("Cannot marshal string for C callback: {}", e),
    }
}

/// Bridge object handed to C as an opaque pointer
pub struct SylphBridge {
    dispatcher: Dispatcher,
    polled: Option<Mutex<PollState>>,
}

struct PollState {
    receiver: EventReceiver,
    /// Frame that did not fit the caller's buffer on the last poll
    pending: Option<Vec<u8>>,
}

impl SylphBridge {
    /// Bridge delivering straight into a C callback table
    pub fn with_callbacks(table: &SylphCallbacks, config: DispatcherConfig) -> Self {
        Self {
            dispatcher: Dispatcher::with_config(CallbackRegistry::from_c_callbacks(table), config),
            polled: None,
        }
    }

    /// Bridge queueing every event for `poll_frame`
    pub fn polled(config: DispatcherConfig) -> Self {
        let (sink, receiver) = QueueSink::channel();
        let registry = RegistryBuilder::new().with_sink(Arc::new(sink)).build();
        Self {
            dispatcher: Dispatcher::with_config(registry, config),
            polled: Some(Mutex::new(PollState {
                receiver,
                pending: None,
            })),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Next wire frame for a polled bridge (a null frame when nothing is
    /// pending), or `None` for a callback bridge
    ///
    /// `max_len` is the caller's buffer size. A frame larger than that stays
    /// pending and `Err(required_len)` is returned.
    pub fn poll_frame(&self, max_len: usize) -> Option<Result<Vec<u8>, usize>> {
        let mut state = self.polled.as_ref()?.lock().unwrap_or_else(|e| e.into_inner());

        let frame = match state.pending.take() {
            Some(frame) => frame,
            None => match state.receiver.try_next() {
                Some(event) => match wire::encode_frame(&wire::encode_event(&event)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("Dropping polled event that cannot be framed: {}", e);
                        wire::encode_null_frame()
                    }
                },
                None => wire::encode_null_frame(),
            },
        };

        if frame.len() > max_len {
            let required = frame.len();
            // The null frame is never worth keeping.
            if frame[0] != wire::PayloadType::Null as u8 {
                state.pending = Some(frame);
            }
            return Some(Err(required));
        }
        Some(Ok(frame))
    }
}

fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            log::error!("Panic at the C boundary: {}", panic_message(payload.as_ref()));
            fallback
        }
    }
}

/// Borrow a C string as UTF-8 for the duration of the call
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            log::warn!("Rejected non UTF-8 string from C: {}", e);
            None
        }
    }
}

/// Create a bridge that delivers into `callbacks`
///
/// A null `callbacks` creates a bridge with nothing registered. The table is
/// copied; the caller may free it after this returns.
///
/// # Safety
/// `callbacks` must be null or point to a valid `SylphCallbacks`.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_new(callbacks: *const SylphCallbacks) -> *mut SylphBridge {
    guard(ptr::null_mut(), || {
        let table = if callbacks.is_null() {
            SylphCallbacks::default()
        } else {
            *callbacks
        };
        Box::into_raw(Box::new(SylphBridge::with_callbacks(&table, DispatcherConfig::default())))
    })
}

/// Create a bridge whose events are pulled with `sylph_bridge_poll`
#[no_mangle]
pub extern "C" fn sylph_bridge_new_polled() -> *mut SylphBridge {
    guard(ptr::null_mut(), || {
        Box::into_raw(Box::new(SylphBridge::polled(DispatcherConfig::default())))
    })
}

/// Destroy a bridge created by `sylph_bridge_new` or `sylph_bridge_new_polled`
///
/// # Safety
/// `bridge` must be null or a pointer returned by one of the constructors,
/// not freed before, and no other thread may be using it.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_free(bridge: *mut SylphBridge) {
    if !bridge.is_null() {
        guard((), || drop(Box::from_raw(bridge)));
    }
}

/// Allocate a transport handle carrying `label`; 0 on failure
///
/// # Safety
/// `bridge` must be null or valid; `label` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_new_transport(
    bridge: *const SylphBridge,
    label: *const c_char,
) -> u64 {
    let Some(bridge) = bridge.as_ref() else { return 0 };
    guard(0, || {
        let label = borrow_str(label).unwrap_or_default();
        bridge.dispatcher.identifiers().new_transport(label).raw()
    })
}

/// Allocate a channel handle carrying `label`; 0 on failure
///
/// # Safety
/// `bridge` must be null or valid; `label` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_new_channel(
    bridge: *const SylphBridge,
    label: *const c_char,
) -> u64 {
    let Some(bridge) = bridge.as_ref() else { return 0 };
    guard(0, || {
        let label = borrow_str(label).unwrap_or_default();
        bridge.dispatcher.identifiers().new_channel(label).raw()
    })
}

/// Copy the label of a live handle into `buf`
///
/// Returns the label length in bytes (without the NUL), or -1 if the handle
/// is not live. At most `cap - 1` bytes are copied and the copy is always
/// NUL-terminated when `cap > 0`, so a return value `>= cap` means the label
/// was truncated.
///
/// # Safety
/// `bridge` must be null or valid; `buf` must be null or point to `cap`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_label(
    bridge: *const SylphBridge,
    handle: u64,
    buf: *mut c_char,
    cap: usize,
) -> isize {
    let Some(bridge) = bridge.as_ref() else { return -1 };
    guard(-1, || {
        let Some(label) = bridge.dispatcher.identifiers().label(handle) else {
            return -1;
        };
        if !buf.is_null() && cap > 0 {
            let n = label.len().min(cap - 1);
            ptr::copy_nonoverlapping(label.as_ptr() as *const c_char, buf, n);
            *buf.add(n) = 0;
        }
        label.len() as isize
    })
}

/// Write the next wire frame of a polled bridge into `buf`
///
/// Returns the number of bytes written (5 for the null frame meaning
/// "nothing pending"), `-(required size)` if `buf` is too small (the frame
/// stays pending), or 0 for a null/non-polled bridge.
///
/// # Safety
/// `bridge` must be null or valid; `buf` must point to `cap` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn sylph_bridge_poll(
    bridge: *const SylphBridge,
    buf: *mut u8,
    cap: usize,
) -> isize {
    let Some(bridge) = bridge.as_ref() else { return 0 };
    let cap = if buf.is_null() { 0 } else { cap };
    guard(0, || match bridge.poll_frame(cap) {
        None => 0,
        Some(Ok(frame)) => {
            ptr::copy_nonoverlapping(frame.as_ptr(), buf, frame.len());
            frame.len() as isize
        }
        Some(Err(required)) => -(required as isize),
    })
}

/// Run one emit against a bridge pointer, mapping failures to a status
unsafe fn emit(
    bridge: *const SylphBridge,
    f: impl FnOnce(&Dispatcher) -> SylphStatus,
) -> SylphStatus {
    match bridge.as_ref() {
        Some(bridge) => guard(SylphStatus::SinkPanicked, || f(&bridge.dispatcher)),
        None => SylphStatus::InvalidArgument,
    }
}

/// # Safety
/// `bridge` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_transport_opened(
    bridge: *const SylphBridge,
    transport_id: u64,
    is_server: bool,
) -> SylphStatus {
    emit(bridge, |d| match TransportId::from_raw(transport_id) {
        Some(t) => d.transport_opened(t, Role::from_is_server(is_server)).into(),
        None => SylphStatus::InvalidArgument,
    })
}

/// # Safety
/// `bridge` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_transport_closed(
    bridge: *const SylphBridge,
    transport_id: u64,
    is_server: bool,
) -> SylphStatus {
    emit(bridge, |d| match TransportId::from_raw(transport_id) {
        Some(t) => d.transport_closed(t, Role::from_is_server(is_server)).into(),
        None => SylphStatus::InvalidArgument,
    })
}

/// # Safety
/// `bridge` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_channel_opened(
    bridge: *const SylphBridge,
    transport_id: u64,
    channel_id: u64,
) -> SylphStatus {
    emit(bridge, |d| {
        match (TransportId::from_raw(transport_id), ChannelId::from_raw(channel_id)) {
            (Some(t), Some(c)) => d.channel_opened(t, c).into(),
            _ => SylphStatus::InvalidArgument,
        }
    })
}

/// # Safety
/// `bridge` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_channel_closed(
    bridge: *const SylphBridge,
    channel_id: u64,
) -> SylphStatus {
    emit(bridge, |d| match ChannelId::from_raw(channel_id) {
        Some(c) => d.channel_closed(c).into(),
        None => SylphStatus::InvalidArgument,
    })
}

/// # Safety
/// `bridge` must be null or valid; `message` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_channel_error(
    bridge: *const SylphBridge,
    channel_id: u64,
    message: *const c_char,
) -> SylphStatus {
    emit(bridge, |d| match (ChannelId::from_raw(channel_id), borrow_str(message)) {
        (Some(c), Some(text)) => d.channel_error(c, text).into(),
        _ => SylphStatus::InvalidArgument,
    })
}

/// # Safety
/// `bridge` must be null or valid; `message` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_message_received(
    bridge: *const SylphBridge,
    channel_id: u64,
    message: *const c_char,
) -> SylphStatus {
    emit(bridge, |d| match (ChannelId::from_raw(channel_id), borrow_str(message)) {
        (Some(c), Some(text)) => d.message_received(c, text).into(),
        _ => SylphStatus::InvalidArgument,
    })
}

/// `data` may be null only when `length` is 0
///
/// # Safety
/// `bridge` must be null or valid; `data` must point to `length` readable
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn sylph_emit_data_received(
    bridge: *const SylphBridge,
    channel_id: u64,
    data: *const u8,
    length: usize,
) -> SylphStatus {
    emit(bridge, |d| {
        let Some(channel) = ChannelId::from_raw(channel_id) else {
            return SylphStatus::InvalidArgument;
        };
        let bytes: &[u8] = if length == 0 {
            &[]
        } else if data.is_null() {
            return SylphStatus::InvalidArgument;
        } else {
            std::slice::from_raw_parts(data, length)
        };
        d.data_received(channel, bytes).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_returns_are_pointer_sized() {
        // The header declares these returns as intptr_t
        assert_eq!(std::mem::size_of::<isize>(), std::mem::size_of::<*const u8>());
        let _: unsafe extern "C" fn(*const SylphBridge, u64, *mut c_char, usize) -> isize =
            sylph_bridge_label;
        let _: unsafe extern "C" fn(*const SylphBridge, *mut u8, usize) -> isize =
            sylph_bridge_poll;
    }

    #[test]
    fn test_null_table_registers_nothing() {
        let registry = CallbackRegistry::from_c_callbacks(&SylphCallbacks::default());
        assert!(registry.registered_kinds().is_empty());
    }

    #[test]
    fn test_null_bridge_is_tolerated() {
        unsafe {
            assert_eq!(sylph_bridge_new_transport(ptr::null(), ptr::null()), 0);
            assert_eq!(
                sylph_emit_channel_closed(ptr::null(), 1),
                SylphStatus::InvalidArgument
            );
            assert_eq!(sylph_bridge_label(ptr::null(), 1, ptr::null_mut(), 0), -1);
            assert_eq!(sylph_bridge_poll(ptr::null(), ptr::null_mut(), 0), 0);
            sylph_bridge_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_label_truncation() {
        unsafe {
            let bridge = sylph_bridge_new(ptr::null());
            let label = CString::new("transport-one").unwrap();
            let t = sylph_bridge_new_transport(bridge, label.as_ptr());
            assert_ne!(t, 0);

            let mut buf = [0 as c_char; 5];
            let n = sylph_bridge_label(bridge, t, buf.as_mut_ptr(), buf.len());
            assert_eq!(n, 13);
            assert_eq!(CStr::from_ptr(buf.as_ptr()).to_str().unwrap(), "tran");

            assert_eq!(sylph_bridge_label(bridge, t + 100, buf.as_mut_ptr(), buf.len()), -1);
            sylph_bridge_free(bridge);
        }
    }

    #[test]
    fn test_poll_keeps_oversized_frame_pending() {
        let bridge = SylphBridge::polled(DispatcherConfig::passthrough());
        let channel = ChannelId::from_raw(1).unwrap();
        bridge.dispatcher().data_received(channel, &[7u8; 64]);

        // 5 header + 1 kind + 8 handle + 64 payload
        assert_eq!(bridge.poll_frame(16), Some(Err(78)));
        let frame = bridge.poll_frame(128).unwrap().unwrap();
        assert_eq!(frame.len(), 78);

        let decoded = wire::decode_frame(&frame).unwrap();
        let event = wire::decode_event(&decoded.body).unwrap();
        assert_eq!(event.channel_id(), Some(channel));

        // Nothing left: null frame
        assert_eq!(bridge.poll_frame(16), Some(Ok(wire::encode_null_frame())));
    }

    #[test]
    fn test_callback_bridge_does_not_poll() {
        let bridge =
            SylphBridge::with_callbacks(&SylphCallbacks::default(), DispatcherConfig::default());
        assert!(bridge.poll_frame(64).is_none());
    }
}

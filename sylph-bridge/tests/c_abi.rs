// Drives the exported C functions the way a C engine and host would
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Mutex;
use sylph_bridge::ffi::*;
use sylph_bridge::wire;
use sylph_bridge::{BridgeEvent, ChannelId};

// One static log per test binary; tests that use it hold LOG_GUARD.
static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());
static LOG_GUARD: Mutex<()> = Mutex::new(());

fn record(entry: String) {
    LOG.lock().unwrap().push(entry);
}

extern "C" fn on_transport_opened(t: u64, is_server: bool) {
    record(format!("transport_opened {} {}", t, is_server));
}

extern "C" fn on_transport_closed(t: u64, is_server: bool) {
    record(format!("transport_closed {} {}", t, is_server));
}

extern "C" fn on_channel_opened(t: u64, c: u64) {
    record(format!("channel_opened {} {}", t, c));
}

extern "C" fn on_channel_closed(c: u64) {
    record(format!("channel_closed {}", c));
}

extern "C" fn on_message_received(c: u64, message: *const c_char) {
    let text = unsafe { CStr::from_ptr(message) }.to_str().unwrap().to_string();
    record(format!("message_received {} {}", c, text));
}

extern "C" fn on_data_received(c: u64, data: *const u8, length: usize) {
    assert!(!data.is_null());
    let bytes = unsafe { std::slice::from_raw_parts(data, length) };
    record(format!("data_received {} {:?}", c, bytes));
}

fn table() -> SylphCallbacks {
    SylphCallbacks {
        on_transport_opened: Some(on_transport_opened),
        on_transport_closed: Some(on_transport_closed),
        on_channel_opened: Some(on_channel_opened),
        on_channel_closed: Some(on_channel_closed),
        on_channel_error: None,
        on_message_received: Some(on_message_received),
        on_data_received: Some(on_data_received),
    }
}

#[test]
fn test_c_host_receives_session() {
    let _guard = LOG_GUARD.lock().unwrap();
    LOG.lock().unwrap().clear();

    unsafe {
        let callbacks = table();
        let bridge = sylph_bridge_new(&callbacks);
        assert!(!bridge.is_null());

        let t_label = CString::new("peer-a").unwrap();
        let c_label = CString::new("chat").unwrap();
        let t = sylph_bridge_new_transport(bridge, t_label.as_ptr());
        let c = sylph_bridge_new_channel(bridge, c_label.as_ptr());

        let hello = CString::new("hello").unwrap();
        let error = CString::new("unused").unwrap();
        let data = [0x41u8, 0x00, 0x42];

        assert_eq!(sylph_emit_transport_opened(bridge, t, true), SylphStatus::Delivered);
        assert_eq!(sylph_emit_channel_opened(bridge, t, c), SylphStatus::Delivered);
        assert_eq!(sylph_emit_message_received(bridge, c, hello.as_ptr()), SylphStatus::Delivered);
        assert_eq!(sylph_emit_channel_error(bridge, c, error.as_ptr()), SylphStatus::Unregistered);
        assert_eq!(
            sylph_emit_data_received(bridge, c, data.as_ptr(), data.len()),
            SylphStatus::Delivered
        );
        assert_eq!(sylph_emit_data_received(bridge, c, ptr::null(), 0), SylphStatus::Delivered);
        assert_eq!(sylph_emit_channel_closed(bridge, c), SylphStatus::Delivered);
        assert_eq!(sylph_emit_transport_closed(bridge, t, true), SylphStatus::Delivered);

        sylph_bridge_free(bridge);

        assert_eq!(
            *LOG.lock().unwrap(),
            vec![
                format!("transport_opened {} true", t),
                format!("channel_opened {} {}", t, c),
                format!("message_received {} hello", c),
                format!("data_received {} [65, 0, 66]", c),
                format!("data_received {} []", c),
                format!("channel_closed {}", c),
                format!("transport_closed {} true", t),
            ]
        );
    }
}

#[test]
fn test_invalid_arguments_are_reported() {
    unsafe {
        let bridge = sylph_bridge_new(ptr::null());
        let invalid = SylphStatus::InvalidArgument;
        assert_eq!(sylph_emit_transport_opened(bridge, 0, false), invalid);
        assert_eq!(sylph_emit_message_received(bridge, 5, ptr::null()), invalid);
        assert_eq!(sylph_emit_data_received(bridge, 5, ptr::null(), 3), invalid);

        let bad_utf8 = [0xFFu8, 0xFE, 0x00];
        assert_eq!(
            sylph_emit_channel_error(bridge, 5, bad_utf8.as_ptr() as *const c_char),
            SylphStatus::InvalidArgument
        );

        // Lifecycle tracking refuses a channel that was never opened
        assert_eq!(sylph_emit_channel_closed(bridge, 5), SylphStatus::Rejected);
        sylph_bridge_free(bridge);
    }
}

#[test]
fn test_polled_bridge_yields_frames() {
    unsafe {
        let bridge = sylph_bridge_new_polled();
        let t = sylph_bridge_new_transport(bridge, ptr::null());
        let c = sylph_bridge_new_channel(bridge, ptr::null());
        sylph_emit_transport_opened(bridge, t, false);
        sylph_emit_channel_opened(bridge, t, c);
        let data = [1u8, 2, 3];
        sylph_emit_data_received(bridge, c, data.as_ptr(), data.len());

        let mut buf = [0u8; 64];
        let mut events = Vec::new();
        loop {
            let n = sylph_bridge_poll(bridge, buf.as_mut_ptr(), buf.len());
            assert!(n > 0);
            let frame = wire::decode_frame(&buf[..n as usize]).unwrap();
            if frame.payload_type == wire::PayloadType::Null {
                break;
            }
            events.push(wire::decode_event(&frame.body).unwrap());
        }

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            BridgeEvent::DataReceived {
                channel: ChannelId::from_raw(c).unwrap(),
                data: vec![1, 2, 3]
            }
        );
        sylph_bridge_free(bridge);
    }
}

//! Wire frames for polled events
//!
//! A polled event crosses the C boundary as one length-prefixed frame:
//!
//! ```text
//! +--------------+---------------------+------------------+
//! | payload type | body length (u32 LE)| body             |
//! |   1 byte     |      4 bytes        | length bytes     |
//! +--------------+---------------------+------------------+
//! ```
//!
//! Payload type `0` (null) means "nothing pending" and always has an empty
//! body. Payload type `1` (value) carries an encoded event:
//!
//! ```text
//! kind code (u8) | fields, handles as u64 LE
//! transport_opened / transport_closed : transport, is_server (u8)
//! channel_opened                      : transport, channel
//! channel_closed                      : channel
//! channel_error / message_received    : channel, UTF-8 text (rest of body)
//! data_received                       : channel, raw bytes (rest of body)
//! ```

use crate::event::{BridgeEvent, EventKind};
use crate::types::{BridgeError, ChannelId, Result, Role, TransportId};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Size of the frame header (payload type + length)
pub const FRAME_HEADER_LEN: usize = 5;

/// Payload type byte at the start of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    Null = 0,
    Value = 1,
}

impl PayloadType {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(PayloadType::Null),
            1 => Ok(PayloadType::Value),
            other => Err(BridgeError::Frame(format!("unknown payload type {}", other))),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub payload_type: PayloadType,
    pub body: Vec<u8>,
}

/// Write one frame to `writer`
pub fn write_frame<W: Write>(
    writer: &mut W,
    payload_type: PayloadType,
    body: &[u8],
) -> Result<()> {
    let len = u32::try_from(body.len()).map_err(|_| {
        BridgeError::Frame(format!("body of {} bytes exceeds u32 length", body.len()))
    })?;
    writer.write_u8(payload_type as u8)?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(body)?;
    Ok(())
}

/// Encode a value frame around `body`
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    write_frame(&mut out, PayloadType::Value, body)?;
    Ok(out)
}

/// Encode the "nothing pending" frame
pub fn encode_null_frame() -> Vec<u8> {
    vec![PayloadType::Null as u8, 0, 0, 0, 0]
}

/// Decode the frame at the start of `bytes`
///
/// Trailing bytes after the frame are ignored; the frame occupies
/// `FRAME_HEADER_LEN + body.len()` bytes.
pub fn decode_frame(bytes: &[u8]) -> Result<WireFrame> {
    let mut cursor = Cursor::new(bytes);
    let payload_type = cursor
        .read_u8()
        .map_err(|_| BridgeError::Frame("empty frame".to_string()))?;
    let payload_type = PayloadType::from_byte(payload_type)?;
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| BridgeError::Frame("truncated frame header".to_string()))? as usize;

    if payload_type == PayloadType::Null && len != 0 {
        return Err(BridgeError::Frame(format!("null frame with {} byte body", len)));
    }

    let available = bytes.len() - FRAME_HEADER_LEN;
    if available < len {
        return Err(BridgeError::Frame(format!(
            "truncated frame body: expected {} bytes, got {}",
            len, available
        )));
    }

    let mut body = vec![0u8; len];
    cursor.read_exact(&mut body)?;
    Ok(WireFrame { payload_type, body })
}

/// Encode an event as a frame body
pub fn encode_event(event: &BridgeEvent) -> Vec<u8> {
    let mut body = vec![event.kind().code()];
    match event {
        BridgeEvent::TransportOpened { transport, role }
        | BridgeEvent::TransportClosed { transport, role } => {
            put_handle(&mut body, transport.raw());
            body.push(role.is_server() as u8);
        }
        BridgeEvent::ChannelOpened { transport, channel } => {
            put_handle(&mut body, transport.raw());
            put_handle(&mut body, channel.raw());
        }
        BridgeEvent::ChannelClosed { channel } => put_handle(&mut body, channel.raw()),
        BridgeEvent::ChannelError { channel, message }
        | BridgeEvent::MessageReceived { channel, message } => {
            put_handle(&mut body, channel.raw());
            body.extend_from_slice(message.as_bytes());
        }
        BridgeEvent::DataReceived { channel, data } => {
            put_handle(&mut body, channel.raw());
            body.extend_from_slice(data);
        }
    }
    body
}

/// Decode an event from a frame body produced by `encode_event`
pub fn decode_event(body: &[u8]) -> Result<BridgeEvent> {
    let mut cursor = Cursor::new(body);
    let code = cursor
        .read_u8()
        .map_err(|_| BridgeError::Frame("empty event body".to_string()))?;
    let kind = EventKind::from_code(code)
        .ok_or_else(|| BridgeError::Frame(format!("unknown event kind {}", code)))?;

    let event = match kind {
        EventKind::TransportOpened | EventKind::TransportClosed => {
            let transport = read_transport(&mut cursor)?;
            let role = Role::from_is_server(read_u8(&mut cursor)? != 0);
            if kind == EventKind::TransportOpened {
                BridgeEvent::TransportOpened { transport, role }
            } else {
                BridgeEvent::TransportClosed { transport, role }
            }
        }
        EventKind::ChannelOpened => BridgeEvent::ChannelOpened {
            transport: read_transport(&mut cursor)?,
            channel: read_channel(&mut cursor)?,
        },
        EventKind::ChannelClosed => BridgeEvent::ChannelClosed {
            channel: read_channel(&mut cursor)?,
        },
        EventKind::ChannelError | EventKind::MessageReceived => {
            let channel = read_channel(&mut cursor)?;
            let rest = &body[cursor.position() as usize..];
            let message = String::from_utf8(rest.to_vec())
                .map_err(|e| BridgeError::InvalidString(e.to_string()))?;
            if kind == EventKind::ChannelError {
                BridgeEvent::ChannelError { channel, message }
            } else {
                BridgeEvent::MessageReceived { channel, message }
            }
        }
        EventKind::DataReceived => {
            let channel = read_channel(&mut cursor)?;
            BridgeEvent::DataReceived {
                channel,
                data: body[cursor.position() as usize..].to_vec(),
            }
        }
    };
    Ok(event)
}

fn put_handle(body: &mut Vec<u8>, handle: u64) {
    body.extend_from_slice(&handle.to_le_bytes());
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor
        .read_u8()
        .map_err(|_| BridgeError::Frame("truncated event body".to_string()))
}

fn read_handle(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| BridgeError::Frame("truncated event body".to_string()))
}

fn read_transport(cursor: &mut Cursor<&[u8]>) -> Result<TransportId> {
    TransportId::try_from_raw(read_handle(cursor)?)
}

fn read_channel(cursor: &mut Cursor<&[u8]>) -> Result<ChannelId> {
    ChannelId::try_from_raw(read_handle(cursor)?)
}

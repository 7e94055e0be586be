//! Wire framing for the UART bridge between an MCU and a host.
//!
//! The bridge *program* — the thing that owns a UART device and a CAN
//! controller — is out of scope; these are the pure encode/decode
//! functions its framing would use, kept correct and tested independent of
//! any device.

const START_BYTE: u8 = 0xAA;
const END_BYTE: u8 = 0xBB;
const EXTENDED_BIT: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// Buffer was shorter than the fixed 10-byte header + declared payload
    /// + end byte.
    Truncated,
    /// The start or end byte didn't match.
    BadFraming,
    /// The declared payload length exceeded 8 bytes.
    PayloadTooLong,
}

impl std::fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FrameDecodeError::Truncated => "frame buffer too short",
            FrameDecodeError::BadFraming => "missing start or end byte",
            FrameDecodeError::PayloadTooLong => "payload length exceeds 8 bytes",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for FrameDecodeError {}

/// A decoded tunnel frame: bridge-local timestamp, the original CAN id,
/// and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelFrame {
    pub timestamp_millis: u32,
    pub can_id: u16,
    pub extended: bool,
    pub payload: Vec<u8>,
}

/// `0xAA | timestamp:4 LE | len:1 | id:4 LE | payload | 0xBB`.
pub fn encode(frame: &TunnelFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + frame.payload.len());
    out.push(START_BYTE);
    out.extend_from_slice(&frame.timestamp_millis.to_le_bytes());
    out.push(frame.payload.len() as u8);

    let wire_id = frame.can_id as u32 + if frame.extended { 0 } else { EXTENDED_BIT };
    out.extend_from_slice(&wire_id.to_le_bytes());
    out.extend_from_slice(&frame.payload);
    out.push(END_BYTE);
    out
}

pub fn decode(buf: &[u8]) -> Result<TunnelFrame, FrameDecodeError> {
    if buf.len() < 10 {
        return Err(FrameDecodeError::Truncated);
    }
    if buf[0] != START_BYTE {
        return Err(FrameDecodeError::BadFraming);
    }

    let timestamp_millis = u32::from_le_bytes(buf[1..5].try_into().unwrap());
    let len = buf[5] as usize;
    if len > 8 {
        return Err(FrameDecodeError::PayloadTooLong);
    }
    if buf.len() != 10 + len {
        return Err(FrameDecodeError::Truncated);
    }

    let wire_id = u32::from_le_bytes(buf[6..10].try_into().unwrap());
    let extended = wire_id & EXTENDED_BIT == 0;
    let can_id = (wire_id & !EXTENDED_BIT) as u16;

    let payload = buf[10..10 + len].to_vec();
    if buf[10 + len] != END_BYTE {
        return Err(FrameDecodeError::BadFraming);
    }

    Ok(TunnelFrame {
        timestamp_millis,
        can_id,
        extended,
        payload,
    })
}

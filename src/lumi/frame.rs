//! 16-byte LUMI SysEx frame
//!
//! ```text
//! F0 00 21 10 | 77 | <device id> | <8 payload bytes> | <checksum> | F7
//! ```

use std::fmt;

use crate::error::ProtocolError;
use crate::midi::format_hex;

use super::codec::{checksum, fold_checksum};
use super::{COMMAND_MESSAGE_TYPE, FRAME_LEN, PAYLOAD_LEN, SYSEX_END, VENDOR_PREFIX};

/// Exactly eight 7-bit command bytes
pub type Payload8 = [u8; PAYLOAD_LEN];

/// 7-bit device id carried in byte 5 of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(u8);

impl DeviceId {
    /// Broadcast id used by the LUMI desktop app
    pub const DEFAULT: DeviceId = DeviceId(0);

    /// Validate a device id (0-127)
    pub fn new(id: u8) -> Result<Self, ProtocolError> {
        if id > 0x7F {
            return Err(ProtocolError::validation(format!(
                "device id {} is out of 7-bit range",
                id
            )));
        }
        Ok(DeviceId(id))
    }

    /// Keep the low 7 bits of a raw id
    pub fn masked(id: u8) -> Self {
        DeviceId(id & 0x7F)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// A complete, checksummed command frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Build a frame from an 8-byte payload
    pub fn build(payload: &[u8], device_id: DeviceId) -> Result<Self, ProtocolError> {
        if payload.len() != PAYLOAD_LEN {
            return Err(ProtocolError::validation(format!(
                "frame payload must be {} bytes, got {}",
                PAYLOAD_LEN,
                payload.len()
            )));
        }

        let mut fixed = [0u8; PAYLOAD_LEN];
        fixed.copy_from_slice(payload);
        Ok(Self::from_payload(&fixed, device_id))
    }

    /// Build a frame from a payload whose length is already guaranteed
    pub fn from_payload(payload: &Payload8, device_id: DeviceId) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..4].copy_from_slice(&VENDOR_PREFIX);
        bytes[4] = COMMAND_MESSAGE_TYPE;
        bytes[5] = device_id.value();
        for (slot, &b) in bytes[6..14].iter_mut().zip(payload) {
            *slot = b & 0x7F;
        }
        bytes[14] = fold_checksum(payload);
        bytes[15] = SYSEX_END;

        Self { bytes }
    }

    /// Parse and verify a received frame
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() != FRAME_LEN {
            return Err(ProtocolError::validation(format!(
                "frame must be {} bytes, got {}",
                FRAME_LEN,
                data.len()
            )));
        }
        if data[..4] != VENDOR_PREFIX {
            return Err(ProtocolError::validation(format!(
                "unexpected vendor prefix {}",
                format_hex(&data[..4])
            )));
        }
        if data[4] != COMMAND_MESSAGE_TYPE {
            return Err(ProtocolError::validation(format!(
                "unexpected message type 0x{:02X}",
                data[4]
            )));
        }
        if data[15] != SYSEX_END {
            return Err(ProtocolError::validation("frame is not terminated by F7"));
        }

        let expected = checksum(&data[6..14])?;
        if data[14] != expected {
            return Err(ProtocolError::validation(format!(
                "checksum mismatch: frame has 0x{:02X}, payload gives 0x{:02X}",
                data[14], expected
            )));
        }

        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(data);
        Ok(Self { bytes })
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId(self.bytes[5])
    }

    pub fn payload(&self) -> Payload8 {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&self.bytes[6..14]);
        payload
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[14]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}]", format_hex(&self.bytes))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_hex(&self.bytes))
    }
}

/// Build a frame from a raw payload and a raw device id (masked to 7 bits)
pub fn build_frame(payload: &[u8], device_id: u8) -> Result<Frame, ProtocolError> {
    Frame::build(payload, DeviceId::masked(device_id))
}

/// Wrap a hex payload string ("10 40 02 00 00 00 00 00") into a frame
///
/// Separators may be spaces, commas or `0x` prefixes; bytes are masked to 7 bits.
pub fn wrap_payload_hex(text: &str, device_id: DeviceId) -> Result<Frame, ProtocolError> {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        let digits = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let decoded = hex::decode(&digits).map_err(|e| {
            ProtocolError::validation(format!("invalid hex byte '{}': {}", token, e))
        })?;
        payload.extend(decoded.into_iter().map(|b| b & 0x7F));
    }

    Frame::build(&payload, device_id)
}

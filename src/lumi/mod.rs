//! ROLI LUMI SysEx protocol
//!
//! Builds the vendor-exclusive frames that set key lighting on LUMI keyboards:
//! colors, root key, scale, mode and brightness.

pub mod catalog;
pub mod codec;
pub mod color;
pub mod frame;
pub mod key_color;

pub use catalog::{Brightness, Command, Mode, RootKey, Scale};
pub use codec::{checksum, decode_color, encode_color};
pub use color::{palette, Rgb};
pub use frame::{build_frame, wrap_payload_hex, DeviceId, Frame, Payload8};
pub use key_color::KeyColor;

/// ROLI manufacturer prefix, including the SysEx start byte
pub const VENDOR_PREFIX: [u8; 4] = [0xF0, 0x00, 0x21, 0x10];
/// Message type of checksummed 8-byte commands
pub const COMMAND_MESSAGE_TYPE: u8 = 0x77;
/// Message type of per-key color messages
pub const KEY_COLOR_MESSAGE_TYPE: u8 = 0x78;
pub const SYSEX_END: u8 = 0xF7;

pub const PAYLOAD_LEN: usize = 8;
pub const FRAME_LEN: usize = 16;

/// True if the bytes start with the ROLI SysEx prefix
pub fn is_lumi_sysex(data: &[u8]) -> bool {
    data.len() >= VENDOR_PREFIX.len() && data[..VENDOR_PREFIX.len()] == VENDOR_PREFIX
}

impl Command {
    /// Encode this command into a frame for the given device
    pub fn to_frame(&self, device_id: DeviceId) -> Frame {
        Frame::from_payload(&self.payload(), device_id)
    }
}

//! Color packing and payload checksum
//!
//! LUMI carries 8-bit color channels in 7-bit SysEx lanes. The packing
//! drops and overlaps bits (green LSB shares a lane with blue bit 2), so
//! it cannot be inverted exactly. The layout must match the hardware bit for bit.

use crate::error::ProtocolError;

use super::PAYLOAD_LEN;

/// Pack an RGB triple into the 5-byte color representation
///
/// Each channel is clamped to 0-255 first, so out-of-range values are accepted.
pub fn encode_color(r: i32, g: i32, b: i32) -> [u8; 5] {
    let r = r.clamp(0, 255) as u8;
    let g = g.clamp(0, 255) as u8;
    let b = b.clamp(0, 255) as u8;

    [
        ((b & 0x03) << 5) | 0x04,
        ((b >> 2) & 0x3F) | (g & 0x01),
        (g >> 1) & 0x7F,
        r & 0x7F,
        ((r >> 7) & 0x01) | 0x7E,
    ]
}

/// Best-effort inverse of [`encode_color`]
///
/// Red is recovered exactly. Bit 0 of the second byte is shared by green and
/// blue; it is attributed to blue, so green loses its least significant bit.
pub fn decode_color(bytes: &[u8; 5]) -> (u8, u8, u8) {
    let r = (bytes[3] & 0x7F) | ((bytes[4] & 0x01) << 7);
    let g = (bytes[2] & 0x7F) << 1;
    let b = ((bytes[1] & 0x3F) << 2) | ((bytes[0] >> 5) & 0x03);
    (r, g, b)
}

/// Compute the 7-bit checksum of an 8-byte command payload
///
/// The accumulator is seeded with the payload length and folded as
/// `acc = (acc * 3 + (byte & 0x7F)) mod 256`.
pub fn checksum(payload: &[u8]) -> Result<u8, ProtocolError> {
    if payload.len() != PAYLOAD_LEN {
        return Err(ProtocolError::validation(format!(
            "checksum expects {} payload bytes, got {}",
            PAYLOAD_LEN,
            payload.len()
        )));
    }

    Ok(fold_checksum(payload))
}

pub(crate) fn fold_checksum(payload: &[u8]) -> u8 {
    let mut acc = payload.len() as u8;
    for &b in payload {
        acc = acc.wrapping_mul(3).wrapping_add(b & 0x7F);
    }
    acc & 0x7F
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_known_value() {
        let payload = [0x10, 0x40, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(checksum(&payload).unwrap(), 0x5E);
    }

    #[test]
    fn test_checksum_root_key_c() {
        let payload = [0x10, 0x30, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(checksum(&payload).unwrap(), 0x41);
    }

    #[test]
    fn test_checksum_rejects_wrong_length() {
        assert!(matches!(
            checksum(&[0x10, 0x40, 0x02]),
            Err(ProtocolError::Validation(_))
        ));
        assert!(checksum(&[0u8; 9]).is_err());
        assert!(checksum(&[]).is_err());
    }

    #[test]
    fn test_checksum_is_order_sensitive() {
        let a = [0x10, 0x40, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
        let b = [0x40, 0x10, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_ne!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_encode_pure_red() {
        assert_eq!(encode_color(255, 0, 0), [0x04, 0x00, 0x00, 0x7F, 0x7F]);
    }

    #[test]
    fn test_encode_pure_green_and_bright_blue() {
        assert_eq!(encode_color(0, 255, 0), [0x04, 0x01, 0x7F, 0x00, 0x7E]);
        assert_eq!(encode_color(0, 1, 255), [0x64, 0x3F, 0x00, 0x00, 0x7E]);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        assert_eq!(encode_color(300, -5, 1000), encode_color(255, 0, 255));
        assert_eq!(encode_color(-1, -1, -1), encode_color(0, 0, 0));
    }

    #[test]
    fn test_red_survives_round_trip() {
        let (r, g, b) = decode_color(&encode_color(255, 0, 0));
        assert_eq!((r, g, b), (255, 0, 0));

        let (r, _, _) = decode_color(&encode_color(200, 77, 13));
        assert_eq!(r, 200);
    }

    #[test]
    fn test_green_and_blue_lose_precision() {
        // Green LSB and blue bit 2 land in the same bit
        assert_eq!(encode_color(0, 1, 0), encode_color(0, 0, 4));

        let (_, g, _) = decode_color(&encode_color(0, 255, 0));
        assert_eq!(g, 254);
    }

    proptest! {
        #[test]
        fn prop_checksum_is_seven_bit_and_deterministic(payload in proptest::array::uniform8(any::<u8>())) {
            let first = checksum(&payload).unwrap();
            prop_assert!(first <= 0x7F);
            prop_assert_eq!(first, checksum(&payload).unwrap());
        }

        #[test]
        fn prop_color_bytes_are_seven_bit(r in -512i32..512, g in -512i32..512, b in -512i32..512) {
            let bytes = encode_color(r, g, b);
            prop_assert_eq!(bytes.len(), 5);
            prop_assert!(bytes.iter().all(|&v| v <= 0x7F));
        }
    }
}

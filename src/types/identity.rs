//! 128-bit service identifiers multiplexed with a 16-bit sub-code

use std::fmt;

use uuid::Uuid;

/// Base identifier shared by every recognised sensor variant.
///
/// Bytes 2..4 (big-endian form) are zero; real devices carry their sub-code there.
pub const SENSOR_BASE_UUID: Uuid = Uuid::from_u128(0xf96d0000_1139_4e07_8ccf_d28be904fc0f);

/// Length of a 128-bit service identifier on the wire.
pub const IDENTIFIER_LEN: usize = 16;

/// Byte range of the sub-code inside the big-endian identifier.
const SUB_CODE_RANGE: std::ops::Range<usize> = 2..4;

/// A service identifier split into its base identifier and sub-code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    /// Identifier with the sub-code bytes zeroed
    pub base: Uuid,

    /// Sub-code carried in bytes 2..4 of the big-endian identifier
    pub sub_code: u16,
}

impl ServiceIdentity {
    /// Split a wire-order (little-endian) identifier.
    ///
    /// The identifier is reversed into big-endian form, the sub-code is read from
    /// bytes 2..4 as a little-endian `u16`, and those two bytes are zeroed to form
    /// the comparison identifier.
    pub fn from_wire(wire: [u8; IDENTIFIER_LEN]) -> Self {
        let mut reversed = wire;
        reversed.reverse();

        let sub_code = u16::from_le_bytes([reversed[SUB_CODE_RANGE.start], reversed[SUB_CODE_RANGE.start + 1]]);
        reversed[SUB_CODE_RANGE].fill(0);

        Self { base: Uuid::from_bytes(reversed), sub_code }
    }

    /// Inverse of [`ServiceIdentity::from_wire`].
    pub fn to_wire(&self) -> [u8; IDENTIFIER_LEN] {
        let mut bytes = *self.base.as_bytes();
        let [lo, hi] = self.sub_code.to_le_bytes();
        bytes[SUB_CODE_RANGE.start] = lo;
        bytes[SUB_CODE_RANGE.start + 1] = hi;
        bytes.reverse();
        bytes
    }

    /// Identity of a recognised sensor variant.
    pub fn sensor(sub_code: u16) -> Self {
        Self { base: SENSOR_BASE_UUID, sub_code }
    }

    /// Whether the base identifier is the recognised sensor base.
    pub fn is_recognized(&self) -> bool {
        self.base == SENSOR_BASE_UUID
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.sub_code)
    }
}

/// Convert a parsed 128-bit UUID back into wire (little-endian) order.
pub fn uuid_to_wire(uuid: &Uuid) -> [u8; IDENTIFIER_LEN] {
    let mut bytes = *uuid.as_bytes();
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sub_code_is_read_from_reversed_bytes_two_and_three() {
        let mut wire = uuid_to_wire(&SENSOR_BASE_UUID);
        // wire[13] and wire[12] land at reversed[2] and reversed[3]
        wire[12] = 0x00;
        wire[13] = 0x07;

        let identity = ServiceIdentity::from_wire(wire);
        assert_eq!(identity.sub_code, 7);
        assert!(identity.is_recognized());
    }

    #[test]
    fn high_sub_code_byte_is_the_fourth_reversed_byte() {
        let mut wire = uuid_to_wire(&SENSOR_BASE_UUID);
        wire[12] = 0x01;
        wire[13] = 0x02;

        assert_eq!(ServiceIdentity::from_wire(wire).sub_code, 0x0102);
    }

    #[test]
    fn other_bytes_break_recognition() {
        let mut wire = uuid_to_wire(&SENSOR_BASE_UUID);
        wire[0] ^= 0x01;

        assert!(!ServiceIdentity::from_wire(wire).is_recognized());
    }

    #[test]
    fn display_shows_base_and_sub_code() {
        let identity = ServiceIdentity::sensor(42);
        assert_eq!(identity.to_string(), "f96d0000-1139-4e07-8ccf-d28be904fc0f/42");
    }

    proptest! {
        #[test]
        fn wire_form_round_trips(sub_code in any::<u16>()) {
            let identity = ServiceIdentity::sensor(sub_code);
            prop_assert_eq!(ServiceIdentity::from_wire(identity.to_wire()), identity);
        }

        #[test]
        fn any_sub_code_is_recognized(sub_code in any::<u16>()) {
            let wire = ServiceIdentity::sensor(sub_code).to_wire();
            prop_assert!(ServiceIdentity::from_wire(wire).is_recognized());
        }
    }
}

//! Advertisement decoding.
//!
//! A recognised advertisement carries a 16-byte service identifier in wire order
//! followed by a packed array of signed 16-bit little-endian measurements:
//!
//! ```text
//! | identifier (16, LE) | m0 (i16 LE) | m1 (i16 LE) | ... |
//! ```
//!
//! Decoding is a filter: anything that is not a recognised sensor payload yields
//! `None`. The functions here hold no state and are safe to call concurrently.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::types::{Advertisement, SensorReading, ServiceIdentity};

/// Decode an advertisement, stamping the reading with the current time.
pub fn decode(advert: &Advertisement) -> Option<SensorReading> {
    decode_at(advert, Utc::now())
}

/// Decode an advertisement with an explicit timestamp.
pub fn decode_at(advert: &Advertisement, timestamp: DateTime<Utc>) -> Option<SensorReading> {
    let identifier = advert.identifier()?;
    let payload = advert.payload();

    let fields = decode_measurements(payload);
    if fields.is_empty() {
        return None;
    }

    let identity = ServiceIdentity::from_wire(identifier);
    if !identity.is_recognized() {
        trace!(address = %advert.address, base = %identity.base, "Ignoring foreign service data");
        return None;
    }

    if payload.len() % 2 == 1 {
        trace!(address = %advert.address, len = payload.len(), "Dropping trailing payload byte");
    }

    Some(SensorReading::at(advert.address.clone(), identity.sub_code, fields, timestamp))
}

/// Decode `len / 2` signed 16-bit little-endian values; a trailing odd byte is ignored.
pub fn decode_measurements(payload: &[u8]) -> Vec<i16> {
    payload.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{foreign_advertisement, sensor_advertisement};
    use proptest::prelude::*;

    #[test]
    fn decodes_reference_advertisement() {
        let payload = [10i16, -5, 7].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        let mut block = crate::types::uuid_to_wire(&crate::SENSOR_BASE_UUID).to_vec();
        block[12] = 0x00;
        block[13] = 0x07;
        block.extend_from_slice(&payload);

        let advert = Advertisement::new("C4:7C:8D:6A:10:01", Some(block));
        let reading = decode(&advert).expect("reference advertisement should decode");

        assert_eq!(reading.address, "C4:7C:8D:6A:10:01");
        assert_eq!(reading.service_uuid16, 7);
        assert_eq!(reading.fields, vec![10, -5, 7]);
        assert_eq!(reading.measurement(), "sensordata");
    }

    #[test]
    fn missing_service_data_is_filtered() {
        assert!(decode(&Advertisement::new("dev", None)).is_none());
    }

    #[test]
    fn empty_payload_is_filtered() {
        assert!(decode(&sensor_advertisement("dev", 1, &[])).is_none());
    }

    #[test]
    fn single_byte_payload_is_filtered() {
        assert!(decode(&sensor_advertisement("dev", 1, &[0x42])).is_none());
    }

    #[test]
    fn odd_payload_drops_trailing_byte() {
        let reading = decode(&sensor_advertisement("dev", 1, &[0x01, 0x00, 0xff, 0xff, 0x7f]))
            .expect("odd payload still decodes");

        assert_eq!(reading.fields, vec![1, -1]);
    }

    #[test]
    fn foreign_identifier_is_filtered() {
        assert!(decode(&foreign_advertisement("dev", &[1, 0, 2, 0])).is_none());
    }

    proptest! {
        #[test]
        fn recognized_blocks_decode_every_pair(
            sub_code in any::<u16>(),
            payload in prop::collection::vec(any::<u8>(), 2..64)
        ) {
            let advert = sensor_advertisement("AA:BB:CC:DD:EE:FF", sub_code, &payload);
            let reading = decode(&advert).expect("recognised block must decode");

            prop_assert_eq!(reading.service_uuid16, sub_code);
            prop_assert_eq!(reading.fields.len(), payload.len() / 2);
            for (i, value) in reading.fields.iter().enumerate() {
                prop_assert_eq!(*value, i16::from_le_bytes([payload[2 * i], payload[2 * i + 1]]));
            }
        }

        #[test]
        fn unrecognized_blocks_never_decode(
            identifier in prop::array::uniform16(any::<u8>()),
            payload in prop::collection::vec(any::<u8>(), 0..64)
        ) {
            prop_assume!(!ServiceIdentity::from_wire(identifier).is_recognized());

            let mut block = identifier.to_vec();
            block.extend_from_slice(&payload);
            prop_assert!(decode(&Advertisement::new("dev", Some(block))).is_none());
        }
    }
}

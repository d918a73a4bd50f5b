//! Raw advertisements as delivered by a scanner

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::{IDENTIFIER_LEN, uuid_to_wire};

/// One advertisement observed from one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Device address (e.g. `C4:7C:8D:6A:10:01`)
    pub address: String,

    /// 128-bit service data block: 16 identifier bytes in wire order, then payload
    #[serde(default, with = "hex_block")]
    pub service_data: Option<Vec<u8>>,
}

impl Advertisement {
    /// Advertisement carrying a raw service data block.
    pub fn new(address: impl Into<String>, service_data: Option<Vec<u8>>) -> Self {
        Self { address: address.into(), service_data }
    }

    /// Rebuild the raw block from an already parsed service UUID and its payload.
    pub fn from_service(address: impl Into<String>, service: &Uuid, payload: &[u8]) -> Self {
        let mut block = Vec::with_capacity(IDENTIFIER_LEN + payload.len());
        block.extend_from_slice(&uuid_to_wire(service));
        block.extend_from_slice(payload);
        Self::new(address, Some(block))
    }

    /// Wire-order identifier, if the block is long enough to carry one.
    pub fn identifier(&self) -> Option<[u8; IDENTIFIER_LEN]> {
        let block = self.service_data.as_deref()?;
        block.get(..IDENTIFIER_LEN)?.try_into().ok()
    }

    /// Payload bytes following the identifier (empty when absent).
    pub fn payload(&self) -> &[u8] {
        self.service_data.as_deref().and_then(|block| block.get(IDENTIFIER_LEN..)).unwrap_or(&[])
    }
}

/// Serde helper storing the service data block as a hex string.
mod hex_block {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(block: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match block {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| {
            let compact: String = t.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
            hex::decode(compact).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

//! Element identifiers.
//!
//! Identifiers arrive as hex strings (typically 256-bit transaction hashes).
//! They are opaque: we only ever hash their decoded bytes, never interpret
//! them as numbers.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Disambiguates the mapping from an element to its prime.
pub type Nonce = u64;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementId(String);

impl ElementId {
    /// Normalize `raw` to bare lowercase hex.
    ///
    /// Strips a leading `0x`, then requires a non-empty, even-length string
    /// of hex digits.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let bare = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let invalid = |reason| Error::InvalidElement {
            value: raw.to_string(),
            reason,
        };
        if bare.is_empty() {
            return Err(invalid("empty"));
        }
        if bare.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits"));
        }
        if !bare.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("not hex"));
        }
        Ok(ElementId(bare.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw bytes this identifier encodes.
    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).expect("validated on construction")
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ElementId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ElementId::new(s)
    }
}

impl TryFrom<String> for ElementId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ElementId::new(&value)
    }
}

impl From<ElementId> for String {
    fn from(id: ElementId) -> String {
        id.0
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
impl Arbitrary for ElementId {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        any::<[u8; 32]>()
            .prop_map(|bytes| ElementId(hex::encode(bytes)))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_prefix_and_case() {
        let id = ElementId::new("0xABcd01").unwrap();
        assert_eq!(id.as_str(), "abcd01");
        assert_eq!(id, ElementId::new("abcd01").unwrap());
        assert_eq!(id.to_bytes(), vec![0xab, 0xcd, 0x01]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(ElementId::new("").is_err());
        assert!(ElementId::new("0x").is_err());
        assert!(ElementId::new("abc").is_err());
        assert!(ElementId::new("zz").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let id: ElementId = serde_json::from_str("\"0xFF\"").unwrap();
        assert_eq!(id.as_str(), "ff");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ff\"");
        assert!(serde_json::from_str::<ElementId>("\"xyz\"").is_err());
    }

    proptest! {
        #[test]
        fn test_hex_round_trip(bytes in prop::collection::vec(any::<u8>(), 1..64)) {
            let id = ElementId::new(&format!("0x{}", hex::encode_upper(&bytes)))?;
            prop_assert_eq!(id.to_bytes(), bytes);
        }
    }
}

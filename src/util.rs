use rug::Integer;

const HEX: i32 = 16;

/// `0x`-prefixed lowercase hex, zero-padded to `width_bytes` and always an
/// even number of digits.
pub fn padded_hex(value: &Integer, width_bytes: usize) -> String {
    let digits = value.to_string_radix(HEX);
    let mut width = std::cmp::max(digits.len(), width_bytes * 2);
    width += width % 2;
    format!("0x{digits:0>width$}")
}

/// Parse hex with or without a `0x` prefix.
pub fn parse_hex(value: &str) -> Option<Integer> {
    let bare = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    Integer::from_str_radix(bare, HEX).ok()
}

/// Serialize a non-negative [`Integer`] as a bare lowercase hex string.
pub mod hex_integer {
    use rug::Integer;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Integer, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&value.to_string_radix(super::HEX))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Integer, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        super::parse_hex(&raw).ok_or_else(|| de::Error::custom(format!("invalid hex {raw:?}")))
    }
}

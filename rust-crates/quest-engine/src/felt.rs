use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};
use std::{
    fmt,
    str::FromStr,
};

/// Opaque 32-byte identifier as emitted by the indexing service.
///
/// Quest ids, task ids and account identities all share this shape. Only
/// equality, hashing and ordering are meaningful; ordering follows the
/// numeric value since the bytes are stored big-endian.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Felt([u8; 32]);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeltError {
    #[error("empty identifier")]
    Empty,
    #[error("identifier `{0}` is wider than 32 bytes")]
    TooWide(String),
    #[error("identifier `{raw}` is not valid hex: {source}")]
    InvalidHex {
        raw: String,
        source: hex::FromHexError,
    },
}

impl Felt {
    pub const ZERO: Felt = Felt([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical lowercase form used for display and as a query filter key.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl From<u128> for Felt {
    fn from(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl FromStr for Felt {
    type Err = FeltError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(FeltError::Empty);
        }
        if digits.len() > 64 {
            return Err(FeltError::TooWide(raw.to_string()));
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes).map_err(|source| {
            FeltError::InvalidHex {
                raw: raw.to_string(),
                source,
            }
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt({self})")
    }
}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeltVisitor;

        impl de::Visitor<'_> for FeltVisitor {
            type Value = Felt;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex string or an unsigned integer")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Felt, E> {
                Felt::from_str(value).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Felt, E> {
                Ok(Felt::from(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Felt, E> {
                u64::try_from(value)
                    .map(Felt::from)
                    .map_err(|_| E::custom(format!("negative identifier {value}")))
            }
        }

        deserializer.deserialize_any(FeltVisitor)
    }
}

//! Git object identifiers, types and headers.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 20]);

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl ObjectId {
    /// Length of the binary form in bytes.
    pub const LEN: usize = 20;

    /// Length of the textual form in hex characters.
    pub const HEX_LEN: usize = 40;

    /// The all-zero id, meaning "absent".
    pub const ZERO: ObjectId = ObjectId([0u8; 20]);

    /// Creates an ObjectId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a 20-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 20] = bytes.try_into().map_err(|_| {
            Error::InvalidObjectId(format!("expected 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Creates an ObjectId from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_hex_bytes(hex.as_bytes())
    }

    /// Creates an ObjectId from UTF-8 encoded hex digits.
    pub fn from_hex_bytes(hex: &[u8]) -> Result<Self> {
        if hex.len() != Self::HEX_LEN {
            return Err(Error::InvalidObjectId(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| Error::InvalidObjectId(format!("{e}: {}", String::from_utf8_lossy(hex))))?;
        Ok(Self(bytes))
    }

    /// Creates an ObjectId from UTF-16 encoded hex digits.
    pub fn from_utf16(hex: &[u16]) -> Result<Self> {
        if hex.len() != Self::HEX_LEN {
            return Err(Error::InvalidObjectId(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut ascii = [0u8; 40];
        for (slot, &unit) in ascii.iter_mut().zip(hex) {
            *slot = u8::try_from(unit)
                .ok()
                .filter(u8::is_ascii_hexdigit)
                .ok_or_else(|| {
                    Error::InvalidObjectId(format!("invalid hex code unit: {unit:#06x}"))
                })?;
        }
        Self::from_hex_bytes(&ascii)
    }

    /// Returns true if `hex` is exactly 40 hex digits.
    pub fn is_valid_hex(hex: &[u8]) -> bool {
        hex.len() == Self::HEX_LEN && hex.iter().all(u8::is_ascii_hexdigit)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first `len` hex characters.
    pub fn to_short_hex(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(Self::HEX_LEN));
        hex
    }

    /// Computes the SHA-1 hash of data with a git object header.
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), data.len());
        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from its git name.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_bytes(s.as_bytes())
    }

    /// Parses an object type from raw bytes as they appear in plumbing output.
    pub fn parse_bytes(s: &[u8]) -> Result<Self> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            _ => Err(Error::UnknownObjectType(
                String::from_utf8_lossy(s).into_owned(),
            )),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, type and size of an object, as reported by a batch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHeader {
    /// The object's id.
    pub id: ObjectId,
    /// The object's type.
    pub object_type: ObjectType,
    /// Payload length in bytes.
    pub size: u64,
}

impl ObjectHeader {
    /// Creates a header.
    pub fn new(id: ObjectId, object_type: ObjectType, size: u64) -> Self {
        Self {
            id,
            object_type,
            size,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: any 40-digit hex string survives decode then encode
        #[test]
        fn test_prop_hex_roundtrip(hex in "[0-9a-fA-F]{40}") {
            let id = ObjectId::from_hex(&hex).unwrap();
            prop_assert_eq!(id.to_hex(), hex.to_ascii_lowercase());
        }

        /// Property: raw bytes survive encode then decode
        #[test]
        fn test_prop_bytes_roundtrip(bytes in any::<[u8; 20]>()) {
            let id = ObjectId::from_bytes(bytes);
            prop_assert_eq!(ObjectId::from_hex(&id.to_hex()).unwrap(), id);
        }
    }
}

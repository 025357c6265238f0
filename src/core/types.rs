//! Core identifiers and type aliases

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Stable 128-bit identifier of a source asset. The nil UUID is the null id.
pub type AssetId = Uuid;

/// Identifier of a scene.
pub type SceneId = Uuid;

/// Content hash of an import artifact. `Hash128::ZERO` means no artifact.
pub type ArtifactId = Hash128;

/// Content hash identifying a dedupe bundle.
pub type BundleId = Hash128;

/// 128-bit content hash (first 16 bytes of a blake3 digest, little endian).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash128(pub u128);

impl Hash128 {
    pub const ZERO: Hash128 = Hash128(0);

    /// Hash a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(bytes);
        Self::from_hasher(&hasher)
    }

    /// Finalize a running blake3 hasher into a 128-bit hash.
    pub fn from_hasher(hasher: &blake3::Hasher) -> Self {
        let digest = hasher.finalize();
        let mut lo = [0u8; 16];
        lo.copy_from_slice(&digest.as_bytes()[0..16]);
        Self(u128::from_le_bytes(lo))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Lowercase 32-digit hex representation.
    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.0)
    }

    /// Parse the representation produced by [`Hash128::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        u128::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for Hash128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash128::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid 128-bit hex hash: {}", s)))
    }
}

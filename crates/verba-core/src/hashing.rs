//! Content addressing for evidence and intents.
//!
//! Every digest is SHA-256, rendered as lowercase hex behind a `0x` marker.
//! The evidence root is computed over the *sorted* set of item digests so
//! that it does not depend on upload order.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Prefix marker carried by every digest string.
pub const DIGEST_PREFIX: &str = "0x";

/// Number of hex characters in a 256-bit digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Canonical all-zero digest used when there is nothing to hash.
pub const ZERO_DIGEST: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Errors from a hashing primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Hashing primitive unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid digest '{0}': expected 0x followed by 64 hex digits")]
    InvalidDigest(String),
}

/// A `0x`-prefixed lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// The all-zero digest.
    pub fn zero() -> Self {
        Self(ZERO_DIGEST.to_string())
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{}{}", DIGEST_PREFIX, hex::encode(bytes)))
    }

    /// Accept an already-rendered digest string, normalizing case.
    ///
    /// Returns `None` unless the value is `0x` followed by exactly 64 hex digits.
    pub fn parse(value: &str) -> Option<Self> {
        let body = value.strip_prefix(DIGEST_PREFIX)?;
        if body.len() != DIGEST_HEX_LEN || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(format!("{}{}", DIGEST_PREFIX, body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex body without the prefix marker.
    pub fn hex(&self) -> &str {
        &self.0[DIGEST_PREFIX.len()..]
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_DIGEST
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value).ok_or(HashError::InvalidDigest(value))
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a content digest was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestKind {
    /// SHA-256 over the raw content.
    Sha256,

    /// Fallback over (name, size, clock). Not usable as a security digest.
    NonCryptographic,
}

/// A content digest together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest {
    pub digest: Digest,
    pub kind: DigestKind,
}

impl ContentDigest {
    pub fn is_cryptographic(&self) -> bool {
        self.kind == DigestKind::Sha256
    }
}

/// A hashing backend. The default backend never fails; the trait exists so
/// callers can run on platforms where the primitive may be missing.
pub trait HashPrimitive: Send + Sync {
    fn sha256(&self, bytes: &[u8]) -> Result<[u8; 32], HashError>;
}

/// SHA-256 from the `sha2` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Primitive;

impl HashPrimitive for Sha256Primitive {
    fn sha256(&self, bytes: &[u8]) -> Result<[u8; 32], HashError> {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(bytes));
        Ok(out)
    }
}

/// SHA-256 digest of a byte blob.
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::from_bytes(&Sha256::digest(bytes))
}

/// SHA-256 digest of a UTF-8 string.
pub fn digest_text(text: &str) -> Digest {
    digest(text.as_bytes())
}

/// Digest an uploaded document, falling back to a non-cryptographic digest
/// when the primitive is unavailable. Never fails.
pub fn digest_content(name: &str, bytes: &[u8], primitive: &dyn HashPrimitive) -> ContentDigest {
    match primitive.sha256(bytes) {
        Ok(raw) => ContentDigest {
            digest: Digest::from_bytes(&raw),
            kind: DigestKind::Sha256,
        },
        Err(e) => {
            let clock = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default();
            tracing::warn!(
                file = name,
                error = %e,
                "Hashing primitive unavailable, using non-cryptographic digest"
            );
            ContentDigest {
                digest: fallback_digest(name, bytes.len() as u64, clock),
                kind: DigestKind::NonCryptographic,
            }
        }
    }
}

/// Deterministic 32-bit string hash of `"<name>-<size>-<clock>"`, left-padded
/// to the full digest width.
pub fn fallback_digest(name: &str, size: u64, clock_nanos: i64) -> Digest {
    let seed = format!("{}-{}-{}", name, size, clock_nanos);
    let mut hash: i32 = 0;
    for unit in seed.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    Digest(format!("{}{:064x}", DIGEST_PREFIX, hash.unsigned_abs()))
}

/// Aggregate digest over a set of item digests.
///
/// Sorted lexicographically, concatenated, then hashed. Empty input yields
/// [`ZERO_DIGEST`].
pub fn aggregate_root<'a, I>(digests: I) -> Digest
where
    I: IntoIterator<Item = &'a Digest>,
{
    let mut sorted: Vec<&str> = digests.into_iter().map(Digest::as_str).collect();
    if sorted.is_empty() {
        return Digest::zero();
    }
    sorted.sort_unstable();
    digest(sorted.concat().as_bytes())
}

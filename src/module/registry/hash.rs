//! Content addressing for module bytes

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::module::traits::ScriptError;

/// SHA-256 digest identifying byte-identical modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw module bytes
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Parse a hex-encoded digest (either case, surrounding whitespace ignored)
    pub fn from_hex(hex_digest: &str) -> Result<Self, ScriptError> {
        let raw = hex::decode(hex_digest.trim()).map_err(|e| {
            ScriptError::MalformedModule(format!("invalid content hash '{}': {}", hex_digest, e))
        })?;
        let digest: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            ScriptError::MalformedModule(format!(
                "content hash must be 32 bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(digest))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

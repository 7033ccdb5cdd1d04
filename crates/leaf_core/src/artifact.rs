//! JSON artifacts on disk and their fingerprints
//!
//! Ensembles and encoder states are plain `serde_json` documents. Every
//! persisted type in this crate serializes struct fields in declaration order
//! and keeps its maps in `BTreeMap`s, so equal values always produce the same
//! bytes. A fingerprint is the BLAKE3 digest of those bytes.

use crate::errors::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Compact JSON bytes of an artifact
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Hex BLAKE3 digest of the artifact's JSON bytes
pub fn fingerprint_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_json_bytes(value)?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = to_json_bytes(value)?;
    fs::write(path, &bytes)?;
    debug!(bytes = bytes.len(), "wrote {}", path.display());
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

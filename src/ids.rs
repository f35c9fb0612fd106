//! Identifier spaces shared by the two stores.
//!
//! The metadata store issues 20-character alphanumeric IDs. Task stores issue
//! 24-character hex IDs (timestamp, per-process random, counter). Incoming
//! identifiers are classified into one of the two spaces before lookup.

use crate::error::{BridgeError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

pub const META_ID_LEN: usize = 20;
pub const STORE_ID_LEN: usize = 24;

/// IDs at or above this length are never metadata IDs.
const META_ID_MAX_LEN: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSpace {
    Metadata,
    Store,
}

/// Generate a new metadata-store ID.
pub fn new_meta_id() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(META_ID_LEN)
        .map(char::from)
        .collect()
}

fn process_unique() -> &'static [u8; 5] {
    static UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
    UNIQUE.get_or_init(|| rand::rng().random())
}

fn next_counter() -> u32 {
    static SEED: OnceLock<u32> = OnceLock::new();
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let seed = *SEED.get_or_init(|| rand::rng().random());
    seed.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed)) & 0x00ff_ffff
}

/// Generate a new task-store ID.
pub fn new_store_id() -> String {
    let secs = chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
    let counter = next_counter();

    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    bytes[4..9].copy_from_slice(process_unique());
    bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);

    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn is_store_id(id: &str) -> bool {
    id.len() == STORE_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decide which store issued `id`.
///
/// The exact store-ID shape is checked first; everything else shorter than
/// 25 characters is treated as a metadata ID.
pub fn classify(id: &str) -> Result<IdSpace> {
    if is_store_id(id) {
        return Ok(IdSpace::Store);
    }

    let plausible = !id.is_empty()
        && id.len() < META_ID_MAX_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

    if plausible {
        Ok(IdSpace::Metadata)
    } else {
        Err(BridgeError::InvalidInput(format!(
            "'{}' is neither a metadata ID nor a task-store ID",
            id
        )))
    }
}

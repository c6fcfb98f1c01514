use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::inventory::normalize::reduce_for_checksum;
use crate::inventory::types::{ChecksumKey, InventoryRecord};

/// SHA-256 over the sorted serial numbers of `items`, as lowercase hex.
///
/// The digest only depends on the multiset of serial numbers: item order and
/// every other field are irrelevant. `items` must be a JSON array.
pub fn compute_checksum(items: &Value) -> Result<String, SyncError> {
    let items = items
        .as_array()
        .ok_or_else(|| SyncError::Validation("Input must be an array".to_string()))?;

    let keys = items.iter().map(reduce_for_checksum).collect();
    checksum_of_keys(keys)
}

/// Same digest as [`compute_checksum`] for already typed records.
pub fn checksum_for_records(records: &[InventoryRecord]) -> Result<String, SyncError> {
    let keys = records
        .iter()
        .map(|record| ChecksumKey {
            serialnumber: record.serialnumber.clone(),
        })
        .collect();
    checksum_of_keys(keys)
}

/// Recompute and compare. Any calculation failure counts as a mismatch.
pub fn verify_checksum(items: &Value, expected: &str) -> bool {
    match compute_checksum(items) {
        Ok(calculated) => {
            let valid = calculated == expected;
            debug!(provided = expected, calculated = %calculated, valid, "Checksum verification");
            valid
        }
        Err(e) => {
            warn!(error = %e, "Checksum verification failed");
            false
        }
    }
}

fn checksum_of_keys(mut keys: Vec<ChecksumKey>) -> Result<String, SyncError> {
    keys.sort();

    // Compact form, identical to JSON.stringify on the server
    let canonical = serde_json::to_string(&keys)?;
    debug!(canonical = %canonical, length = canonical.len(), "Canonical checksum input");

    let digest = Sha256::digest(canonical.as_bytes());
    let checksum = hex::encode(digest);
    debug!(checksum = %checksum, items = keys.len(), "Checksum calculated");
    Ok(checksum)
}

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::error::SyncError;
use crate::inventory::checksum::compute_checksum;
use crate::inventory::types::{
    value_to_string, Batch, BatchMetadata, InventoryRecord, BATCH_FORMAT_VERSION,
};

pub const REQUIRED_FIELDS: [&str; 5] = ["serialnumber", "manufacturer", "model", "ram_gb", "disks"];

pub fn validate_required_fields(item: &Value) -> Result<(), SyncError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| item.get(*field).is_none())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Validate raw items and wrap them into a batch ready for posting.
pub fn prepare_batch(items: &Value, source: &str) -> Result<Batch, SyncError> {
    prepare_batch_at(items, source, Utc::now())
}

pub fn prepare_batch_at(items: &Value, source: &str, now: DateTime<Utc>) -> Result<Batch, SyncError> {
    let raw = items
        .as_array()
        .ok_or_else(|| SyncError::Validation("Input must be an array".to_string()))?;

    for item in raw {
        validate_required_fields(item)?;
    }

    let checksum = compute_checksum(items)?;
    let records: Vec<InventoryRecord> = raw
        .iter()
        .map(|item| {
            serde_json::from_value(item.clone()).map_err(|e| {
                SyncError::Validation(format!(
                    "Item '{}' is malformed: {}",
                    item.get("serialnumber").map(value_to_string).unwrap_or_default(),
                    e
                ))
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(batch_from_records(records, checksum, source, now))
}

pub fn batch_from_records(
    records: Vec<InventoryRecord>,
    checksum: String,
    source: &str,
    now: DateTime<Utc>,
) -> Batch {
    let batch_id = format!("SYNC_{}", now.format("%Y%m%d%H%M%S"));
    info!(batch_id = %batch_id, items = records.len(), checksum = %checksum, "Prepared batch");

    Batch {
        source: source.to_string(),
        timestamp: now,
        batch_id,
        metadata: BatchMetadata {
            total_items: records.len(),
            version: BATCH_FORMAT_VERSION.to_string(),
            checksum,
        },
        items: records,
    }
}

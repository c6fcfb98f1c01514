use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::inventory::types::{
    value_to_f64, value_to_string, ChecksumKey, DiskEntry, InventoryRecord, NormalizedDisk,
    NormalizedRecord,
};

// Column widths of the remote `items` table
const SERIALNUMBER_MAX: usize = 100;
const COMPUTERNAME_MAX: usize = 200;
const MANUFACTURER_MAX: usize = 200;
const MODEL_MAX: usize = 200;
const RESOLUTION_MAX: usize = 100;
const TOUCHSCREEN_MAX: usize = 100;

/// Keep only the serial number, stringified. Missing or null becomes "".
pub fn reduce_for_checksum(record: &Value) -> ChecksumKey {
    ChecksumKey {
        serialnumber: record
            .get("serialnumber")
            .map(value_to_string)
            .unwrap_or_default(),
    }
}

/// Expand raw records into the column layout the inventory table expects,
/// stamping `created_at` with the current time.
pub fn expand_for_transmission(records: &[Value]) -> Result<Vec<NormalizedRecord>, SyncError> {
    expand_for_transmission_at(records, Utc::now())
}

pub fn expand_for_transmission_at(
    records: &[Value],
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedRecord>, SyncError> {
    records
        .iter()
        .map(|record| expand_record(record, now))
        .collect()
}

fn expand_record(record: &Value, now: DateTime<Utc>) -> Result<NormalizedRecord, SyncError> {
    let serialnumber = text_field(record, "serialnumber");

    let ram_gb = match record.get("ram_gb") {
        None | Some(Value::Null) => 0.0,
        Some(value) => value_to_f64(value).ok_or_else(|| {
            SyncError::Validation(format!(
                "ram_gb of item '{}' is not numeric: {}",
                serialnumber, value
            ))
        })?,
    };

    let disks = expand_disks(record.get("disks"));
    debug!(serialnumber = %serialnumber, disks = disks.len(), "Normalized item");

    Ok(NormalizedRecord {
        id: None,
        serialnumber: truncate(&serialnumber, SERIALNUMBER_MAX),
        computername: truncate(&text_field(record, "computername"), COMPUTERNAME_MAX),
        manufacturer: truncate(&text_field(record, "manufacturer"), MANUFACTURER_MAX),
        model: truncate(&text_field(record, "model"), MODEL_MAX),
        systemsku: text_field(record, "systemsku"),
        operatingsystem: text_field(record, "operatingsystem"),
        cpu: text_field(record, "cpu"),
        resolution: truncate(&text_field(record, "resolution"), RESOLUTION_MAX),
        graphicscard: text_field(record, "graphicscard"),
        touchscreen: truncate(
            &record
                .get("touchscreen")
                .map(value_to_string)
                .unwrap_or_else(|| "false".to_string()),
            TOUCHSCREEN_MAX,
        ),
        ram_gb,
        disks,
        created_at: now,
        is_current: match record.get("is_current") {
            None | Some(Value::Null) => true,
            Some(flag) => is_truthy(flag),
        },
    })
}

fn expand_disks(disks: Option<&Value>) -> Vec<NormalizedDisk> {
    let sizes: Vec<f64> = match disks {
        Some(Value::String(s)) => split_disk_string(s)
            .map(|segment| parse_disk_entry(segment).size_gb)
            .collect(),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(s) => parse_disk_entry(s).size_gb,
                Value::Object(obj) => match obj.get("size_gb") {
                    Some(Value::String(s)) => parse_disk_size(s).unwrap_or(0.0),
                    Some(value) => value_to_f64(value).unwrap_or(0.0),
                    None => 0.0,
                },
                _ => 0.0,
            })
            .collect(),
        _ => Vec::new(),
    };

    sizes.into_iter().map(|size_gb| NormalizedDisk { size_gb }).collect()
}

/// Make every numeric field a finite float before it goes on the wire.
/// JSON has no NaN or infinity, so those collapse to zero.
pub fn coerce_numeric_fields(records: &mut [InventoryRecord]) {
    for record in records.iter_mut() {
        record.ram_gb = finite_or_zero(record.ram_gb);
        for disk in record.disks.iter_mut() {
            disk.size_gb = finite_or_zero(disk.size_gb);
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Non-empty, trimmed segments of a comma separated disk string.
pub fn split_disk_string(disks: &str) -> impl Iterator<Item = &str> {
    disks.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse one `type:size:model` segment. Anything malformed degrades to a
/// zero-size placeholder.
pub fn parse_disk_entry(segment: &str) -> DiskEntry {
    let parts: Vec<&str> = segment.trim().split(':').collect();
    if parts.len() != 3 {
        warn!(segment, "Disk segment is not type:size:model, using placeholder");
        return DiskEntry::placeholder();
    }

    match parse_disk_size(parts[1]) {
        Some(size_gb) => DiskEntry {
            size_gb,
            disk_type: parts[0].trim().to_string(),
            model: parts[2].trim().to_string(),
        },
        None => {
            warn!(segment, "Disk size is not parseable, using placeholder");
            DiskEntry::placeholder()
        }
    }
}

/// Parse sizes like "512GB", "1TB" or "256" into gigabytes (1TB = 1000GB).
pub fn parse_disk_size(size: &str) -> Option<f64> {
    let size = size.trim().to_uppercase();

    let (number, multiplier) = if let Some(n) = size.strip_suffix("TB") {
        (n, 1000.0)
    } else if let Some(n) = size.strip_suffix("GB") {
        (n, 1.0)
    } else {
        (size.as_str(), 1.0)
    };

    let num: f64 = number.trim().parse().ok()?;
    if !num.is_finite() || num < 0.0 {
        return None;
    }
    Some(num * multiplier)
}

fn text_field(record: &Value, key: &str) -> String {
    record.get(key).map(value_to_string).unwrap_or_default()
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Loose JSON truthiness: null, false, zero and empty values are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

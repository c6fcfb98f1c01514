use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inventory::normalize::{is_truthy, parse_disk_entry, parse_disk_size, split_disk_string};

/// Format version stamped into every batch's metadata.
pub const BATCH_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    #[serde(deserialize_with = "de_string")]
    pub serialnumber: String,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub computername: Option<String>,
    #[serde(deserialize_with = "de_string")]
    pub manufacturer: String,
    #[serde(deserialize_with = "de_string")]
    pub model: String,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub systemsku: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub operatingsystem: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub graphicscard: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub touchscreen: Option<String>,
    #[serde(deserialize_with = "de_f64")]
    pub ram_gb: f64,
    #[serde(deserialize_with = "de_disks")]
    pub disks: Vec<DiskEntry>,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_is_current", deserialize_with = "de_is_current")]
    pub is_current: bool,

    // Caller supplied fields passed through untouched (battery, outbound_status, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskEntry {
    #[serde(default, deserialize_with = "de_disk_size")]
    pub size_gb: f64,
    #[serde(rename = "type", default, deserialize_with = "de_string", skip_serializing_if = "String::is_empty")]
    pub disk_type: String,
    #[serde(default, deserialize_with = "de_string", skip_serializing_if = "String::is_empty")]
    pub model: String,
}

impl DiskEntry {
    /// Stand-in for a disk description that could not be parsed.
    pub fn placeholder() -> Self {
        DiskEntry {
            size_gb: 0.0,
            disk_type: String::new(),
            model: String::new(),
        }
    }
}

/// Identity subset of a record; the only thing the checksum covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ChecksumKey {
    pub serialnumber: String,
}

/// Record laid out column for column like the remote `items` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub id: Option<i64>,              // assigned by the server
    pub serialnumber: String,         // varchar(100)
    pub computername: String,         // varchar(200)
    pub manufacturer: String,         // varchar(200)
    pub model: String,                // varchar(200)
    pub systemsku: String,            // text
    pub operatingsystem: String,      // text
    pub cpu: String,                  // text
    pub resolution: String,           // varchar(100)
    pub graphicscard: String,         // text
    pub touchscreen: String,          // varchar(100)
    pub ram_gb: f64,                  // numeric
    pub disks: Vec<NormalizedDisk>,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDisk {
    pub size_gb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub batch_id: String,
    pub items: Vec<InventoryRecord>,
    pub metadata: BatchMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchMetadata {
    pub total_items: usize,
    pub version: String,
    pub checksum: String,
}

/// Server-side processing log entry for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStatus {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub processed_count: Option<u64>,
    #[serde(default)]
    pub error_count: Option<u64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_is_current() -> bool {
    true
}

/// Render a scalar JSON value the way the remote service stringifies it.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => Ok(Some(value_to_string(&value))),
    }
}

fn de_is_current<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(true),
        value => Ok(is_truthy(&value)),
    }
}

/// RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC); anything else is dropped.
fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Some(text) = value.as_str().map(str::trim) else {
        return Ok(None);
    };

    Ok(DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .ok())
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value).ok_or_else(|| de::Error::custom(format!("expected a number, got {}", value)))
}

/// Numbers and numeric strings become f64; anything else is rejected.
pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn de_disk_size<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let size = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_disk_size(s),
        _ => None,
    };
    Ok(size.unwrap_or(0.0))
}

fn de_disks<'de, D>(deserializer: D) -> Result<Vec<DiskEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split_disk_string(&s).map(parse_disk_entry).collect()),
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(s) => Ok(parse_disk_entry(&s)),
                Value::Object(_) => serde_json::from_value(entry).map_err(de::Error::custom),
                _ => Ok(DiskEntry::placeholder()),
            })
            .collect(),
        other => Err(de::Error::custom(format!("unsupported disks value: {}", other))),
    }
}

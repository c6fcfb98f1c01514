use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::inventory::{
    collect_local_record, compute_checksum, expand_for_transmission, verify_checksum,
};
use crate::output::{output_data, print_error, print_success};

/// Read an item array from `path`. A whole batch document is accepted too,
/// in which case its `items` are used.
pub fn read_items(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| format!("{} is not valid JSON: {}", path.display(), e))?;

    match value {
        Value::Object(mut map) if map.contains_key("items") => {
            Ok(map.remove("items").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

pub fn handle_checksum(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let items = read_items(file)?;
    let checksum = compute_checksum(&items)?;
    println!("{}", checksum);
    Ok(())
}

pub fn handle_verify(file: &Path, expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let items = read_items(file)?;
    if verify_checksum(&items, expected) {
        print_success("Checksum matches");
        Ok(())
    } else {
        let calculated = compute_checksum(&items)?;
        print_error(&format!("Expected:   {}", expected));
        print_error(&format!("Calculated: {}", calculated));
        Err("Checksum validation failed".into())
    }
}

pub fn handle_normalize(file: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let items = read_items(file)?;
    let records = items
        .as_array()
        .ok_or("Input must be an array")?;
    let normalized = expand_for_transmission(records)?;
    output_data(&normalized, format)?;
    Ok(())
}

pub fn handle_collect(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = collect_local_record();
    output_data(&record, format)?;
    Ok(())
}

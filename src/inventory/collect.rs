use std::collections::HashSet;
use std::fs;

use chrono::Utc;
use serde_json::Map;
use smbioslib::*;
use sysinfo::{DiskKind, Disks, System};
use tracing::{debug, warn};

use crate::inventory::types::{DiskEntry, InventoryRecord};

const DMI_TABLE_PATH: &str = "/sys/firmware/dmi/tables/DMI";
const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// System identity as reported by the firmware.
#[derive(Debug, Default, Clone)]
pub struct DmiSystem {
    pub manufacturer: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub sku_number: Option<String>,
}

/// What the operating system knows about this host.
#[derive(Debug, Default, Clone)]
pub struct HostFacts {
    pub hostname: Option<String>,
    pub os_version: Option<String>,
    pub cpu_brand: Option<String>,
    pub total_memory_bytes: u64,
    pub disks: Vec<DiskEntry>,
}

/// Build an inventory record describing the machine we are running on.
pub fn collect_local_record() -> InventoryRecord {
    let dmi = collect_dmi_system();
    let host = collect_host_facts();
    build_record(dmi, host)
}

pub fn build_record(dmi: DmiSystem, host: HostFacts) -> InventoryRecord {
    let serialnumber = dmi.serial_number.unwrap_or_default();
    if serialnumber.is_empty() {
        warn!("No system serial number found in SMBIOS; record will not be uniquely identifiable");
    }

    InventoryRecord {
        serialnumber,
        computername: host.hostname,
        manufacturer: dmi.manufacturer.unwrap_or_default(),
        model: dmi.product_name.unwrap_or_default(),
        systemsku: dmi.sku_number,
        operatingsystem: host.os_version,
        cpu: host.cpu_brand.map(|brand| brand.trim().to_string()),
        resolution: None,
        graphicscard: None,
        touchscreen: None,
        ram_gb: (host.total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0)).round(),
        disks: host.disks,
        created_at: Some(Utc::now()),
        is_current: true,
        extra: Map::new(),
    }
}

fn collect_dmi_system() -> DmiSystem {
    // Try to load SMBIOS data from the system
    let smbios_data = match SMBiosData::try_load_from_file(DMI_TABLE_PATH, None) {
        Ok(data) => data,
        Err(_) => match fs::read(DMI_TABLE_PATH) {
            Ok(table_data) => SMBiosData::from_vec_and_version(table_data, None),
            Err(e) => {
                warn!(error = %e, "SMBIOS table not readable");
                return DmiSystem::default();
            }
        },
    };

    for structure in smbios_data.iter() {
        if let DefinedStruct::SystemInformation(system_struct) = structure.defined_struct() {
            let dmi = DmiSystem {
                manufacturer: clean_dmi_string(system_struct.manufacturer().to_utf8_lossy()),
                product_name: clean_dmi_string(system_struct.product_name().to_utf8_lossy()),
                serial_number: clean_dmi_string(system_struct.serial_number().to_utf8_lossy()),
                sku_number: clean_dmi_string(system_struct.sku_number().to_utf8_lossy()),
            };
            debug!(?dmi, "SMBIOS system information");
            return dmi;
        }
    }

    DmiSystem::default()
}

/// Drop empty and vendor placeholder strings.
fn clean_dmi_string<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    value
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| {
            !s.is_empty()
                && s != "Not Specified"
                && s != "Not Available"
                && s != "To Be Filled By O.E.M."
                && s != "Default string"
        })
}

fn collect_host_facts() -> HostFacts {
    let sys = System::new_all();

    let mut seen = HashSet::new();
    let disks = Disks::new_with_refreshed_list()
        .list()
        .iter()
        // One device may be mounted more than once
        .filter(|disk| seen.insert(disk.name().to_os_string()))
        .map(|disk| DiskEntry {
            size_gb: (disk.total_space() as f64 / BYTES_PER_GB).round(),
            disk_type: disk_kind_label(disk.kind()).to_string(),
            model: disk.name().to_string_lossy().into_owned(),
        })
        .collect();

    HostFacts {
        hostname: System::host_name(),
        os_version: System::long_os_version(),
        cpu_brand: sys.cpus().first().map(|cpu| cpu.brand().to_string()),
        total_memory_bytes: sys.total_memory(),
        disks,
    }
}

fn disk_kind_label(kind: DiskKind) -> &'static str {
    match kind {
        DiskKind::SSD => "SSD",
        DiskKind::HDD => "HDD",
        DiskKind::Unknown(_) => "",
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use slicer_core::host::object::{load_object_file, region_counts};
use slicer_core::model::{ArchInfo, MemoryRegion, RegionKind};
use slicer_core::recovery::regions::{is_read_only_data_section, is_read_only_segment};

use crate::commands::print_json;

#[derive(Serialize)]
pub struct RegionRow {
    #[serde(flatten)]
    pub region: MemoryRegion,
    pub read_only: bool,
}

#[derive(Serialize)]
pub struct RegionReport {
    pub binary: String,
    pub arch: Option<ArchInfo>,
    pub regions: Vec<RegionRow>,
}

/// Load an object file and list its segments and sections, marking the
/// read-only working set used by recovery.
pub fn regions_command(binary: &str, json: bool) -> Result<()> {
    let path = Path::new(binary);
    let image = load_object_file(path)
        .with_context(|| format!("Failed to load object file {}", path.display()))?;
    let (segment_count, section_count) = region_counts(&image);

    let rows: Vec<RegionRow> = image
        .regions()
        .into_iter()
        .map(|region| {
            let read_only = match region.kind {
                RegionKind::Segment => is_read_only_segment(&region),
                RegionKind::Section => is_read_only_data_section(&region),
            };
            RegionRow { region, read_only }
        })
        .collect();

    if json {
        return print_json(&RegionReport {
            binary: path.display().to_string(),
            arch: image.arch,
            regions: rows,
        });
    }

    println!("Binary: {}", path.display());
    match &image.arch {
        Some(arch) => println!(
            "Arch: {} ({}-byte addresses, {:?} endian)",
            arch.name, arch.address_size, arch.endianness
        ),
        None => println!("Arch: (unknown)"),
    }
    println!("Segments: {segment_count}, sections: {section_count}");
    for row in &rows {
        let region = &row.region;
        let perms = format!(
            "{}{}{}",
            if region.readable { 'r' } else { '-' },
            if region.writable { 'w' } else { '-' },
            if region.executable { 'x' } else { '-' },
        );
        let kind = match region.kind {
            RegionKind::Segment => "segment",
            RegionKind::Section => "section",
        };
        println!(
            "- {kind:<7} 0x{:08X}-0x{:08X} {perms} {:<16} {}",
            region.start,
            region.end,
            region.name.as_deref().unwrap_or(""),
            if row.read_only { "read-only" } else { "" },
        );
    }

    Ok(())
}

use std::collections::BTreeMap;

use log::debug;

use crate::host::TypeDatabase;
use crate::model::{DataKind, DataType, DataVariable, PointerCandidate};
use crate::recovery::regions::ReadOnlyRegions;

/// Typed pointers whose stored value lands in the read-only working set.
///
/// At most one candidate is produced per source address, however many regions
/// cover the target. Output is ordered by source address.
pub fn scan_pointer_candidates<T: TypeDatabase + ?Sized>(
    types: &T,
    regions: &ReadOnlyRegions,
    default_pointer_width: u64,
) -> Vec<PointerCandidate> {
    let mut by_source: BTreeMap<u64, PointerCandidate> = BTreeMap::new();
    for var in types.data_vars() {
        let Some(candidate) = pointer_candidate(&var, regions, default_pointer_width) else {
            continue;
        };
        debug!(
            "Found pointer var at 0x{:X} pointing to 0x{:X}",
            candidate.source, candidate.pointee
        );
        by_source.entry(candidate.source).or_insert(candidate);
    }
    by_source.into_values().collect()
}

fn pointer_candidate(
    var: &DataVariable,
    regions: &ReadOnlyRegions,
    default_pointer_width: u64,
) -> Option<PointerCandidate> {
    match var.kind() {
        DataKind::Pointer => {}
        DataKind::Integer | DataKind::Array | DataKind::Struct | DataKind::Other => return None,
    }
    let pointee = var.value?;
    if !regions.contains(pointee) {
        return None;
    }
    let pointer_width = match &var.ty {
        DataType::Pointer { width, .. } if *width > 0 => *width,
        _ => default_pointer_width,
    };
    Some(PointerCandidate { source: var.address, pointer_width, pointee })
}

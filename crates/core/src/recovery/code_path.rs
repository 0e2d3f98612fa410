//! Length inference for byte arrays from the code that loads their address.
//!
//! Weaker than the data path: a single candidate per array, no bounds check,
//! no UTF-8 check, no slice type. The first constant operand following the
//! address load within the same basic block is taken as the length, even when
//! it is assigned to an unrelated variable.

use log::debug;

use crate::host::{IrView, TypeDatabase};
use crate::model::{CrossReference, DataKind, DataType, DataVariable};
use crate::recovery::regions::ReadOnlyRegions;

/// Byte arrays located in the read-only working set, ordered by address.
pub fn byte_array_candidates<T: TypeDatabase + ?Sized>(
    types: &T,
    regions: &ReadOnlyRegions,
) -> Vec<DataVariable> {
    types
        .data_vars()
        .into_iter()
        .filter(|var| match var.kind() {
            DataKind::Array => is_byte_array(&var.ty) && regions.contains(var.address),
            DataKind::Pointer | DataKind::Integer | DataKind::Struct | DataKind::Other => false,
        })
        .inspect(|var| debug!("Found char array var at 0x{:X} ({:?})", var.address, var.ty))
        .collect()
}

fn is_byte_array(ty: &DataType) -> bool {
    matches!(ty, DataType::Array { element, .. } if element.width() == Some(1))
}

/// Current element count of an array declaration.
pub fn array_length(ty: &DataType) -> Option<u64> {
    match ty {
        DataType::Array { count, .. } => Some(*count),
        _ => None,
    }
}

/// Scan forward from the referencing instruction for the first constant operand.
///
/// Only assignments of the data address into a variable (or a field of one) are
/// followed, and the scan never leaves the instruction's basic block. A zero
/// constant is not a usable length and counts as no match.
pub fn length_from_reference<I: IrView + ?Sized>(ir: &I, xref: &CrossReference) -> Option<u64> {
    let instr = ir.instruction_at(xref.code_address)?;
    if !instr.operation.is_assignment() {
        debug!(
            "Reference at 0x{:X} is a {:?}, not an address load",
            xref.code_address, instr.operation
        );
        return None;
    }

    let block = ir.basic_block_at(xref.code_address)?;
    let (found_at, length) = block
        .after(instr.index)
        .find_map(|next| next.first_constant().map(|value| (next.address, value)))?;
    debug!(
        "Reference to 0x{:X} at 0x{:X} is followed by constant 0x{:X} at 0x{:X}",
        xref.data_address, xref.code_address, length, found_at
    );
    (length > 0).then_some(length)
}

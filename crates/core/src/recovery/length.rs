use log::debug;

use crate::host::{MemoryModel, TypeDatabase};
use crate::model::{ArchInfo, DataKind, LengthFieldCandidate, PointerCandidate};
use crate::recovery::RejectReason;

/// Read the word that follows `candidate` as a slice length.
///
/// A non-integer declaration already present at the length address rejects the
/// candidate before anything is read. No bounds checks happen here.
pub fn resolve_length<H: MemoryModel + TypeDatabase + ?Sized>(
    host: &H,
    candidate: &PointerCandidate,
    arch: &ArchInfo,
) -> Result<LengthFieldCandidate, RejectReason> {
    let address = candidate.length_field_address();

    if let Some(existing) = host.data_var_at(address) {
        match existing.kind() {
            DataKind::Integer => {}
            kind @ (DataKind::Pointer | DataKind::Array | DataKind::Struct | DataKind::Other) => {
                debug!(
                    "Length field 0x{:X} for pointer 0x{:X} is already typed as {:?}",
                    address, candidate.source, kind
                );
                return Err(RejectReason::ConflictingType { address, kind });
            }
        }
    }

    let width = arch.address_size;
    let value = host
        .read_uint(address, width, arch.endianness)
        .map_err(|_| RejectReason::ReadFailure { address, length: width as u64 })?;

    debug!(
        "Pointer var at 0x{:X} is followed by integer with value 0x{:X}",
        candidate.source, value
    );
    Ok(LengthFieldCandidate { address, value, width, endianness: arch.endianness })
}

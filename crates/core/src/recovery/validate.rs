use log::{debug, info, warn};

use crate::host::MemoryModel;
use crate::model::{LengthFieldCandidate, PointerCandidate, StringSliceRecord};
use crate::recovery::RejectReason;

/// Bounds-check the length, read the bytes and require strict UTF-8.
///
/// Accepted lengths satisfy `0 < length < max_length`. Every failure is local
/// to this candidate.
pub fn validate_slice<M: MemoryModel + ?Sized>(
    memory: &M,
    candidate: &PointerCandidate,
    length: &LengthFieldCandidate,
    max_length: u64,
) -> Result<StringSliceRecord, RejectReason> {
    let len = length.value;
    if len == 0 {
        return Err(RejectReason::ZeroLength);
    }
    if len >= max_length {
        return Err(RejectReason::TooLong { length: len, limit: max_length });
    }

    let bytes = memory.read(candidate.pointee, len).map_err(|err| {
        warn!(
            "Failed to read from address 0x{:X} with length 0x{:X}: {}",
            candidate.pointee, len, err
        );
        RejectReason::ReadFailure { address: candidate.pointee, length: len }
    })?;
    debug!(
        "Obtained candidate string slice with addr 0x{:X}, len 0x{:X}: {:?}",
        candidate.pointee, len, bytes
    );

    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(err) => {
            warn!(
                "Candidate string slice {:?} does not decode to valid UTF-8; excluding: {}",
                bytes, err
            );
            return Err(RejectReason::DecodeFailure { valid_up_to: err.valid_up_to() });
        }
    };

    info!("Recovered string at addr 0x{:X}, len 0x{:X}: {:?}", candidate.pointee, len, text);
    Ok(StringSliceRecord {
        pointer_address: candidate.source,
        data_address: candidate.pointee,
        length: len,
        bytes,
        text,
    })
}

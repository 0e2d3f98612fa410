//! Collaborator interfaces owned by the binary-analysis host.
//!
//! The recovery pipeline never touches ambient state: every read and write goes
//! through one of these traits on an explicit handle. `SnapshotHost` is the
//! in-memory implementation used by the CLI and the test-suite.

#[cfg(feature = "object-loader")]
pub mod object;
pub mod snapshot;

use thiserror::Error;

use crate::model::{
    ArchInfo, CrossReference, DataType, DataVariable, Endianness, IrBasicBlock, IrInstruction,
    MemoryRegion, StructType,
};

pub use snapshot::{Annotations, SegmentImage, Snapshot, SnapshotHost};

/// Failure reported by a host collaborator.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("address range 0x{address:X}+0x{length:X} is not backed by any segment")]
    Unmapped { address: u64, length: u64 },

    #[error("unsupported integer width {0}")]
    UnsupportedWidth(usize),

    #[error("unknown named type '{0}'")]
    UnknownType(String),

    #[error("no data variable at 0x{0:X}")]
    NoVariable(u64),

    #[error("type at 0x{address:X} has no known width")]
    UnsizedType { address: u64 },

    #[error("edit transaction error: {0}")]
    Transaction(String),

    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("failed to parse snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load object file: {0}")]
    Object(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Memory layout and raw contents of the loaded binary.
pub trait MemoryModel {
    /// Architecture facts; `None` when the host could not determine the architecture.
    fn arch(&self) -> Option<ArchInfo>;

    fn segments(&self) -> Vec<MemoryRegion>;

    fn sections(&self) -> Vec<MemoryRegion>;

    /// Read exactly `length` bytes at `address`.
    ///
    /// The range may run across contiguous segments; any unmapped byte fails
    /// the whole read.
    fn read(&self, address: u64, length: u64) -> Result<Vec<u8>, HostError>;

    /// Read an unsigned integer of `width` bytes (1..=8) at `address`.
    fn read_uint(
        &self,
        address: u64,
        width: usize,
        endianness: Endianness,
    ) -> Result<u64, HostError> {
        if width == 0 || width > 8 {
            return Err(HostError::UnsupportedWidth(width));
        }
        let bytes = self.read(address, width as u64)?;
        if bytes.len() != width {
            return Err(HostError::Unmapped { address, length: width as u64 });
        }
        let mut buf = [0u8; 8];
        Ok(match endianness {
            Endianness::Little => {
                buf[..width].copy_from_slice(&bytes);
                u64::from_le_bytes(buf)
            }
            Endianness::Big => {
                buf[8 - width..].copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            }
        })
    }
}

/// Typed data locations and named types.
pub trait TypeDatabase {
    /// Every typed data location, ordered by address.
    fn data_vars(&self) -> Vec<DataVariable>;

    /// The data location starting exactly at `address`, if any.
    fn data_var_at(&self, address: u64) -> Option<DataVariable>;

    /// Declare `ty` at `address`. Overlapping declarations are resolved by the host.
    fn define_data_var(
        &mut self,
        address: u64,
        ty: DataType,
        name: Option<String>,
    ) -> Result<(), HostError>;

    fn undefine_data_var(&mut self, address: u64) -> Result<(), HostError>;

    fn type_exists(&self, name: &str) -> bool;

    fn define_named_type(&mut self, name: &str, definition: StructType) -> Result<(), HostError>;
}

pub trait CrossReferenceIndex {
    /// Code locations referencing `data_address`.
    fn code_refs(&self, data_address: u64) -> Vec<CrossReference>;
}

pub trait IrView {
    /// Decoded instruction at a code location.
    fn instruction_at(&self, code_address: u64) -> Option<IrInstruction>;

    /// Basic block enclosing the instruction at a code location.
    fn basic_block_at(&self, code_address: u64) -> Option<IrBasicBlock>;
}

/// Reversible batching of annotation edits.
pub trait EditTransaction {
    fn begin_edit(&mut self) -> Result<(), HostError>;

    fn commit_edit(&mut self) -> Result<(), HostError>;

    /// Roll back every edit made since `begin_edit`.
    fn revert_edit(&mut self) -> Result<(), HostError>;

    /// Ask the host to re-run analysis so dependent references pick up new types.
    fn update_analysis(&mut self);
}

/// Everything a recovery run needs from the host.
pub trait AnalysisHost:
    MemoryModel + TypeDatabase + CrossReferenceIndex + IrView + EditTransaction
{
}

impl<T> AnalysisHost for T where
    T: MemoryModel + TypeDatabase + CrossReferenceIndex + IrView + EditTransaction
{
}

//! Core data model for memory regions, typed data locations, and recovered slices.
//!
//! Everything here is plain data. Host facts (`MemoryRegion`, `DataVariable`,
//! `CrossReference`, IR) are produced by a collaborator and read-only to the
//! recovery pipeline; candidates and `StringSliceRecord`s are ephemeral values
//! produced and consumed within one run.

pub mod ir;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ir::{IrBasicBlock, IrInstruction, IrOperand, IrOperation, OperandKind};

/// Byte order of the target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

/// Architecture facts reported by the memory model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchInfo {
    /// Human-readable architecture name (e.g., x86_64, arm64).
    pub name: String,
    /// Native word width in bytes. Slice lengths are read with this width.
    pub address_size: usize,
    /// Width of a data pointer in bytes.
    pub pointer_width: usize,
    pub endianness: Endianness,
    /// Width of the default `int` for the architecture.
    pub default_int_size: usize,
}

impl ArchInfo {
    /// Convenience constructor for the common case where pointers are word sized.
    pub fn new(name: impl Into<String>, address_size: usize, endianness: Endianness) -> Self {
        Self {
            name: name.into(),
            address_size,
            pointer_width: address_size,
            endianness,
            default_int_size: 4,
        }
    }
}

/// Whether a region came from the segment list or the section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    #[default]
    Segment,
    Section,
}

/// Semantic tag a host attaches to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSemantics {
    #[default]
    Default,
    ReadOnlyCode,
    ReadOnlyData,
    ReadWriteData,
    External,
}

/// Error raised when a region would violate the half-open, non-empty invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("empty or inverted region 0x{start:X}..0x{end:X}")]
pub struct InvalidRegion {
    pub start: u64,
    pub end: u64,
}

/// A segment or section of the loaded binary's address space.
///
/// The range is the half-open interval `start..end` and is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub kind: RegionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub executable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantics: Option<SectionSemantics>,
}

impl MemoryRegion {
    /// Build a segment with the given permissions.
    pub fn segment(
        start: u64,
        end: u64,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Result<Self, InvalidRegion> {
        let region = Self {
            start,
            end,
            kind: RegionKind::Segment,
            name: None,
            readable,
            writable,
            executable,
            semantics: None,
        };
        region.validate()?;
        Ok(region)
    }

    /// Build a named section carrying a semantic tag.
    pub fn section(
        name: impl Into<String>,
        start: u64,
        end: u64,
        semantics: SectionSemantics,
    ) -> Result<Self, InvalidRegion> {
        let region = Self {
            start,
            end,
            kind: RegionKind::Section,
            name: Some(name.into()),
            readable: true,
            writable: semantics == SectionSemantics::ReadWriteData,
            executable: semantics == SectionSemantics::ReadOnlyCode,
            semantics: Some(semantics),
        };
        region.validate()?;
        Ok(region)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the non-empty half-open interval invariant.
    pub fn validate(&self) -> Result<(), InvalidRegion> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(InvalidRegion { start: self.start, end: self.end })
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closed classification of a declared data type, matched exhaustively by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Pointer,
    Integer,
    Array,
    Struct,
    Other,
}

/// Declared type of a data location in the host's type database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataType {
    Pointer {
        width: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Box<DataType>>,
    },
    Integer {
        width: u64,
        #[serde(default)]
        signed: bool,
    },
    Char,
    Array {
        element: Box<DataType>,
        count: u64,
    },
    /// Instance of a named composite type registered with the type database.
    Named {
        name: String,
    },
    Opaque {
        width: u64,
    },
}

impl DataType {
    pub fn kind(&self) -> DataKind {
        match self {
            DataType::Pointer { .. } => DataKind::Pointer,
            DataType::Integer { .. } | DataType::Char => DataKind::Integer,
            DataType::Array { .. } => DataKind::Array,
            DataType::Named { .. } => DataKind::Struct,
            DataType::Opaque { .. } => DataKind::Other,
        }
    }

    pub fn pointer_to(target: DataType, width: u64) -> Self {
        DataType::Pointer { width, target: Some(Box::new(target)) }
    }

    pub fn unsigned(width: u64) -> Self {
        DataType::Integer { width, signed: false }
    }

    /// `char[count]`.
    pub fn char_array(count: u64) -> Self {
        DataType::Array { element: Box::new(DataType::Char), count }
    }

    pub fn named(name: impl Into<String>) -> Self {
        DataType::Named { name: name.into() }
    }

    /// Width in bytes, or `None` for named types whose layout lives in the type database.
    pub fn width(&self) -> Option<u64> {
        match self {
            DataType::Pointer { width, .. }
            | DataType::Integer { width, .. }
            | DataType::Opaque { width } => Some(*width),
            DataType::Char => Some(1),
            DataType::Array { element, count } => element.width().map(|w| w.saturating_mul(*count)),
            DataType::Named { .. } => None,
        }
    }
}

/// One field of a named composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: DataType,
}

/// Named composite type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(default)]
    pub packed: bool,
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn packed(fields: Vec<StructField>) -> Self {
        Self { packed: true, fields }
    }
}

/// Typed data location as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVariable {
    pub address: u64,
    #[serde(rename = "type")]
    pub ty: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stored pointer value for pointer-typed locations, when readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

impl DataVariable {
    pub fn kind(&self) -> DataKind {
        self.ty.kind()
    }
}

/// Code location referencing a data address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossReference {
    pub code_address: u64,
    pub data_address: u64,
}

/// Typed pointer whose stored value lands in the read-only working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerCandidate {
    pub source: u64,
    pub pointer_width: u64,
    pub pointee: u64,
}

impl PointerCandidate {
    /// Address of the length field that immediately follows the pointer.
    pub fn length_field_address(&self) -> u64 {
        self.source.wrapping_add(self.pointer_width)
    }
}

/// Integer read from the word following a pointer candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthFieldCandidate {
    pub address: u64,
    pub value: u64,
    pub width: usize,
    pub endianness: Endianness,
}

/// Validated string slice ready for annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringSliceRecord {
    /// Address of the (pointer, length) pair.
    pub pointer_address: u64,
    /// Address of the string bytes.
    pub data_address: u64,
    pub length: u64,
    pub bytes: Vec<u8>,
    pub text: String,
}

/// Array size rewrite produced by the code-path heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayResize {
    pub address: u64,
    pub code_address: u64,
    pub previous_length: Option<u64>,
    pub length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_is_rejected() {
        assert!(MemoryRegion::segment(0x10, 0x10, true, false, false).is_err());
        assert!(MemoryRegion::section(".rodata", 0x20, 0x10, SectionSemantics::ReadOnlyData)
            .is_err());
    }

    #[test]
    fn region_contains_is_half_open() {
        let region = MemoryRegion::segment(0x1000, 0x1064, true, false, false).unwrap();
        assert!(region.contains(0x1000));
        assert!(region.contains(0x1063));
        assert!(!region.contains(0x1064));
    }

    #[test]
    fn char_maps_to_integer_kind() {
        assert_eq!(DataType::Char.kind(), DataKind::Integer);
        assert_eq!(DataType::named("RustStringSlice").kind(), DataKind::Struct);
        assert_eq!(DataType::char_array(5).width(), Some(5));
    }
}

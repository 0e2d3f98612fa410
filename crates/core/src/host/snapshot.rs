use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::host::{
    CrossReferenceIndex, EditTransaction, HostError, IrView, MemoryModel, TypeDatabase,
};
use crate::model::{
    ArchInfo, CrossReference, DataType, DataVariable, IrBasicBlock, IrInstruction, MemoryRegion,
    RegionKind, StructType,
};

/// Nesting limit when resolving widths of named types that contain named types.
const MAX_TYPE_DEPTH: usize = 16;

/// A segment together with the bytes backing it, starting at `region.start`.
///
/// `bytes` may be shorter than the region; the unbacked tail reads as zeros,
/// like `.bss`. Bytes beyond the region's end are never served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentImage {
    #[serde(flatten)]
    pub region: MemoryRegion,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl SegmentImage {
    /// `length` bytes at `address`, all inside this segment.
    fn slice(&self, address: u64, length: u64) -> Option<Vec<u8>> {
        if !self.region.contains(address) {
            return None;
        }
        let offset = address - self.region.start;
        let end = offset.checked_add(length)?;
        if end > self.region.len() {
            return None;
        }
        let offset = usize::try_from(offset).ok()?;
        let end = usize::try_from(end).ok()?;

        let backed_end = end.min(self.bytes.len());
        let mut out = self.bytes.get(offset..backed_end).unwrap_or_default().to_vec();
        out.resize(end - offset, 0);
        Some(out)
    }
}

/// Serializable analysis snapshot: the on-disk form of a `SnapshotHost`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<ArchInfo>,
    #[serde(default)]
    pub segments: Vec<SegmentImage>,
    #[serde(default)]
    pub sections: Vec<MemoryRegion>,
    #[serde(default)]
    pub types: BTreeMap<String, StructType>,
    #[serde(default)]
    pub data_vars: Vec<DataVariable>,
    #[serde(default)]
    pub code_refs: Vec<CrossReference>,
    #[serde(default)]
    pub blocks: Vec<IrBasicBlock>,
}

/// Type-database contents exported after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    pub types: BTreeMap<String, StructType>,
    pub data_vars: Vec<DataVariable>,
}

#[derive(Debug, Clone)]
enum Edit {
    VarAdded(u64),
    VarRemoved(DataVariable),
    TypeSet { name: String, previous: Option<StructType> },
}

/// In-memory analysis host.
///
/// Mutations made between `begin_edit` and `commit_edit` are journaled; each
/// committed batch can be reverted as a single unit with [`SnapshotHost::undo`].
#[derive(Debug, Default)]
pub struct SnapshotHost {
    arch: Option<ArchInfo>,
    segments: Vec<SegmentImage>,
    sections: Vec<MemoryRegion>,
    types: BTreeMap<String, StructType>,
    vars: BTreeMap<u64, DataVariable>,
    code_refs: Vec<CrossReference>,
    blocks: Vec<IrBasicBlock>,
    open_batch: Option<Vec<Edit>>,
    history: Vec<Vec<Edit>>,
    analysis_requests: usize,
}

impl SnapshotHost {
    pub fn new(arch: Option<ArchInfo>) -> Self {
        Self { arch, ..Self::default() }
    }

    /// Build a host from a snapshot, checking the region invariants.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, HostError> {
        let mut host = Self::new(snapshot.arch);
        for mut segment in snapshot.segments {
            segment.region.kind = RegionKind::Segment;
            segment.region.validate().map_err(|e| HostError::Snapshot(e.to_string()))?;
            host.segments.push(segment);
        }
        for mut section in snapshot.sections {
            section.kind = RegionKind::Section;
            section.validate().map_err(|e| HostError::Snapshot(e.to_string()))?;
            host.sections.push(section);
        }
        host.types = snapshot.types;
        for var in snapshot.data_vars {
            host.vars.insert(var.address, var);
        }
        host.code_refs = snapshot.code_refs;
        host.blocks = snapshot.blocks;
        Ok(host)
    }

    pub fn from_json(json: &str) -> Result<Self, HostError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_path(path: &Path) -> Result<Self, HostError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Replace the memory view with one loaded from an object file.
    ///
    /// The snapshot's architecture is kept when it already has one.
    #[cfg(feature = "object-loader")]
    pub fn with_image(mut self, image: crate::host::object::LoadedImage) -> Self {
        if self.arch.is_none() {
            self.arch = image.arch;
        }
        self.segments = image.segments;
        self.sections = image.sections;
        self
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            arch: self.arch.clone(),
            segments: self.segments.clone(),
            sections: self.sections.clone(),
            types: self.types.clone(),
            data_vars: self.vars.values().cloned().collect(),
            code_refs: self.code_refs.clone(),
            blocks: self.blocks.clone(),
        }
    }

    pub fn annotations(&self) -> Annotations {
        Annotations { types: self.types.clone(), data_vars: self.data_vars() }
    }

    pub fn add_segment(&mut self, region: MemoryRegion, bytes: Vec<u8>) -> &mut Self {
        self.segments.push(SegmentImage {
            region: MemoryRegion { kind: RegionKind::Segment, ..region },
            bytes,
        });
        self
    }

    pub fn add_section(&mut self, region: MemoryRegion) -> &mut Self {
        self.sections.push(MemoryRegion { kind: RegionKind::Section, ..region });
        self
    }

    /// Insert a data variable directly, outside of any edit batch.
    pub fn add_data_var(&mut self, address: u64, ty: DataType, name: Option<&str>) -> &mut Self {
        self.vars.insert(
            address,
            DataVariable { address, ty, name: name.map(str::to_string), value: None },
        );
        self
    }

    pub fn add_named_type(&mut self, name: &str, definition: StructType) -> &mut Self {
        self.types.insert(name.to_string(), definition);
        self
    }

    pub fn add_code_ref(&mut self, code_address: u64, data_address: u64) -> &mut Self {
        self.code_refs.push(CrossReference { code_address, data_address });
        self
    }

    pub fn add_block(&mut self, block: IrBasicBlock) -> &mut Self {
        self.blocks.push(block);
        self
    }

    /// Revert the most recently committed edit batch. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(batch) => {
                self.rollback(batch);
                true
            }
            None => false,
        }
    }

    /// Number of committed batches that can still be undone.
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    pub fn in_edit(&self) -> bool {
        self.open_batch.is_some()
    }

    pub fn analysis_requests(&self) -> usize {
        self.analysis_requests
    }

    fn record(&mut self, edit: Edit) {
        if let Some(batch) = self.open_batch.as_mut() {
            batch.push(edit);
        }
    }

    fn rollback(&mut self, batch: Vec<Edit>) {
        for edit in batch.into_iter().rev() {
            match edit {
                Edit::VarAdded(address) => {
                    self.vars.remove(&address);
                }
                Edit::VarRemoved(var) => {
                    self.vars.insert(var.address, var);
                }
                Edit::TypeSet { name, previous: Some(previous) } => {
                    self.types.insert(name, previous);
                }
                Edit::TypeSet { name, previous: None } => {
                    self.types.remove(&name);
                }
            }
        }
    }

    fn type_width(&self, ty: &DataType, depth: usize) -> Option<u64> {
        if depth > MAX_TYPE_DEPTH {
            return None;
        }
        match ty {
            DataType::Named { name } => {
                let definition = self.types.get(name)?;
                let mut width = 0u64;
                for field in &definition.fields {
                    let field_width = self.type_width(&field.ty, depth + 1)?;
                    if !definition.packed {
                        let align = field_width.clamp(1, 8).next_power_of_two();
                        width = width.div_ceil(align) * align;
                    }
                    width = width.checked_add(field_width)?;
                }
                Some(width)
            }
            DataType::Array { element, count } => {
                self.type_width(element, depth + 1).map(|w| w.saturating_mul(*count))
            }
            other => other.width(),
        }
    }

    fn extent(&self, var: &DataVariable) -> u64 {
        self.type_width(&var.ty, 0).unwrap_or(1).max(1)
    }

    fn with_value(&self, var: &DataVariable) -> DataVariable {
        let mut out = var.clone();
        if let (DataType::Pointer { width, .. }, Some(arch)) = (&var.ty, &self.arch) {
            if let Ok(value) = self.read_uint(var.address, *width as usize, arch.endianness) {
                out.value = Some(value);
            }
        }
        out
    }
}

impl MemoryModel for SnapshotHost {
    fn arch(&self) -> Option<ArchInfo> {
        self.arch.clone()
    }

    fn segments(&self) -> Vec<MemoryRegion> {
        self.segments.iter().map(|s| s.region.clone()).collect()
    }

    fn sections(&self) -> Vec<MemoryRegion> {
        self.sections.clone()
    }

    fn read(&self, address: u64, length: u64) -> Result<Vec<u8>, HostError> {
        let unmapped = || HostError::Unmapped { address, length };
        let end = address.checked_add(length).ok_or_else(unmapped)?;

        // A range may run across adjacent segments, but not across a gap.
        let mut out = Vec::new();
        let mut cursor = address;
        loop {
            let segment = self
                .segments
                .iter()
                .find(|segment| segment.region.contains(cursor))
                .ok_or_else(unmapped)?;
            let chunk_end = end.min(segment.region.end);
            out.extend(segment.slice(cursor, chunk_end - cursor).ok_or_else(unmapped)?);
            if chunk_end == end {
                return Ok(out);
            }
            cursor = chunk_end;
        }
    }
}

impl TypeDatabase for SnapshotHost {
    fn data_vars(&self) -> Vec<DataVariable> {
        self.vars.values().map(|var| self.with_value(var)).collect()
    }

    fn data_var_at(&self, address: u64) -> Option<DataVariable> {
        self.vars.get(&address).map(|var| self.with_value(var))
    }

    fn define_data_var(
        &mut self,
        address: u64,
        ty: DataType,
        name: Option<String>,
    ) -> Result<(), HostError> {
        let width = self.type_width(&ty, 0).ok_or(HostError::UnsizedType { address })?.max(1);
        let end = address.saturating_add(width);

        let overlapping: Vec<u64> = self
            .vars
            .values()
            .filter(|var| var.address < end && var.address.saturating_add(self.extent(var)) > address)
            .map(|var| var.address)
            .collect();
        for existing in overlapping {
            if let Some(removed) = self.vars.remove(&existing) {
                debug!("Replacing data variable at 0x{:X} while defining 0x{:X}", existing, address);
                self.record(Edit::VarRemoved(removed));
            }
        }

        self.vars.insert(address, DataVariable { address, ty, name, value: None });
        self.record(Edit::VarAdded(address));
        Ok(())
    }

    fn undefine_data_var(&mut self, address: u64) -> Result<(), HostError> {
        let removed = self.vars.remove(&address).ok_or(HostError::NoVariable(address))?;
        self.record(Edit::VarRemoved(removed));
        Ok(())
    }

    fn type_exists(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    fn define_named_type(&mut self, name: &str, definition: StructType) -> Result<(), HostError> {
        let previous = self.types.insert(name.to_string(), definition);
        self.record(Edit::TypeSet { name: name.to_string(), previous });
        Ok(())
    }
}

impl CrossReferenceIndex for SnapshotHost {
    fn code_refs(&self, data_address: u64) -> Vec<CrossReference> {
        self.code_refs.iter().filter(|xref| xref.data_address == data_address).copied().collect()
    }
}

impl IrView for SnapshotHost {
    fn instruction_at(&self, code_address: u64) -> Option<IrInstruction> {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions.iter())
            .find(|instr| instr.address == code_address)
            .cloned()
    }

    fn basic_block_at(&self, code_address: u64) -> Option<IrBasicBlock> {
        self.blocks
            .iter()
            .find(|block| block.instructions.iter().any(|instr| instr.address == code_address))
            .cloned()
    }
}

impl EditTransaction for SnapshotHost {
    fn begin_edit(&mut self) -> Result<(), HostError> {
        if self.open_batch.is_some() {
            return Err(HostError::Transaction("an edit batch is already open".into()));
        }
        self.open_batch = Some(Vec::new());
        Ok(())
    }

    fn commit_edit(&mut self) -> Result<(), HostError> {
        let batch = self
            .open_batch
            .take()
            .ok_or_else(|| HostError::Transaction("no edit batch is open".into()))?;
        if !batch.is_empty() {
            self.history.push(batch);
        }
        Ok(())
    }

    fn revert_edit(&mut self) -> Result<(), HostError> {
        let batch = self
            .open_batch
            .take()
            .ok_or_else(|| HostError::Transaction("no edit batch is open".into()))?;
        self.rollback(batch);
        Ok(())
    }

    fn update_analysis(&mut self) {
        self.analysis_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endianness, StructField};

    fn host() -> SnapshotHost {
        let mut host = SnapshotHost::new(Some(ArchInfo::new("x86_64", 8, Endianness::Little)));
        let mut bytes = vec![0u8; 0x40];
        bytes[..8].copy_from_slice(&0x1020u64.to_le_bytes());
        host.add_segment(MemoryRegion::segment(0x1000, 0x1040, true, false, false).unwrap(), bytes);
        host
    }

    #[test]
    fn read_outside_backing_fails() {
        let host = host();
        assert!(host.read(0x1000, 0x40).is_ok());
        assert!(host.read(0x1000, 0x41).is_err());
        assert!(host.read(0x2000, 1).is_err());
    }

    #[test]
    fn bytes_past_region_end_are_not_served() {
        let mut host = SnapshotHost::new(Some(ArchInfo::new("x86_64", 8, Endianness::Little)));
        host.add_segment(
            MemoryRegion::segment(0x1000, 0x1004, true, false, false).unwrap(),
            b"abcdefgh".to_vec(),
        );
        assert_eq!(host.read(0x1000, 4).unwrap(), b"abcd");
        assert!(host.read(0x1002, 4).is_err());
        assert!(host.read(0x1004, 1).is_err());
    }

    #[test]
    fn unbacked_tail_reads_as_zeros() {
        let mut host = SnapshotHost::new(Some(ArchInfo::new("x86_64", 8, Endianness::Little)));
        host.add_segment(
            MemoryRegion::segment(0x1000, 0x1000 + (1 << 40), true, true, false).unwrap(),
            vec![7, 7],
        );
        assert_eq!(host.read(0x1000, 4).unwrap(), [7, 7, 0, 0]);
        assert_eq!(host.read(0x1000 + (1 << 39), 3).unwrap(), [0, 0, 0]);
        assert_eq!(host.read_uint(0x1001, 2, Endianness::Little).unwrap(), 7);
    }

    #[test]
    fn reads_run_across_adjacent_segments() {
        let mut host = host();
        host.add_segment(
            MemoryRegion::segment(0x1040, 0x1050, true, false, false).unwrap(),
            vec![0xAA; 0x10],
        );
        host.add_segment(
            MemoryRegion::segment(0x1060, 0x1070, true, false, false).unwrap(),
            vec![0xBB; 0x10],
        );

        let bytes = host.read(0x103E, 4).unwrap();
        assert_eq!(bytes, [0, 0, 0xAA, 0xAA]);
        assert_eq!(host.read(0x1000, 0x50).unwrap().len(), 0x50);
        assert!(host.read(0x104E, 4).is_err(), "gap between 0x1050 and 0x1060");
        assert!(host.read(u64::MAX - 1, 4).is_err());
    }

    #[test]
    fn pointer_values_come_from_backing_bytes() {
        let mut host = host();
        host.add_data_var(0x1000, DataType::pointer_to(DataType::Char, 8), None);
        assert_eq!(host.data_var_at(0x1000).unwrap().value, Some(0x1020));
    }

    #[test]
    fn packed_named_type_width_sums_fields() {
        let mut host = host();
        host.add_named_type(
            "Pair",
            StructType::packed(vec![
                StructField { name: "a".into(), ty: DataType::unsigned(1) },
                StructField { name: "b".into(), ty: DataType::unsigned(8) },
            ]),
        );
        assert_eq!(host.type_width(&DataType::named("Pair"), 0), Some(9));
    }

    #[test]
    fn revert_edit_restores_replaced_variables() {
        let mut host = host();
        host.add_data_var(0x1008, DataType::unsigned(8), Some("len"));
        host.begin_edit().unwrap();
        host.define_data_var(0x1000, DataType::char_array(16), None).unwrap();
        assert!(host.data_var_at(0x1008).is_none());
        host.revert_edit().unwrap();
        assert!(host.data_var_at(0x1000).is_none());
        assert_eq!(host.data_var_at(0x1008).unwrap().name.as_deref(), Some("len"));
        assert_eq!(host.undo_depth(), 0);
    }
}

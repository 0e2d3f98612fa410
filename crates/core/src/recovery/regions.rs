use log::debug;

use crate::host::MemoryModel;
use crate::model::{MemoryRegion, SectionSemantics};
use crate::recovery::RecoveryError;

/// Read-only working set: r--- segments plus sections tagged as read-only data.
///
/// A location may be covered by both a segment and a section; membership is
/// still a single yes/no answer.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyRegions {
    regions: Vec<MemoryRegion>,
}

impl ReadOnlyRegions {
    /// Classify the host's regions. Fails when the architecture is unknown.
    pub fn classify<M: MemoryModel + ?Sized>(memory: &M) -> Result<Self, RecoveryError> {
        if memory.arch().is_none() {
            return Err(RecoveryError::Configuration);
        }
        Ok(Self::from_regions(memory.segments(), memory.sections()))
    }

    pub fn from_regions(segments: Vec<MemoryRegion>, sections: Vec<MemoryRegion>) -> Self {
        let mut regions: Vec<MemoryRegion> =
            segments.into_iter().filter(is_read_only_segment).collect();
        let segment_count = regions.len();
        regions.extend(sections.into_iter().filter(is_read_only_data_section));
        debug!(
            "Read-only working set: {} segment(s), {} section(s)",
            segment_count,
            regions.len() - segment_count
        );
        Self { regions }
    }

    /// Fail with `NoCandidateRegions` when nothing qualified.
    pub fn require_non_empty(self) -> Result<Self, RecoveryError> {
        if self.regions.is_empty() {
            Err(RecoveryError::NoCandidateRegions)
        } else {
            Ok(self)
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        self.regions.iter().any(|region| region.contains(address))
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }
}

pub fn is_read_only_segment(region: &MemoryRegion) -> bool {
    region.readable && !region.writable && !region.executable
}

pub fn is_read_only_data_section(region: &MemoryRegion) -> bool {
    region.semantics == Some(SectionSemantics::ReadOnlyData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_readonly_segments_and_rodata_sections() {
        let segments = vec![
            MemoryRegion::segment(0x1000, 0x2000, true, false, true).unwrap(),
            MemoryRegion::segment(0x2000, 0x3000, true, false, false).unwrap(),
            MemoryRegion::segment(0x3000, 0x4000, true, true, false).unwrap(),
        ];
        let sections = vec![
            MemoryRegion::section(".text", 0x1000, 0x2000, SectionSemantics::ReadOnlyCode)
                .unwrap(),
            MemoryRegion::section(".data.rel.ro", 0x3000, 0x3100, SectionSemantics::ReadOnlyData)
                .unwrap(),
        ];
        let ro = ReadOnlyRegions::from_regions(segments, sections);
        assert_eq!(ro.len(), 2);
        assert!(!ro.contains(0x1800));
        assert!(ro.contains(0x2800));
        assert!(ro.contains(0x3080));
        assert!(!ro.contains(0x3200));
    }
}

//! Memory view of ELF, PE and Mach-O files.
//!
//! Produces the architecture, segments (with file-backed bytes) and sections
//! (with semantics) a `SnapshotHost` needs when no host-exported memory view is
//! available.

use std::path::Path;

use goblin::elf::program_header::{PF_R, PF_W, PF_X, PT_LOAD};
use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS};
use goblin::pe::section_table::{IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ, IMAGE_SCN_MEM_WRITE};
use goblin::{elf, mach, pe, Object};

use crate::host::{HostError, SegmentImage};
use crate::model::{ArchInfo, Endianness, MemoryRegion, RegionKind, SectionSemantics};

const VM_PROT_READ: u32 = 0x1;
const VM_PROT_WRITE: u32 = 0x2;
const VM_PROT_EXECUTE: u32 = 0x4;

/// Architecture, segments and sections of a parsed object file.
#[derive(Debug, Clone, Default)]
pub struct LoadedImage {
    pub arch: Option<ArchInfo>,
    pub segments: Vec<SegmentImage>,
    pub sections: Vec<MemoryRegion>,
}

impl LoadedImage {
    /// All regions, segments first.
    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.segments
            .iter()
            .map(|s| s.region.clone())
            .chain(self.sections.iter().cloned())
            .collect()
    }
}

pub fn load_object_file(path: &Path) -> Result<LoadedImage, HostError> {
    let bytes = std::fs::read(path)?;
    load_object(&bytes)
}

pub fn load_object(bytes: &[u8]) -> Result<LoadedImage, HostError> {
    match Object::parse(bytes).map_err(|e| HostError::Object(e.to_string()))? {
        Object::Elf(elf) => Ok(load_elf(&elf, bytes)),
        Object::PE(pe) => Ok(load_pe(&pe, bytes)),
        Object::Mach(mach::Mach::Binary(bin)) => Ok(load_macho(&bin, bytes)),
        Object::Mach(mach::Mach::Fat(_)) => {
            Err(HostError::Object("fat Mach-O archives are not supported".into()))
        }
        _ => Err(HostError::Object("unrecognized object format".into())),
    }
}

/// File-backed bytes of a region, at most `mem_size` of them.
///
/// The zero-initialized tail (`.bss`, `p_memsz > p_filesz`) is not materialized;
/// `SnapshotHost` reads it as zeros.
fn backing_bytes(bytes: &[u8], file_offset: u64, file_size: u64, mem_size: u64) -> Vec<u8> {
    let start = usize::try_from(file_offset).unwrap_or(usize::MAX).min(bytes.len());
    let end = usize::try_from(file_offset.saturating_add(file_size.min(mem_size)))
        .unwrap_or(usize::MAX)
        .min(bytes.len());
    bytes[start..end].to_vec()
}

fn segment(
    name: Option<String>,
    start: u64,
    size: u64,
    (readable, writable, executable): (bool, bool, bool),
    bytes: Vec<u8>,
) -> Option<SegmentImage> {
    let mut region =
        MemoryRegion::segment(start, start.checked_add(size)?, readable, writable, executable)
            .ok()?;
    region.name = name;
    Some(SegmentImage { region, bytes })
}

fn section(name: &str, start: u64, size: u64, semantics: SectionSemantics) -> Option<MemoryRegion> {
    MemoryRegion::section(name, start, start.checked_add(size)?, semantics).ok()
}

fn semantics_from_flags(writable: bool, executable: bool) -> SectionSemantics {
    match (writable, executable) {
        (_, true) => SectionSemantics::ReadOnlyCode,
        (true, false) => SectionSemantics::ReadWriteData,
        (false, false) => SectionSemantics::ReadOnlyData,
    }
}

fn elf_arch(elf: &elf::Elf) -> Option<ArchInfo> {
    let name = match elf.header.e_machine {
        elf::header::EM_X86_64 => "x86_64",
        elf::header::EM_386 => "x86",
        elf::header::EM_AARCH64 => "arm64",
        elf::header::EM_ARM => "armv7",
        elf::header::EM_MIPS => "mips",
        elf::header::EM_PPC => "ppc",
        elf::header::EM_PPC64 => "ppc64",
        elf::header::EM_RISCV => "riscv",
        _ => return None,
    };
    let width = if elf.is_64 { 8 } else { 4 };
    let endianness = if elf.little_endian { Endianness::Little } else { Endianness::Big };
    Some(ArchInfo::new(name, width, endianness))
}

fn load_elf(elf: &elf::Elf, bytes: &[u8]) -> LoadedImage {
    let mut image = LoadedImage { arch: elf_arch(elf), ..LoadedImage::default() };

    for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD) {
        let flags = (
            ph.p_flags & PF_R != 0,
            ph.p_flags & PF_W != 0,
            ph.p_flags & PF_X != 0,
        );
        let data = backing_bytes(bytes, ph.p_offset, ph.p_filesz, ph.p_memsz);
        if let Some(seg) = segment(None, ph.p_vaddr, ph.p_memsz, flags, data) {
            image.segments.push(seg);
        }
    }

    // Sections of a relocatable object all sit at address 0; lay them out back
    // to back. Files without loadable program headers get one segment per
    // allocated section.
    let relocatable = elf.header.e_type == elf::header::ET_REL;
    let section_segments = relocatable || image.segments.is_empty();
    let mut next_address = 0u64;
    for sh in &elf.section_headers {
        if sh.sh_flags & u64::from(SHF_ALLOC) == 0 || sh.sh_size == 0 {
            continue;
        }
        let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
        let writable = sh.sh_flags & u64::from(SHF_WRITE) != 0;
        let executable = sh.sh_flags & u64::from(SHF_EXECINSTR) != 0;
        let address = if relocatable {
            let Some(address) = align_up(next_address, sh.sh_addralign) else { continue };
            let Some(end) = address.checked_add(sh.sh_size) else { continue };
            next_address = end;
            address
        } else {
            sh.sh_addr
        };
        if let Some(region) =
            section(name, address, sh.sh_size, semantics_from_flags(writable, executable))
        {
            image.sections.push(region);
        }
        if section_segments {
            let file_size = if sh.sh_type == SHT_NOBITS { 0 } else { sh.sh_size };
            let data = backing_bytes(bytes, sh.sh_offset, file_size, sh.sh_size);
            if let Some(seg) = segment(
                Some(name.to_string()),
                address,
                sh.sh_size,
                (true, writable, executable),
                data,
            ) {
                image.segments.push(seg);
            }
        }
    }
    image
}

fn align_up(address: u64, align: u64) -> Option<u64> {
    if align <= 1 {
        return Some(address);
    }
    address.checked_add(align - 1).map(|a| a / align * align)
}

fn pe_arch(pe: &pe::PE) -> Option<ArchInfo> {
    let name = match pe.header.coff_header.machine {
        pe::header::COFF_MACHINE_X86 => "x86",
        pe::header::COFF_MACHINE_X86_64 => "x86_64",
        pe::header::COFF_MACHINE_ARM => "arm",
        pe::header::COFF_MACHINE_ARM64 => "arm64",
        _ => return None,
    };
    Some(ArchInfo::new(name, if pe.is_64 { 8 } else { 4 }, Endianness::Little))
}

fn load_pe(pe: &pe::PE, bytes: &[u8]) -> LoadedImage {
    let mut image = LoadedImage { arch: pe_arch(pe), ..LoadedImage::default() };
    let base = pe.image_base as u64;

    for sec in &pe.sections {
        let name = sec.name().unwrap_or("").to_string();
        let start = base.saturating_add(u64::from(sec.virtual_address));
        let size = if sec.virtual_size == 0 { sec.size_of_raw_data } else { sec.virtual_size };
        let size = u64::from(size);
        let flags = (
            sec.characteristics & IMAGE_SCN_MEM_READ != 0,
            sec.characteristics & IMAGE_SCN_MEM_WRITE != 0,
            sec.characteristics & IMAGE_SCN_MEM_EXECUTE != 0,
        );
        let data = backing_bytes(
            bytes,
            u64::from(sec.pointer_to_raw_data),
            u64::from(sec.size_of_raw_data).min(size),
            size,
        );
        if let Some(seg) = segment(Some(name.clone()), start, size, flags, data) {
            image.segments.push(seg);
        }
        if let Some(region) = section(&name, start, size, semantics_from_flags(flags.1, flags.2)) {
            image.sections.push(region);
        }
    }
    image
}

fn macho_arch(bin: &mach::MachO) -> Option<ArchInfo> {
    let name = match bin.header.cputype() {
        mach::cputype::CPU_TYPE_X86 => "x86",
        mach::cputype::CPU_TYPE_X86_64 => "x86_64",
        mach::cputype::CPU_TYPE_ARM => "armv7",
        mach::cputype::CPU_TYPE_ARM64 => "arm64",
        _ => return None,
    };
    let endianness = if bin.little_endian { Endianness::Little } else { Endianness::Big };
    Some(ArchInfo::new(name, if bin.is_64 { 8 } else { 4 }, endianness))
}

fn macho_section_semantics(segname: &str, sectname: &str, prot: u32) -> SectionSemantics {
    match (segname, sectname) {
        ("__TEXT", "__text" | "__stubs" | "__stub_helper") => SectionSemantics::ReadOnlyCode,
        ("__TEXT", "__const" | "__cstring" | "__rodata") | ("__DATA_CONST", _) => {
            SectionSemantics::ReadOnlyData
        }
        _ => semantics_from_flags(prot & VM_PROT_WRITE != 0, prot & VM_PROT_EXECUTE != 0),
    }
}

fn load_macho(bin: &mach::MachO, bytes: &[u8]) -> LoadedImage {
    let mut image = LoadedImage { arch: macho_arch(bin), ..LoadedImage::default() };

    for seg in bin.segments.iter() {
        let segname = seg.name().unwrap_or("").to_string();
        let prot = seg.initprot;
        let flags =
            (prot & VM_PROT_READ != 0, prot & VM_PROT_WRITE != 0, prot & VM_PROT_EXECUTE != 0);
        if seg.vmsize > 0 {
            let data = backing_bytes(bytes, seg.fileoff, seg.filesize, seg.vmsize);
            if let Some(s) = segment(Some(segname.clone()), seg.vmaddr, seg.vmsize, flags, data) {
                image.segments.push(s);
            }
        }
        let Ok(sections) = seg.sections() else { continue };
        for (sec, _) in sections {
            let sectname = sec.name().unwrap_or("");
            let semantics = macho_section_semantics(&segname, sectname, prot);
            let name = format!("{segname},{sectname}");
            if let Some(region) = section(&name, sec.addr, sec.size, semantics) {
                image.sections.push(region);
            }
        }
    }
    image
}

/// Count of regions of each kind, for reporting.
pub fn region_counts(image: &LoadedImage) -> (usize, usize) {
    let regions = image.regions();
    let segments = regions.iter().filter(|r| r.kind == RegionKind::Segment).count();
    (segments, regions.len() - segments)
}

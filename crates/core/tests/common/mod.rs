//! Shared fixtures for the recovery integration tests.
#![allow(dead_code)]

use slicer_core::host::SnapshotHost;
use slicer_core::model::{
    ArchInfo, DataType, Endianness, IrBasicBlock, IrInstruction, IrOperand, IrOperation,
    MemoryRegion,
};

pub const RODATA: u64 = 0x1000;
pub const RODATA_END: u64 = 0x2000;
pub const DATA: u64 = 0x3000;
pub const DATA_END: u64 = 0x3100;

pub const HELLO: u64 = 0x1000;
pub const PANIC: u64 = 0x1100;
pub const INVALID_UTF8: u64 = 0x1200;
pub const WORLD: u64 = 0x1300;

pub fn x86_64() -> ArchInfo {
    ArchInfo::new("x86_64", 8, Endianness::Little)
}

/// Read-only image with a few strings in it.
pub fn rodata_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; (RODATA_END - RODATA) as usize];
    put(&mut bytes, HELLO - RODATA, b"hello");
    put(&mut bytes, PANIC - RODATA, b"panicked at");
    put(&mut bytes, INVALID_UTF8 - RODATA, &[0xff, 0xfe, 0x41]);
    put(&mut bytes, WORLD - RODATA, "wörld".as_bytes());
    bytes
}

fn put(bytes: &mut [u8], offset: u64, data: &[u8]) {
    let offset = offset as usize;
    bytes[offset..offset + data.len()].copy_from_slice(data);
}

/// Writable data segment holding `(pointer, length)` word pairs at the given offsets.
pub fn pair_bytes(pairs: &[(u64, u64, u64)], arch: &ArchInfo) -> Vec<u8> {
    let mut bytes = vec![0u8; (DATA_END - DATA) as usize];
    let width = arch.address_size;
    for &(offset, pointer, length) in pairs {
        put(&mut bytes, offset, &encode(pointer, width, arch.endianness));
        put(&mut bytes, offset + width as u64, &encode(length, width, arch.endianness));
    }
    bytes
}

fn encode(value: u64, width: usize, endianness: Endianness) -> Vec<u8> {
    match endianness {
        Endianness::Little => value.to_le_bytes()[..width].to_vec(),
        Endianness::Big => value.to_be_bytes()[8 - width..].to_vec(),
    }
}

/// Host with an `r--` segment of strings and an `rw-` segment of slice pairs.
///
/// Each pair gets a pointer-typed data variable at its offset.
pub fn host_with_pairs(arch: ArchInfo, pairs: &[(u64, u64, u64)]) -> SnapshotHost {
    let data = pair_bytes(pairs, &arch);
    let pointer_width = arch.pointer_width as u64;
    let mut host = SnapshotHost::new(Some(arch));
    host.add_segment(readonly_segment(), rodata_bytes());
    host.add_segment(data_segment(), data);
    for &(offset, _, _) in pairs {
        host.add_data_var(
            DATA + offset,
            DataType::pointer_to(DataType::Char, pointer_width),
            None,
        );
    }
    host
}

pub fn readonly_segment() -> MemoryRegion {
    MemoryRegion::segment(RODATA, RODATA_END, true, false, false).expect("rodata segment")
}

pub fn data_segment() -> MemoryRegion {
    MemoryRegion::segment(DATA, DATA_END, true, true, false).expect("data segment")
}

/// Block that loads `data_address` into a variable, then assigns `constant`.
pub fn load_then_constant(start: u64, constant: u64) -> IrBasicBlock {
    IrBasicBlock::new(
        start,
        vec![
            IrInstruction::new(
                0,
                start,
                IrOperation::SetVar,
                vec![IrOperand::variable("rdi"), IrOperand::other()],
            ),
            IrInstruction::new(
                1,
                start + 4,
                IrOperation::SetVar,
                vec![IrOperand::variable("rsi"), IrOperand::constant(constant)],
            ),
            IrInstruction::new(2, start + 8, IrOperation::Call, vec![IrOperand::other()]),
        ],
    )
}

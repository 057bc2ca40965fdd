//! Serialized program layout
//!
//! ```text
//! [ProgramHeader (32 bytes)]
//! [SetRecord; set_count]      32-byte little-endian byte-set bitmaps
//! [InstRecord; inst_count]    {op, a, b}
//! [EntryRecord; entry_count]  {pc, label}
//! ```
//!
//! Every field is a little-endian `u32` (or raw bytes), so all records are
//! 4-byte aligned and can be read with `zerocopy` straight from the buffer.

use std::mem;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Magic bytes identifying a serialized program
pub const MAGIC: &[u8; 8] = b"LGPROGRM";

/// Current program format version
pub const PROGRAM_FORMAT_VERSION: u32 = 1;

/// Header flag: jump chains were collapsed at build time
pub const FLAG_DETERMINIZED: u32 = 0x1;

/// All flag bits this version understands
pub const KNOWN_FLAGS: u32 = FLAG_DETERMINIZED;

pub const OP_MATCH: u32 = 0;
pub const OP_BYTE: u32 = 1;
pub const OP_SPLIT: u32 = 2;
pub const OP_JMP: u32 = 3;

/// Program header (32 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ProgramHeader {
    /// Magic bytes: "LGPROGRM"
    pub magic: [u8; 8],
    /// Format version
    pub version: u32,
    /// `FLAG_*` bits
    pub flags: u32,
    pub set_count: u32,
    pub inst_count: u32,
    pub entry_count: u32,
    /// Size of the whole serialized program, header included
    pub total_size: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SetRecord {
    pub bits: [u8; 32],
}

/// One VM instruction
///
/// - `OP_MATCH`: report the thread's label
/// - `OP_BYTE`: consume a byte in set `a`, continue at `pc + 1`
/// - `OP_SPLIT`: fork to `a` and `b`
/// - `OP_JMP`: continue at `a`
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InstRecord {
    pub op: u32,
    pub a: u32,
    pub b: u32,
}

/// Keyword entry point
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EntryRecord {
    pub pc: u32,
    pub label: u32,
}

/// Byte offsets of each section for the given counts
///
/// Returns `None` if the layout overflows `u32`.
pub fn layout(set_count: u32, inst_count: u32, entry_count: u32) -> Option<Layout> {
    let sets = mem::size_of::<ProgramHeader>() as u64;
    let insts = sets + u64::from(set_count) * mem::size_of::<SetRecord>() as u64;
    let entries = insts + u64::from(inst_count) * mem::size_of::<InstRecord>() as u64;
    let total = entries + u64::from(entry_count) * mem::size_of::<EntryRecord>() as u64;
    if total > u64::from(u32::MAX) {
        return None;
    }
    Some(Layout {
        sets_offset: sets as usize,
        insts_offset: insts as usize,
        entries_offset: entries as usize,
        total_size: total as usize,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub sets_offset: usize,
    pub insts_offset: usize,
    pub entries_offset: usize,
    pub total_size: usize,
}

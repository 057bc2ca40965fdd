//! Program validation for untrusted binary data
//!
//! A serialized program may come from anywhere, so every count, offset and
//! instruction operand is checked before the VM is allowed to index with it.

use crate::format::{
    layout, EntryRecord, InstRecord, ProgramHeader, KNOWN_FLAGS, MAGIC, OP_BYTE, OP_JMP,
    OP_MATCH, OP_SPLIT, PROGRAM_FORMAT_VERSION,
};
use std::mem;
use zerocopy::FromBytes;

/// Validation result for a serialized program
#[derive(Debug, Clone, Default)]
pub struct ProgramValidationResult {
    /// Critical errors that make the program unusable
    pub errors: Vec<String>,
    /// Statistics gathered during validation
    pub stats: ProgramStats,
}

/// Statistics gathered during program validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramStats {
    pub set_count: u32,
    pub inst_count: u32,
    pub entry_count: u32,
    /// Number of `OP_MATCH` instructions
    pub match_count: u32,
}

impl ProgramValidationResult {
    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a serialized program
///
/// Checks the header, the section layout against the buffer length, every
/// instruction opcode and operand, and every entry point.
pub fn validate_program(buffer: &[u8]) -> ProgramValidationResult {
    let mut result = ProgramValidationResult::default();

    let header = match ProgramHeader::read_from_prefix(buffer) {
        Ok((h, _)) => h,
        Err(_) => {
            result.errors.push(format!(
                "buffer of {} bytes is too small for the {}-byte header",
                buffer.len(),
                mem::size_of::<ProgramHeader>()
            ));
            return result;
        }
    };

    if &header.magic != MAGIC {
        result.errors.push("bad magic bytes".to_string());
        return result;
    }
    if header.version != PROGRAM_FORMAT_VERSION {
        result.errors.push(format!(
            "unsupported format version {} (expected {})",
            header.version, PROGRAM_FORMAT_VERSION
        ));
        return result;
    }
    if header.flags & !KNOWN_FLAGS != 0 {
        result
            .errors
            .push(format!("unknown flag bits 0x{:x}", header.flags & !KNOWN_FLAGS));
    }

    result.stats.set_count = header.set_count;
    result.stats.inst_count = header.inst_count;
    result.stats.entry_count = header.entry_count;

    if header.inst_count == 0 {
        result.errors.push("program has no instructions".to_string());
    }
    if header.entry_count == 0 {
        result.errors.push("program has no entry points".to_string());
    }

    let Some(sections) = layout(header.set_count, header.inst_count, header.entry_count) else {
        result
            .errors
            .push("section counts overflow the format limits".to_string());
        return result;
    };
    if sections.total_size != header.total_size as usize {
        result.errors.push(format!(
            "header total size {} does not match computed size {}",
            header.total_size, sections.total_size
        ));
    }
    if sections.total_size > buffer.len() {
        result.errors.push(format!(
            "program truncated: needs {} bytes, buffer holds {}",
            sections.total_size,
            buffer.len()
        ));
    }
    if !result.is_valid() {
        return result;
    }

    let inst_count = header.inst_count;
    let mut insts = Vec::with_capacity(inst_count as usize);
    for i in 0..inst_count as usize {
        let offset = sections.insts_offset + i * mem::size_of::<InstRecord>();
        let Ok((inst, _)) = InstRecord::read_from_prefix(&buffer[offset..]) else {
            result.errors.push(format!("failed to read instruction {}", i));
            continue;
        };
        insts.push(inst);
        match inst.op {
            OP_MATCH => result.stats.match_count += 1,
            OP_BYTE => {
                if inst.a >= header.set_count {
                    result.errors.push(format!(
                        "instruction {} references byte set {} of {}",
                        i, inst.a, header.set_count
                    ));
                }
                if i as u64 + 1 >= u64::from(inst_count) {
                    result
                        .errors
                        .push(format!("instruction {} falls off the end of the program", i));
                }
            }
            OP_SPLIT => {
                if inst.a >= inst_count || inst.b >= inst_count {
                    result.errors.push(format!(
                        "instruction {} splits to out-of-range targets {} and {}",
                        i, inst.a, inst.b
                    ));
                }
            }
            OP_JMP => {
                if inst.a >= inst_count {
                    result.errors.push(format!(
                        "instruction {} jumps to out-of-range target {}",
                        i, inst.a
                    ));
                }
            }
            op => result
                .errors
                .push(format!("instruction {} has invalid opcode {}", i, op)),
        }
    }

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for i in 0..header.entry_count as usize {
        let offset = sections.entries_offset + i * mem::size_of::<EntryRecord>();
        let Ok((entry, _)) = EntryRecord::read_from_prefix(&buffer[offset..]) else {
            result.errors.push(format!("failed to read entry {}", i));
            continue;
        };
        entries.push(entry);
        if entry.pc >= inst_count {
            result.errors.push(format!(
                "entry {} starts at out-of-range instruction {}",
                i, entry.pc
            ));
        }
    }

    if result.is_valid() && result.stats.match_count == 0 {
        result
            .errors
            .push("program has no match instructions".to_string());
    }

    // Operands are in range from here on
    if result.is_valid() {
        for (i, entry) in entries.iter().enumerate() {
            if matches_empty(&insts, entry.pc) {
                result
                    .errors
                    .push(format!("entry {} matches the empty string", i));
            }
        }
    }

    result
}

/// Whether the jump/split closure from `pc` reaches a match before any byte
fn matches_empty(insts: &[InstRecord], pc: u32) -> bool {
    let mut visited = vec![false; insts.len()];
    let mut stack = vec![pc];
    while let Some(pc) = stack.pop() {
        let Some(seen) = visited.get_mut(pc as usize) else {
            continue;
        };
        if mem::replace(seen, true) {
            continue;
        }
        let inst = insts[pc as usize];
        match inst.op {
            OP_MATCH => return true,
            OP_SPLIT => stack.extend([inst.b, inst.a]),
            OP_JMP => stack.push(inst.a),
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SetRecord;
    use zerocopy::IntoBytes;

    fn header(set_count: u32, inst_count: u32, entry_count: u32) -> ProgramHeader {
        ProgramHeader {
            magic: *MAGIC,
            version: PROGRAM_FORMAT_VERSION,
            flags: 0,
            set_count,
            inst_count,
            entry_count,
            total_size: layout(set_count, inst_count, entry_count)
                .unwrap()
                .total_size as u32,
        }
    }

    fn build(insts: &[InstRecord], entries: &[EntryRecord]) -> Vec<u8> {
        let mut out = header(1, insts.len() as u32, entries.len() as u32)
            .as_bytes()
            .to_vec();
        out.extend_from_slice(SetRecord { bits: [0xFF; 32] }.as_bytes());
        for inst in insts {
            out.extend_from_slice(inst.as_bytes());
        }
        for entry in entries {
            out.extend_from_slice(entry.as_bytes());
        }
        out
    }

    #[test]
    fn test_valid_program() {
        let bytes = build(
            &[
                InstRecord { op: OP_BYTE, a: 0, b: 0 },
                InstRecord { op: OP_MATCH, a: 0, b: 0 },
            ],
            &[EntryRecord { pc: 0, label: 7 }],
        );
        let result = validate_program(&bytes);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.stats.match_count, 1);
    }

    #[test]
    fn test_rejects_bad_operands() {
        let bytes = build(
            &[
                InstRecord { op: OP_BYTE, a: 3, b: 0 },
                InstRecord { op: OP_SPLIT, a: 0, b: 9 },
                InstRecord { op: 42, a: 0, b: 0 },
                InstRecord { op: OP_MATCH, a: 0, b: 0 },
            ],
            &[EntryRecord { pc: 10, label: 0 }],
        );
        let result = validate_program(&bytes);
        assert_eq!(result.errors.len(), 4, "{:?}", result.errors);
    }

    #[test]
    fn test_rejects_entry_matching_empty_string() {
        let bytes = build(&[InstRecord { op: OP_MATCH, a: 0, b: 0 }], &[EntryRecord { pc: 0, label: 0 }]);
        let result = validate_program(&bytes);
        assert_eq!(result.errors, vec!["entry 0 matches the empty string".to_string()]);

        // reachable only through a split and a jump cycle
        let bytes = build(
            &[
                InstRecord { op: OP_JMP, a: 1, b: 0 },
                InstRecord { op: OP_SPLIT, a: 0, b: 3 },
                InstRecord { op: OP_BYTE, a: 0, b: 0 },
                InstRecord { op: OP_MATCH, a: 0, b: 0 },
            ],
            &[EntryRecord { pc: 2, label: 0 }, EntryRecord { pc: 0, label: 1 }],
        );
        let result = validate_program(&bytes);
        assert_eq!(result.errors, vec!["entry 1 matches the empty string".to_string()]);
    }

    #[test]
    fn test_rejects_truncation_and_garbage() {
        let bytes = build(
            &[
                InstRecord { op: OP_BYTE, a: 0, b: 0 },
                InstRecord { op: OP_MATCH, a: 0, b: 0 },
            ],
            &[EntryRecord { pc: 0, label: 0 }],
        );
        assert!(!validate_program(&bytes[..bytes.len() - 1]).is_valid());
        assert!(!validate_program(&bytes[..10]).is_valid());
        assert!(!validate_program(&[0u8; 64]).is_valid());
    }
}

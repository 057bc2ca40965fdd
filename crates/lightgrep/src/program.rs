//! Compiled search programs
//!
//! A [`Program`] is a small Thompson-style instruction list shared by every
//! keyword, plus one entry point per keyword. It is immutable once built and
//! is shared between search contexts behind an `Arc`.

use crate::byteset::ByteSet;
use crate::error::{LightgrepError, Result};
use crate::format::{
    layout, EntryRecord, InstRecord, ProgramHeader, SetRecord, FLAG_DETERMINIZED, MAGIC, OP_BYTE,
    OP_JMP, OP_MATCH, OP_SPLIT, PROGRAM_FORMAT_VERSION,
};
use crate::parser::{Keyword, Piece};
use crate::pattern::Repeat;
use crate::validation::validate_program;
use std::collections::HashMap;
use std::mem;
use tracing::debug;
use zerocopy::{FromBytes, IntoBytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Inst {
    Match,
    /// Consume one byte from the given set, then continue at `pc + 1`
    Byte(u32),
    Split(u32, u32),
    Jmp(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub pc: u32,
    pub label: u32,
}

/// Immutable compiled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub(crate) sets: Vec<ByteSet>,
    pub(crate) insts: Vec<Inst>,
    pub(crate) entries: Vec<Entry>,
    determinized: bool,
}

impl Program {
    pub(crate) fn compile(keywords: &[Keyword], size_hint: usize, determinize: bool) -> Result<Self> {
        if keywords.is_empty() {
            return Err(LightgrepError::NoKeywords);
        }

        let mut compiler = Compiler::with_capacity(size_hint);
        let mut entries = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let pc = compiler.pc();
            for piece in &keyword.pieces {
                compiler.emit_piece(piece);
            }
            compiler.insts.push(Inst::Match);
            entries.push(Entry {
                pc,
                label: keyword.label,
            });
        }

        let mut program = Program {
            sets: compiler.sets,
            insts: compiler.insts,
            entries,
            determinized: false,
        };
        if determinize {
            program.collapse_jumps();
        }

        let set_count = u32::try_from(program.sets.len());
        let inst_count = u32::try_from(program.insts.len());
        let entry_count = u32::try_from(program.entries.len());
        match (set_count, inst_count, entry_count) {
            (Ok(s), Ok(i), Ok(e)) if layout(s, i, e).is_some() => {}
            _ => {
                return Err(LightgrepError::ResourceLimitExceeded(format!(
                    "program with {} instructions exceeds the 4GB format limit",
                    program.insts.len()
                )))
            }
        }

        debug!(
            keywords = program.entries.len(),
            instructions = program.insts.len(),
            byte_sets = program.sets.len(),
            determinized = program.determinized,
            "compiled program"
        );
        Ok(program)
    }

    /// Follow every jump chain to its final target
    fn collapse_jumps(&mut self) {
        let insts = &self.insts;
        let resolve = |mut pc: u32| {
            for _ in 0..insts.len() {
                match insts[pc as usize] {
                    Inst::Jmp(target) => pc = target,
                    _ => break,
                }
            }
            pc
        };

        let collapsed: Vec<Inst> = insts
            .iter()
            .map(|inst| match *inst {
                Inst::Split(a, b) => Inst::Split(resolve(a), resolve(b)),
                Inst::Jmp(a) => Inst::Jmp(resolve(a)),
                other => other,
            })
            .collect();
        for entry in &mut self.entries {
            entry.pc = resolve(entry.pc);
        }
        self.insts = collapsed;
        self.determinized = true;
    }

    /// Whether jump chains were collapsed when this program was built
    pub fn is_determinized(&self) -> bool {
        self.determinized
    }

    pub fn instruction_count(&self) -> usize {
        self.insts.len()
    }

    /// Number of keyword entry points
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Size in bytes of the serialized form
    pub fn serialized_size(&self) -> usize {
        mem::size_of::<ProgramHeader>()
            + self.sets.len() * mem::size_of::<SetRecord>()
            + self.insts.len() * mem::size_of::<InstRecord>()
            + self.entries.len() * mem::size_of::<EntryRecord>()
    }

    /// Serialize to the `LGPROGRM` format
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_size = self.serialized_size();
        let header = ProgramHeader {
            magic: *MAGIC,
            version: PROGRAM_FORMAT_VERSION,
            flags: if self.determinized { FLAG_DETERMINIZED } else { 0 },
            set_count: self.sets.len() as u32,
            inst_count: self.insts.len() as u32,
            entry_count: self.entries.len() as u32,
            total_size: total_size as u32,
        };

        let mut out = Vec::with_capacity(total_size);
        out.extend_from_slice(header.as_bytes());
        for set in &self.sets {
            out.extend_from_slice(SetRecord { bits: set.to_bitmap() }.as_bytes());
        }
        for inst in &self.insts {
            let record = match *inst {
                Inst::Match => InstRecord { op: OP_MATCH, a: 0, b: 0 },
                Inst::Byte(set) => InstRecord { op: OP_BYTE, a: set, b: 0 },
                Inst::Split(a, b) => InstRecord { op: OP_SPLIT, a, b },
                Inst::Jmp(a) => InstRecord { op: OP_JMP, a, b: 0 },
            };
            out.extend_from_slice(record.as_bytes());
        }
        for entry in &self.entries {
            out.extend_from_slice(
                EntryRecord {
                    pc: entry.pc,
                    label: entry.label,
                }
                .as_bytes(),
            );
        }
        out
    }

    /// Load a serialized program, validating it first
    ///
    /// Bytes past the header's `total_size` are ignored.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        let validation = validate_program(buffer);
        if !validation.is_valid() {
            return Err(LightgrepError::InvalidProgram(validation.errors.join("; ")));
        }

        let invalid = || LightgrepError::InvalidProgram("unreadable record".to_string());
        let (header, _) = ProgramHeader::read_from_prefix(buffer).map_err(|_| invalid())?;
        let sections = layout(header.set_count, header.inst_count, header.entry_count)
            .ok_or_else(invalid)?;

        let sets = (0..header.set_count as usize)
            .map(|i| {
                let at = sections.sets_offset + i * mem::size_of::<SetRecord>();
                SetRecord::read_from_prefix(&buffer[at..])
                    .map(|(r, _)| ByteSet::from_bitmap(&r.bits))
                    .map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>>>()?;

        let insts = (0..header.inst_count as usize)
            .map(|i| -> Result<Inst> {
                let at = sections.insts_offset + i * mem::size_of::<InstRecord>();
                let (r, _) = InstRecord::read_from_prefix(&buffer[at..]).map_err(|_| invalid())?;
                match r.op {
                    OP_MATCH => Ok(Inst::Match),
                    OP_BYTE => Ok(Inst::Byte(r.a)),
                    OP_SPLIT => Ok(Inst::Split(r.a, r.b)),
                    OP_JMP => Ok(Inst::Jmp(r.a)),
                    _ => Err(invalid()),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let entries = (0..header.entry_count as usize)
            .map(|i| {
                let at = sections.entries_offset + i * mem::size_of::<EntryRecord>();
                EntryRecord::read_from_prefix(&buffer[at..])
                    .map(|(r, _)| Entry {
                        pc: r.pc,
                        label: r.label,
                    })
                    .map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Program {
            sets,
            insts,
            entries,
            determinized: header.flags & FLAG_DETERMINIZED != 0,
        })
    }
}

struct Compiler {
    sets: Vec<ByteSet>,
    set_ids: HashMap<ByteSet, u32>,
    insts: Vec<Inst>,
}

impl Compiler {
    fn with_capacity(size_hint: usize) -> Self {
        Self {
            sets: Vec::new(),
            set_ids: HashMap::new(),
            insts: Vec::with_capacity(size_hint),
        }
    }

    fn pc(&self) -> u32 {
        self.insts.len() as u32
    }

    fn intern(&mut self, set: ByteSet) -> u32 {
        if let Some(id) = self.set_ids.get(&set) {
            return *id;
        }
        let id = self.sets.len() as u32;
        self.sets.push(set);
        self.set_ids.insert(set, id);
        id
    }

    fn emit_piece(&mut self, piece: &Piece) {
        match piece.repeat {
            Repeat::One => self.emit_alternatives(&piece.alternatives),
            Repeat::ZeroOrOne => {
                let split = self.placeholder();
                self.emit_alternatives(&piece.alternatives);
                self.insts[split as usize] = Inst::Split(split + 1, self.pc());
            }
            Repeat::ZeroOrMore => {
                let split = self.placeholder();
                self.emit_alternatives(&piece.alternatives);
                self.insts.push(Inst::Jmp(split));
                self.insts[split as usize] = Inst::Split(split + 1, self.pc());
            }
            Repeat::OneOrMore => {
                let body = self.pc();
                self.emit_alternatives(&piece.alternatives);
                let split = self.pc();
                self.insts.push(Inst::Split(body, split + 1));
            }
        }
    }

    /// Emit a split chain over the alternatives; each one falls through to
    /// the instruction after the chain
    fn emit_alternatives(&mut self, alternatives: &[Vec<ByteSet>]) {
        let mut exits = Vec::new();
        for (i, alternative) in alternatives.iter().enumerate() {
            let last = i + 1 == alternatives.len();
            let split = (!last).then(|| self.placeholder());
            for set in alternative {
                let id = self.intern(*set);
                self.insts.push(Inst::Byte(id));
            }
            if let Some(split) = split {
                exits.push(self.placeholder());
                self.insts[split as usize] = Inst::Split(split + 1, self.pc());
            }
        }
        let end = self.pc();
        for exit in exits {
            self.insts[exit as usize] = Inst::Jmp(end);
        }
    }

    fn placeholder(&mut self) -> u32 {
        let pc = self.pc();
        self.insts.push(Inst::Jmp(pc));
        pc
    }
}

//! Keyword collection
//!
//! A [`Parser`] accumulates keywords, each tagged with a caller-chosen label,
//! and compiles them together into one [`Program`]. Every keyword is fully
//! checked when it is added, so program creation only fails on an empty
//! parser or on format limits.

use crate::byteset::ByteSet;
use crate::encoding::Encoding;
use crate::error::{LightgrepError, Result};
use crate::options::{KeyOptions, ProgramOptions};
use crate::pattern::{self, Atom, Repeat};
use crate::program::Program;
use tracing::debug;

/// One pattern item lowered to byte-set sequences
#[derive(Debug, Clone)]
pub(crate) struct Piece {
    /// Any one of these byte-set sequences matches the item once
    pub alternatives: Vec<Vec<ByteSet>>,
    pub repeat: Repeat,
}

#[derive(Debug, Clone)]
pub(crate) struct Keyword {
    pub pieces: Vec<Piece>,
    pub label: u32,
}

/// Keyword collector
#[derive(Debug, Clone, Default)]
pub struct Parser {
    keywords: Vec<Keyword>,
    size_hint: usize,
}

impl Parser {
    /// Create a parser; `size_hint` pre-sizes the instruction buffer
    pub fn new(size_hint: u32) -> Self {
        Self {
            keywords: Vec::new(),
            size_hint: size_hint as usize,
        }
    }

    /// Add a keyword searched in `encoding`, reported with `label`
    pub fn add_keyword(
        &mut self,
        keyword: &str,
        label: u32,
        options: &KeyOptions,
        encoding: &str,
    ) -> Result<()> {
        let encoding = Encoding::from_name(encoding)?;
        let items = pattern::parse(keyword, options.fixed_string)?;

        let pieces = items
            .iter()
            .map(|item| -> Result<Piece> {
                let alternatives = match item.atom {
                    Atom::Char(c) => vec![encode_char(keyword, c, encoding, options)?],
                    Atom::Byte(b) => vec![vec![ByteSet::single(b)]],
                    Atom::Any => encoding.any_char(),
                };
                Ok(Piece {
                    alternatives,
                    repeat: item.repeat,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            keyword,
            label,
            encoding = encoding.name(),
            fixed_string = options.fixed_string,
            case_insensitive = options.case_insensitive,
            "added keyword"
        );
        self.keywords.push(Keyword { pieces, label });
        Ok(())
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Compile every keyword added so far into a program
    pub fn create_program(&self, options: &ProgramOptions) -> Result<Program> {
        Program::compile(&self.keywords, self.size_hint, options.determinize)
    }
}

/// Byte sets for one character; ASCII letters fold case per byte position
fn encode_char(
    keyword: &str,
    c: char,
    encoding: Encoding,
    options: &KeyOptions,
) -> Result<Vec<ByteSet>> {
    let unencodable = || {
        LightgrepError::keyword(
            keyword,
            format!("character {:?} cannot be encoded as {}", c, encoding.name()),
        )
    };
    let bytes = encoding.encode(c).ok_or_else(unencodable)?;
    let mut sets: Vec<ByteSet> = bytes.iter().map(|b| ByteSet::single(*b)).collect();

    if options.case_insensitive && c.is_ascii_alphabetic() {
        let other = if c.is_ascii_lowercase() {
            c.to_ascii_uppercase()
        } else {
            c.to_ascii_lowercase()
        };
        let folded = encoding.encode(other).ok_or_else(unencodable)?;
        if folded.len() == sets.len() {
            for (set, b) in sets.iter_mut().zip(folded) {
                set.insert(b);
            }
        }
    }
    Ok(sets)
}

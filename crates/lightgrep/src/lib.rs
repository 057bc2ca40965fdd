//! Lightgrep - multi-keyword streaming search
//!
//! Keywords are added to a [`Parser`], compiled into an immutable [`Program`],
//! and run over a byte stream by one or more [`Context`]s. Hits are reported
//! through a callback as `(start, end, label)` triples in logical stream
//! offsets, so a match may span any number of buffers.
//!
//! ```rust
//! use lightgrep::{Context, ContextOptions, KeyOptions, Parser, ProgramOptions};
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//!
//! let mut parser = Parser::new(0);
//! parser.add_keyword("fo+", 0, &KeyOptions::default(), "UTF-8")?;
//! let program = Arc::new(parser.create_program(&ProgramOptions::default())?);
//!
//! let mut ctx = Context::new(program, ContextOptions::default());
//! let mut hits = Vec::new();
//! ctx.search(b"a foo", 0, |hit| {
//!     hits.push(hit);
//!     ControlFlow::Continue(())
//! });
//! ctx.closeout(|hit| {
//!     hits.push(hit);
//!     ControlFlow::Continue(())
//! });
//! assert_eq!((hits[0].start, hits[0].end), (2, 5));
//! # Ok::<(), lightgrep::LightgrepError>(())
//! ```
//!
//! Programs serialize to a validated binary format ([`Program::to_bytes`],
//! [`Program::from_bytes`]). Foreign callers use the opaque-handle
//! [`c_api`].

mod byteset;
mod context;
mod encoding;
mod error;
mod format;
mod options;
mod parser;
mod pattern;
mod program;

pub mod c_api;
pub mod validation;

pub use byteset::ByteSet;
pub use context::{Context, SearchHit};
pub use encoding::Encoding;
pub use error::{LightgrepError, Result};
pub use format::{MAGIC, PROGRAM_FORMAT_VERSION};
pub use options::{ContextOptions, KeyOptions, ProgramOptions};
pub use parser::Parser;
pub use program::Program;
pub use validation::{validate_program, ProgramStats, ProgramValidationResult};

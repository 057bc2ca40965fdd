//! Option structures passed to the parser, program and context constructors.

/// Per-keyword options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOptions {
    /// Treat every character of the keyword literally (no pattern syntax)
    pub fixed_string: bool,
    /// Match ASCII letters regardless of case
    pub case_insensitive: bool,
}

/// Program construction options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Collapse jump chains in the compiled program
    pub determinize: bool,
}

/// Search context options
///
/// Positions in `trace_begin..=trace_end` get a `trace!` event per VM step.
/// The default puts both bounds at `u64::MAX`, which never fires in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    /// First logical offset to trace
    pub trace_begin: u64,
    /// Last logical offset to trace
    pub trace_end: u64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            trace_begin: u64::MAX,
            trace_end: u64::MAX,
        }
    }
}

impl ContextOptions {
    #[inline]
    pub(crate) fn traces(&self, pos: u64) -> bool {
        self.trace_begin <= pos && pos <= self.trace_end && self.trace_begin != u64::MAX
    }
}

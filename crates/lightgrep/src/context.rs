//! Streaming search contexts
//!
//! A [`Context`] runs a [`Program`] over a stream of buffers with a Pike VM.
//! Threads carry their keyword label and the logical offset they started
//! at, so matches can span buffer boundaries.
//!
//! Matching is leftmost-longest and non-overlapping per label. A match is
//! reported once no live thread of its label could still produce an earlier
//! or longer one. Hits settled by the same input byte are delivered in
//! `(start, end, label)` order.

use crate::options::ContextOptions;
use crate::program::{Inst, Program};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::trace;

/// A reported match, `start..end` in logical offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchHit {
    pub start: u64,
    pub end: u64,
    /// Label the keyword was added with
    pub label: u32,
}

/// Thread bookkeeping for one VM step
///
/// A thread at the same instruction as one started at its label's floor (the
/// earliest open start) can never produce a hit, since the floor thread
/// cannot be cut off by an earlier match. Threads behind a later start are
/// kept apart, as that start may still be cut off.
struct Frontier {
    floors: HashMap<u32, u64>,
    floor_pcs: HashSet<(u32, u32)>,
    visited: HashSet<(u32, u32, u64)>,
}

impl Frontier {
    fn new(floors: HashMap<u32, u64>) -> Self {
        Self {
            floors,
            floor_pcs: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// Record a thread at a `Byte` instruction; false if it is redundant
    fn admit(&mut self, thread: &Thread) -> bool {
        self.visited.insert((thread.pc, thread.label, thread.start));
        let at_floor = self
            .floors
            .get(&thread.label)
            .map_or(true, |&floor| thread.start <= floor);
        if at_floor {
            self.floor_pcs.insert((thread.pc, thread.label));
            true
        } else {
            !self.floor_pcs.contains(&(thread.pc, thread.label))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Thread {
    /// Always a `Byte` instruction
    pc: u32,
    label: u32,
    start: u64,
}

/// Search state over one program
#[derive(Debug)]
pub struct Context {
    program: Arc<Program>,
    options: ContextOptions,
    /// Ordered by start offset
    threads: Vec<Thread>,
    /// Per label: match start -> longest end seen so far
    candidates: BTreeMap<u32, BTreeMap<u64, u64>>,
}

impl Context {
    pub fn new(program: Arc<Program>, options: ContextOptions) -> Self {
        Self {
            program,
            options,
            threads: Vec::new(),
            candidates: BTreeMap::new(),
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Drop all stream state
    pub fn reset(&mut self) {
        self.threads.clear();
        self.candidates.clear();
    }

    /// Search `data`, whose first byte sits at logical offset `start_offset`
    ///
    /// Returns the earliest offset a still-open match may start at, or the
    /// end of the searched range when nothing is open. If `on_hit` breaks,
    /// the search stops at once and the context should be reset before reuse.
    pub fn search<F>(&mut self, data: &[u8], start_offset: u64, mut on_hit: F) -> u64
    where
        F: FnMut(SearchHit) -> ControlFlow<()>,
    {
        let mut pos = start_offset;
        for &byte in data {
            self.seed(pos);
            self.step(byte, pos);
            pos += 1;
            if self.settle(&mut on_hit).is_break() {
                break;
            }
        }
        self.resume_offset(pos)
    }

    /// Report every match still pending at end of input, then reset
    pub fn closeout<F>(&mut self, mut on_hit: F)
    where
        F: FnMut(SearchHit) -> ControlFlow<()>,
    {
        let mut hits = Vec::new();
        for (label, starts) in &self.candidates {
            let mut covered_until = 0u64;
            for (&start, &end) in starts {
                if start < covered_until || end <= start {
                    continue;
                }
                hits.push(SearchHit {
                    start,
                    end,
                    label: *label,
                });
                covered_until = end;
            }
        }
        self.reset();
        hits.sort_unstable();
        for hit in hits {
            trace!(start = hit.start, end = hit.end, label = hit.label, "closeout hit");
            if on_hit(hit).is_break() {
                break;
            }
        }
    }

    /// Report matches anchored at `start_offset` only
    ///
    /// Self-contained: the context is reset before and after.
    pub fn starts_with<F>(&mut self, data: &[u8], start_offset: u64, mut on_hit: F)
    where
        F: FnMut(SearchHit) -> ControlFlow<()>,
    {
        self.reset();
        self.seed(start_offset);
        let mut pos = start_offset;
        let mut aborted = false;
        for &byte in data {
            if self.threads.is_empty() {
                break;
            }
            self.step(byte, pos);
            pos += 1;
            if self.settle(&mut on_hit).is_break() {
                aborted = true;
                break;
            }
        }
        if aborted {
            self.reset();
        } else {
            self.closeout(on_hit);
        }
    }

    fn resume_offset(&self, end: u64) -> u64 {
        let thread_min = self.threads.iter().map(|t| t.start).min();
        let candidate_min = self
            .candidates
            .values()
            .filter_map(|starts| starts.keys().next().copied())
            .min();
        match (thread_min, candidate_min) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => end,
        }
    }

    /// Earliest start of any thread or pending match, per label
    fn floors(&self) -> HashMap<u32, u64> {
        let mut floors = HashMap::new();
        for thread in &self.threads {
            floors
                .entry(thread.label)
                .and_modify(|s: &mut u64| *s = (*s).min(thread.start))
                .or_insert(thread.start);
        }
        for (&label, starts) in &self.candidates {
            if let Some(&start) = starts.keys().next() {
                floors
                    .entry(label)
                    .and_modify(|s: &mut u64| *s = (*s).min(start))
                    .or_insert(start);
            }
        }
        floors
    }

    /// Start one thread per keyword at `pos`
    fn seed(&mut self, pos: u64) {
        let mut frontier = Frontier::new(self.floors());
        let mut threads = std::mem::take(&mut self.threads);
        for thread in &threads {
            frontier.admit(thread);
        }
        let program = Arc::clone(&self.program);
        for entry in &program.entries {
            self.follow(entry.pc, entry.label, pos, pos, &mut frontier, &mut threads);
        }
        self.threads = threads;
    }

    /// Consume `byte` at logical offset `pos`
    fn step(&mut self, byte: u8, pos: u64) {
        if self.options.traces(pos) {
            trace!(pos, byte, threads = self.threads.len(), "vm step");
        }
        let mut frontier = Frontier::new(self.floors());
        let current = std::mem::take(&mut self.threads);
        let mut next = Vec::with_capacity(current.len());
        for thread in current {
            let Inst::Byte(set) = self.program.insts[thread.pc as usize] else {
                continue;
            };
            if self.program.sets[set as usize].contains(byte) {
                self.follow(
                    thread.pc + 1,
                    thread.label,
                    thread.start,
                    pos + 1,
                    &mut frontier,
                    &mut next,
                );
            }
        }
        self.threads = next;
    }

    /// Epsilon closure from `pc`, recording matches that end at `pos`
    fn follow(
        &mut self,
        pc: u32,
        label: u32,
        start: u64,
        pos: u64,
        frontier: &mut Frontier,
        out: &mut Vec<Thread>,
    ) {
        let mut stack = vec![pc];
        while let Some(pc) = stack.pop() {
            if !frontier.visited.insert((pc, label, start)) {
                continue;
            }
            let inst = self.program.insts[pc as usize];
            match inst {
                // an empty match can never be reported
                Inst::Match if pos <= start => {}
                Inst::Match => {
                    let starts = self.candidates.entry(label).or_default();
                    let end = starts.entry(start).or_insert(pos);
                    *end = (*end).max(pos);
                }
                Inst::Byte(_) => {
                    let thread = Thread { pc, label, start };
                    if frontier.admit(&thread) {
                        out.push(thread);
                    }
                }
                Inst::Split(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                Inst::Jmp(a) => stack.push(a),
            }
        }
    }

    /// Deliver every candidate that can no longer be beaten
    fn settle<F>(&mut self, on_hit: &mut F) -> ControlFlow<()>
    where
        F: FnMut(SearchHit) -> ControlFlow<()>,
    {
        if self.candidates.is_empty() {
            return ControlFlow::Continue(());
        }

        let mut earliest_live: HashMap<u32, u64> = HashMap::new();
        for thread in &self.threads {
            earliest_live
                .entry(thread.label)
                .and_modify(|s| *s = (*s).min(thread.start))
                .or_insert(thread.start);
        }

        let mut hits = Vec::new();
        let mut cutoffs: HashMap<u32, u64> = HashMap::new();
        for (&label, starts) in self.candidates.iter_mut() {
            let live = earliest_live.get(&label).copied();
            while let Some((&start, &end)) = starts.iter().next() {
                if live.is_some_and(|live| live <= start) {
                    break;
                }
                if end <= start {
                    starts.remove(&start);
                    continue;
                }
                hits.push(SearchHit { start, end, label });
                cutoffs.insert(label, end);
                *starts = starts.split_off(&end);
            }
        }
        self.candidates.retain(|_, starts| !starts.is_empty());

        if !cutoffs.is_empty() {
            self.threads.retain(|t| {
                cutoffs
                    .get(&t.label)
                    .map_or(true, |&cutoff| t.start >= cutoff)
            });
        }

        hits.sort_unstable();
        for hit in hits {
            trace!(start = hit.start, end = hit.end, label = hit.label, "hit");
            on_hit(hit)?;
        }
        ControlFlow::Continue(())
    }
}

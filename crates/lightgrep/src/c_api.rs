//! C API for lightgrep
//!
//! Opaque-handle bindings over [`Parser`], [`Program`] and [`Context`].
//!
//! # Safety Guarantees
//!
//! - Null pointer checks on all inputs
//! - Panic catching at FFI boundaries
//! - Failures return 0 or NULL and leave a message for [`lg_last_error`]
//!
//! # Usage
//!
//! ```c
//! lg_parser* parser = lg_create_parser(0);
//! lg_key_options kopts = { .fixed_string = 0, .case_insensitive = 1 };
//! if (!lg_add_keyword(parser, "foo+", 4, 0, &kopts, "UTF-8")) {
//!     fprintf(stderr, "%s\n", lg_last_error());
//! }
//!
//! lg_program_options popts = { .determinize = 1 };
//! lg_program* prog = lg_create_program(parser, &popts);
//! lg_destroy_parser(parser);
//!
//! lg_context_options copts = { .trace_begin = UINT64_MAX, .trace_end = UINT64_MAX };
//! lg_context* ctx = lg_create_context(prog, &copts);
//! lg_search(ctx, buf, buf + len, 0, user_data, on_hit);
//! lg_closeout_search(ctx, user_data, on_hit);
//!
//! lg_destroy_context(ctx);
//! lg_destroy_program(prog);
//! ```
//!
//! A context keeps its own reference to the program, so the program handle
//! may be destroyed while contexts created from it are still in use.
//!
//! # Thread Safety
//!
//! Handles are not synchronized. Use each handle from one thread at a time.

#![allow(non_camel_case_types)]

use crate::context::{Context, SearchHit};
use crate::error::LightgrepError;
use crate::options::{ContextOptions, KeyOptions, ProgramOptions};
use crate::parser::Parser;
use crate::program::Program;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::ops::ControlFlow;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Arc;
use tracing::{error, warn};

/// Hit callback return value: keep searching
pub const LG_CONTINUE: c_int = 0;
/// Hit callback return value: stop the current call
pub const LG_ABORT: c_int = 1;

/// Opaque parser handle
#[repr(C)]
pub struct lg_parser {
    _private: [u8; 0],
}

/// Opaque program handle
#[repr(C)]
pub struct lg_program {
    _private: [u8; 0],
}

/// Opaque search context handle
#[repr(C)]
pub struct lg_context {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct lg_key_options {
    pub fixed_string: bool,
    pub case_insensitive: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct lg_program_options {
    pub determinize: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct lg_context_options {
    pub trace_begin: u64,
    pub trace_end: u64,
}

/// One match, `start..end` in logical offsets
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct lg_search_hit {
    pub start: u64,
    pub end: u64,
    pub keyword_index: u32,
}

/// Called once per hit; return [`LG_CONTINUE`] or [`LG_ABORT`]
pub type lg_hit_callback = unsafe extern "C" fn(user_data: *mut c_void, hit: *const lg_search_hit) -> c_int;

struct ParserInternal {
    parser: Parser,
}

struct ProgramInternal {
    program: Arc<Program>,
}

struct ContextInternal {
    context: Context,
}

impl lg_parser {
    fn from_internal(internal: Box<ParserInternal>) -> *mut Self {
        Box::into_raw(internal) as *mut Self
    }

    /// # Safety
    /// Pointer must have come from from_internal
    unsafe fn into_internal(ptr: *mut Self) -> Box<ParserInternal> {
        Box::from_raw(ptr as *mut ParserInternal)
    }

    /// # Safety
    /// Pointer must be valid and from from_internal
    unsafe fn as_internal<'a>(ptr: *const Self) -> &'a ParserInternal {
        &*(ptr as *const ParserInternal)
    }

    /// # Safety
    /// Pointer must be valid and from from_internal
    unsafe fn as_internal_mut<'a>(ptr: *mut Self) -> &'a mut ParserInternal {
        &mut *(ptr as *mut ParserInternal)
    }
}

impl lg_program {
    fn from_internal(internal: Box<ProgramInternal>) -> *mut Self {
        Box::into_raw(internal) as *mut Self
    }

    /// # Safety
    /// Pointer must have come from from_internal
    unsafe fn into_internal(ptr: *mut Self) -> Box<ProgramInternal> {
        Box::from_raw(ptr as *mut ProgramInternal)
    }

    /// # Safety
    /// Pointer must be valid and from from_internal
    unsafe fn as_internal<'a>(ptr: *const Self) -> &'a ProgramInternal {
        &*(ptr as *const ProgramInternal)
    }
}

impl lg_context {
    fn from_internal(internal: Box<ContextInternal>) -> *mut Self {
        Box::into_raw(internal) as *mut Self
    }

    /// # Safety
    /// Pointer must have come from from_internal
    unsafe fn into_internal(ptr: *mut Self) -> Box<ContextInternal> {
        Box::from_raw(ptr as *mut ContextInternal)
    }

    /// # Safety
    /// Pointer must be valid and from from_internal
    unsafe fn as_internal_mut<'a>(ptr: *mut Self) -> &'a mut ContextInternal {
        &mut *(ptr as *mut ContextInternal)
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    warn!(error = %message, "lightgrep C API call failed");
    // Interior NULs would truncate the message, so drop them
    let bytes: Vec<u8> = message.into_bytes().into_iter().filter(|b| *b != 0).collect();
    let message = CString::new(bytes).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Message from the last failed call on this thread, if any
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|message| message.to_string_lossy().into_owned())
    })
}

/// Run `f`, converting a panic into `fallback` plus a last-error message
fn ffi_guard<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(function = name, panic = %detail, "panic caught at C API boundary");
            set_last_error(format!("{} panicked: {}", name, detail));
            fallback
        }
    }
}

/// Build a byte slice from a `[begin, end)` pointer pair
///
/// # Safety
/// Both pointers must delimit one readable allocation, or both be NULL.
unsafe fn range<'a>(begin: *const u8, end: *const u8) -> Result<&'a [u8], String> {
    if begin.is_null() || end.is_null() {
        if begin == end {
            return Ok(&[]);
        }
        return Err("buffer pointer is NULL".to_string());
    }
    if end < begin {
        return Err("buffer end precedes buffer begin".to_string());
    }
    Ok(slice::from_raw_parts(begin, end.offset_from(begin) as usize))
}

/// Adapt a C callback to the engine's hit sink
fn sink(
    user_data: *mut c_void,
    callback: Option<lg_hit_callback>,
) -> impl FnMut(SearchHit) -> ControlFlow<()> {
    move |hit: SearchHit| {
        let Some(callback) = callback else {
            return ControlFlow::Continue(());
        };
        let hit = lg_search_hit {
            start: hit.start,
            end: hit.end,
            keyword_index: hit.label,
        };
        // SAFETY: the caller of the search function vouches for callback and user_data
        if unsafe { callback(user_data, &hit) } == LG_CONTINUE {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }
}

/// Create a keyword parser
///
/// `num_fsm_state_size_hint` pre-sizes the program; 0 is fine.
///
/// # Returns
/// * Non-null parser on success; free it with [`lg_destroy_parser`]
#[no_mangle]
pub extern "C" fn lg_create_parser(num_fsm_state_size_hint: u32) -> *mut lg_parser {
    ffi_guard("lg_create_parser", ptr::null_mut(), || {
        clear_last_error();
        lg_parser::from_internal(Box::new(ParserInternal {
            parser: Parser::new(num_fsm_state_size_hint),
        }))
    })
}

/// Free a parser; NULL is ignored
///
/// # Safety
/// * `parser` must be NULL or come from [`lg_create_parser`], and not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn lg_destroy_parser(parser: *mut lg_parser) {
    if parser.is_null() {
        return;
    }
    ffi_guard("lg_destroy_parser", (), || {
        drop(lg_parser::into_internal(parser));
    })
}

/// Add a keyword
///
/// # Parameters
/// * `keyword` / `keyword_len` - UTF-8 keyword text (not NUL-terminated)
/// * `keyword_index` - label reported in hits for this keyword
/// * `options` - keyword options
/// * `encoding` - NUL-terminated encoding name, e.g. `"UTF-8"`
///
/// # Returns
/// * 1 on success, 0 on failure (see [`lg_last_error`])
///
/// # Safety
/// * `parser` must come from [`lg_create_parser`]
/// * `keyword` must point to `keyword_len` readable bytes
/// * `options` must point to a valid [`lg_key_options`]
/// * `encoding` must be a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn lg_add_keyword(
    parser: *mut lg_parser,
    keyword: *const u8,
    keyword_len: usize,
    keyword_index: u32,
    options: *const lg_key_options,
    encoding: *const c_char,
) -> c_int {
    ffi_guard("lg_add_keyword", 0, || {
        clear_last_error();
        if parser.is_null() || keyword.is_null() || options.is_null() || encoding.is_null() {
            set_last_error("lg_add_keyword: NULL argument");
            return 0;
        }
        let bytes = slice::from_raw_parts(keyword, keyword_len);
        let Ok(text) = std::str::from_utf8(bytes) else {
            set_last_error(
                LightgrepError::keyword(&String::from_utf8_lossy(bytes), "keyword is not valid UTF-8")
                    .to_string(),
            );
            return 0;
        };
        let Ok(encoding) = CStr::from_ptr(encoding).to_str() else {
            set_last_error("encoding name is not valid UTF-8");
            return 0;
        };
        let options = &*options;
        let options = KeyOptions {
            fixed_string: options.fixed_string,
            case_insensitive: options.case_insensitive,
        };

        let internal = lg_parser::as_internal_mut(parser);
        match internal
            .parser
            .add_keyword(text, keyword_index, &options, encoding)
        {
            Ok(()) => 1,
            Err(e) => {
                set_last_error(e.to_string());
                0
            }
        }
    })
}

/// Compile the parser's keywords into a program
///
/// The parser stays valid and may be destroyed independently.
///
/// # Returns
/// * Non-null program on success; free it with [`lg_destroy_program`]
/// * NULL on failure (see [`lg_last_error`])
///
/// # Safety
/// * `parser` must come from [`lg_create_parser`]
/// * `options` must point to a valid [`lg_program_options`]
#[no_mangle]
pub unsafe extern "C" fn lg_create_program(
    parser: *const lg_parser,
    options: *const lg_program_options,
) -> *mut lg_program {
    ffi_guard("lg_create_program", ptr::null_mut(), || {
        clear_last_error();
        if parser.is_null() || options.is_null() {
            set_last_error("lg_create_program: NULL argument");
            return ptr::null_mut();
        }
        let options = ProgramOptions {
            determinize: (*options).determinize,
        };
        match lg_parser::as_internal(parser).parser.create_program(&options) {
            Ok(program) => lg_program::from_internal(Box::new(ProgramInternal {
                program: Arc::new(program),
            })),
            Err(e) => {
                set_last_error(e.to_string());
                ptr::null_mut()
            }
        }
    })
}

/// Serialized size of a program in bytes; 0 for NULL
///
/// # Safety
/// * `program` must be NULL or come from this API
#[no_mangle]
pub unsafe extern "C" fn lg_program_size(program: *const lg_program) -> u32 {
    if program.is_null() {
        return 0;
    }
    ffi_guard("lg_program_size", 0, || {
        lg_program::as_internal(program).program.serialized_size() as u32
    })
}

/// Serialize a program into `buffer`
///
/// # Safety
/// * `program` must come from this API
/// * `buffer` must have room for [`lg_program_size`] bytes
#[no_mangle]
pub unsafe extern "C" fn lg_write_program(program: *const lg_program, buffer: *mut u8) {
    if program.is_null() || buffer.is_null() {
        set_last_error("lg_write_program: NULL argument");
        return;
    }
    ffi_guard("lg_write_program", (), || {
        let bytes = lg_program::as_internal(program).program.to_bytes();
        ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
    })
}

/// Load a program written by [`lg_write_program`]
///
/// The buffer is validated before use and may be freed afterwards.
///
/// # Returns
/// * Non-null program on success
/// * NULL if the buffer is not a valid program (see [`lg_last_error`])
///
/// # Safety
/// * `buffer` must point to `size` readable bytes
#[no_mangle]
pub unsafe extern "C" fn lg_read_program(buffer: *const u8, size: u32) -> *mut lg_program {
    ffi_guard("lg_read_program", ptr::null_mut(), || {
        clear_last_error();
        if buffer.is_null() {
            set_last_error("lg_read_program: NULL buffer");
            return ptr::null_mut();
        }
        let bytes = slice::from_raw_parts(buffer, size as usize);
        match Program::from_bytes(bytes) {
            Ok(program) => lg_program::from_internal(Box::new(ProgramInternal {
                program: Arc::new(program),
            })),
            Err(e) => {
                set_last_error(e.to_string());
                ptr::null_mut()
            }
        }
    })
}

/// Free a program; NULL is ignored
///
/// # Safety
/// * `program` must be NULL or come from this API, and not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn lg_destroy_program(program: *mut lg_program) {
    if program.is_null() {
        return;
    }
    ffi_guard("lg_destroy_program", (), || {
        drop(lg_program::into_internal(program));
    })
}

/// Create a search context over a program
///
/// # Safety
/// * `program` must come from this API
/// * `options` must point to a valid [`lg_context_options`]
#[no_mangle]
pub unsafe extern "C" fn lg_create_context(
    program: *const lg_program,
    options: *const lg_context_options,
) -> *mut lg_context {
    ffi_guard("lg_create_context", ptr::null_mut(), || {
        clear_last_error();
        if program.is_null() || options.is_null() {
            set_last_error("lg_create_context: NULL argument");
            return ptr::null_mut();
        }
        let options = ContextOptions {
            trace_begin: (*options).trace_begin,
            trace_end: (*options).trace_end,
        };
        let program = Arc::clone(&lg_program::as_internal(program).program);
        lg_context::from_internal(Box::new(ContextInternal {
            context: Context::new(program, options),
        }))
    })
}

/// Free a context; NULL is ignored
///
/// # Safety
/// * `context` must be NULL or come from [`lg_create_context`], and not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn lg_destroy_context(context: *mut lg_context) {
    if context.is_null() {
        return;
    }
    ffi_guard("lg_destroy_context", (), || {
        drop(lg_context::into_internal(context));
    })
}

/// Discard all stream state
///
/// # Safety
/// * `context` must be NULL or come from [`lg_create_context`]
#[no_mangle]
pub unsafe extern "C" fn lg_reset_context(context: *mut lg_context) {
    if context.is_null() {
        return;
    }
    ffi_guard("lg_reset_context", (), || {
        lg_context::as_internal_mut(context).context.reset();
    })
}

/// Search `[begin, end)`, whose first byte is at logical `start_offset`
///
/// Hits go to `callback` in discovery order. Returning [`LG_ABORT`] stops
/// the search; reset the context before reusing it.
///
/// # Returns
/// * The earliest logical offset a still-open match may start at, or the
///   end of the range when none is open; 0 on failure
///
/// # Safety
/// * `context` must come from [`lg_create_context`]
/// * `begin`/`end` must delimit one readable buffer (both NULL for none)
/// * `callback`, if set, must be safe to call with `user_data`
#[no_mangle]
pub unsafe extern "C" fn lg_search(
    context: *mut lg_context,
    begin: *const u8,
    end: *const u8,
    start_offset: u64,
    user_data: *mut c_void,
    callback: Option<lg_hit_callback>,
) -> u64 {
    ffi_guard("lg_search", 0, || {
        clear_last_error();
        if context.is_null() {
            set_last_error("lg_search: NULL context");
            return 0;
        }
        let data = match range(begin, end) {
            Ok(data) => data,
            Err(e) => {
                set_last_error(e);
                return 0;
            }
        };
        lg_context::as_internal_mut(context)
            .context
            .search(data, start_offset, sink(user_data, callback))
    })
}

/// Report the matches still pending at end of input, then reset
///
/// # Safety
/// * `context` must come from [`lg_create_context`]
/// * `callback`, if set, must be safe to call with `user_data`
#[no_mangle]
pub unsafe extern "C" fn lg_closeout_search(
    context: *mut lg_context,
    user_data: *mut c_void,
    callback: Option<lg_hit_callback>,
) {
    if context.is_null() {
        set_last_error("lg_closeout_search: NULL context");
        return;
    }
    ffi_guard("lg_closeout_search", (), || {
        lg_context::as_internal_mut(context)
            .context
            .closeout(sink(user_data, callback));
    })
}

/// Report matches that begin exactly at `start_offset`
///
/// Leaves the context reset.
///
/// # Safety
/// Same as [`lg_search`].
#[no_mangle]
pub unsafe extern "C" fn lg_starts_with(
    context: *mut lg_context,
    begin: *const u8,
    end: *const u8,
    start_offset: u64,
    user_data: *mut c_void,
    callback: Option<lg_hit_callback>,
) {
    ffi_guard("lg_starts_with", (), || {
        clear_last_error();
        if context.is_null() {
            set_last_error("lg_starts_with: NULL context");
            return;
        }
        let data = match range(begin, end) {
            Ok(data) => data,
            Err(e) => {
                set_last_error(e);
                return;
            }
        };
        lg_context::as_internal_mut(context).context.starts_with(
            data,
            start_offset,
            sink(user_data, callback),
        );
    })
}

/// Last error message on this thread, or NULL
///
/// The string is valid until the next lightgrep call on this thread.
#[no_mangle]
pub extern "C" fn lg_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null(), |message| message.as_ptr())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn collect_hits(user_data: *mut c_void, hit: *const lg_search_hit) -> c_int {
        let hits = &mut *(user_data as *mut Vec<lg_search_hit>);
        hits.push(*hit);
        LG_CONTINUE
    }

    unsafe extern "C" fn abort_first(user_data: *mut c_void, _hit: *const lg_search_hit) -> c_int {
        *(user_data as *mut u32) += 1;
        LG_ABORT
    }

    unsafe fn program(keywords: &[&str]) -> *mut lg_program {
        let parser = lg_create_parser(0);
        let opts = lg_key_options::default();
        for (i, kw) in keywords.iter().enumerate() {
            assert_eq!(
                lg_add_keyword(parser, kw.as_ptr(), kw.len(), i as u32, &opts, c"ASCII".as_ptr()),
                1
            );
        }
        let prog = lg_create_program(parser, &lg_program_options::default());
        lg_destroy_parser(parser);
        assert!(!prog.is_null());
        prog
    }

    const NO_TRACE: lg_context_options = lg_context_options {
        trace_begin: u64::MAX,
        trace_end: u64::MAX,
    };

    #[test]
    fn test_search_through_handles() {
        unsafe {
            let prog = program(&["needle"]);
            let ctx = lg_create_context(prog, &NO_TRACE);
            // context outlives its program handle
            lg_destroy_program(prog);

            let data = b"haystack needle haystack";
            let mut hits: Vec<lg_search_hit> = Vec::new();
            let user = &mut hits as *mut Vec<lg_search_hit> as *mut c_void;
            let resume = lg_search(
                ctx,
                data.as_ptr(),
                data.as_ptr().add(data.len()),
                0,
                user,
                Some(collect_hits),
            );
            lg_closeout_search(ctx, user, Some(collect_hits));
            lg_destroy_context(ctx);

            assert_eq!(resume, data.len() as u64);
            assert_eq!(
                hits,
                vec![lg_search_hit {
                    start: 9,
                    end: 15,
                    keyword_index: 0
                }]
            );
        }
    }

    #[test]
    fn test_callback_abort() {
        unsafe {
            let prog = program(&["a"]);
            let ctx = lg_create_context(prog, &NO_TRACE);
            let data = b"aaaa";
            let mut calls = 0u32;
            lg_search(
                ctx,
                data.as_ptr(),
                data.as_ptr().add(data.len()),
                0,
                &mut calls as *mut u32 as *mut c_void,
                Some(abort_first),
            );
            assert_eq!(calls, 1);
            lg_destroy_context(ctx);
            lg_destroy_program(prog);
        }
    }

    #[test]
    fn test_errors_are_reported() {
        unsafe {
            let parser = lg_create_parser(0);
            let opts = lg_key_options::default();
            let kw = b"a**";
            assert_eq!(
                lg_add_keyword(parser, kw.as_ptr(), kw.len(), 0, &opts, c"ASCII".as_ptr()),
                0
            );
            assert!(last_error().unwrap().contains("dangling quantifier"));
            assert!(!lg_last_error().is_null());

            assert!(lg_create_program(parser, &lg_program_options::default()).is_null());
            assert!(last_error().unwrap().contains("no keywords"));
            lg_destroy_parser(parser);

            let junk = [0u8; 40];
            assert!(lg_read_program(junk.as_ptr(), junk.len() as u32).is_null());
            assert!(last_error().unwrap().contains("invalid program"));
        }
    }

    #[test]
    fn test_program_round_trip() {
        unsafe {
            let prog = program(&["abc", "b+"]);
            let size = lg_program_size(prog);
            let mut buf = vec![0u8; size as usize];
            lg_write_program(prog, buf.as_mut_ptr());
            let copy = lg_read_program(buf.as_ptr(), size);
            assert!(!copy.is_null());
            assert_eq!(lg_program_size(copy), size);
            lg_destroy_program(prog);
            lg_destroy_program(copy);
        }
    }

    #[test]
    fn test_null_handles_are_harmless() {
        unsafe {
            lg_destroy_parser(ptr::null_mut());
            lg_destroy_program(ptr::null_mut());
            lg_destroy_context(ptr::null_mut());
            lg_reset_context(ptr::null_mut());
            assert_eq!(lg_program_size(ptr::null()), 0);
            assert_eq!(
                lg_search(ptr::null_mut(), ptr::null(), ptr::null(), 0, ptr::null_mut(), None),
                0
            );
        }
    }
}

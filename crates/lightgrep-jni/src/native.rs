//! Owning wrappers over the engine's opaque-handle C API
//!
//! Each wrapper frees its native handle on drop. Failures come back as the
//! engine's own message from `lg_last_error`.

use lightgrep::c_api::{
    self, lg_context, lg_context_options, lg_hit_callback, lg_key_options, lg_parser, lg_program,
    lg_program_options,
};
use std::ffi::{c_void, CString};
use std::ptr::NonNull;

fn engine_error(fallback: &str) -> String {
    c_api::last_error().unwrap_or_else(|| fallback.to_string())
}

pub struct NativeParser(NonNull<lg_parser>);

// SAFETY: a parser is only reached through its registry mutex, so one
// thread at a time uses it; the engine keeps no thread-affine state.
unsafe impl Send for NativeParser {}

impl NativeParser {
    pub fn create(size_hint: u32) -> Result<Self, String> {
        NonNull::new(c_api::lg_create_parser(size_hint))
            .map(NativeParser)
            .ok_or_else(|| engine_error("could not create parser"))
    }

    pub fn add_keyword(
        &mut self,
        keyword: &str,
        keyword_index: u32,
        fixed_string: bool,
        case_insensitive: bool,
        encoding: &str,
    ) -> Result<(), String> {
        let encoding = CString::new(encoding)
            .map_err(|_| format!("encoding name {:?} contains NUL", encoding))?;
        let options = lg_key_options {
            fixed_string,
            case_insensitive,
        };
        // SAFETY: every pointer is valid for the duration of the call
        let ok = unsafe {
            c_api::lg_add_keyword(
                self.0.as_ptr(),
                keyword.as_ptr(),
                keyword.len(),
                keyword_index,
                &options,
                encoding.as_ptr(),
            )
        };
        if ok == 1 {
            Ok(())
        } else {
            Err(engine_error("could not add keyword"))
        }
    }

    pub fn create_program(&self, determinize: bool) -> Result<NativeProgram, String> {
        let options = lg_program_options { determinize };
        // SAFETY: the parser handle is live while self is
        let program = unsafe { c_api::lg_create_program(self.0.as_ptr(), &options) };
        NonNull::new(program)
            .map(NativeProgram)
            .ok_or_else(|| engine_error("could not create program"))
    }
}

impl Drop for NativeParser {
    fn drop(&mut self) {
        // SAFETY: the handle came from lg_create_parser and is freed once
        unsafe { c_api::lg_destroy_parser(self.0.as_ptr()) }
    }
}

pub struct NativeProgram(NonNull<lg_program>);

// SAFETY: a program is immutable after creation, so shared use from any
// thread only reads it.
unsafe impl Send for NativeProgram {}
unsafe impl Sync for NativeProgram {}

impl NativeProgram {
    /// Load a serialized program from `len` bytes at `bytes`
    ///
    /// # Safety
    /// `bytes` must be readable for `len` bytes for the duration of the call.
    pub unsafe fn read(bytes: *const u8, len: u32) -> Result<Self, String> {
        NonNull::new(c_api::lg_read_program(bytes, len))
            .map(NativeProgram)
            .ok_or_else(|| engine_error("could not read program"))
    }

    pub fn size(&self) -> u32 {
        // SAFETY: the program handle is live while self is
        unsafe { c_api::lg_program_size(self.0.as_ptr()) }
    }

    /// Serialize into `dest`
    ///
    /// # Safety
    /// `dest` must be writable for [`NativeProgram::size`] bytes.
    pub unsafe fn write(&self, dest: *mut u8) {
        c_api::lg_write_program(self.0.as_ptr(), dest)
    }

    /// Create a context with tracing disabled
    pub fn create_context(&self) -> Result<NativeContext, String> {
        let options = lg_context_options {
            trace_begin: u64::MAX,
            trace_end: u64::MAX,
        };
        // SAFETY: the program handle is live while self is
        let context = unsafe { c_api::lg_create_context(self.0.as_ptr(), &options) };
        NonNull::new(context)
            .map(NativeContext)
            .ok_or_else(|| engine_error("could not create context"))
    }
}

impl Drop for NativeProgram {
    fn drop(&mut self) {
        // SAFETY: the handle came from the C API and is freed once
        unsafe { c_api::lg_destroy_program(self.0.as_ptr()) }
    }
}

pub struct NativeContext(NonNull<lg_context>);

// SAFETY: see NativeParser
unsafe impl Send for NativeContext {}

impl NativeContext {
    pub fn reset(&mut self) {
        // SAFETY: the context handle is live while self is
        unsafe { c_api::lg_reset_context(self.0.as_ptr()) }
    }

    /// # Safety
    /// `data` must be readable for `len` bytes, and `callback` must accept
    /// `user_data`, for the duration of the call.
    pub unsafe fn search(
        &mut self,
        data: *const u8,
        len: usize,
        start_offset: u64,
        user_data: *mut c_void,
        callback: lg_hit_callback,
    ) -> u64 {
        c_api::lg_search(
            self.0.as_ptr(),
            data,
            data.add(len),
            start_offset,
            user_data,
            Some(callback),
        )
    }

    /// # Safety
    /// `callback` must accept `user_data` for the duration of the call.
    pub unsafe fn closeout(&mut self, user_data: *mut c_void, callback: lg_hit_callback) {
        c_api::lg_closeout_search(self.0.as_ptr(), user_data, Some(callback))
    }

    /// # Safety
    /// Same as [`NativeContext::search`].
    pub unsafe fn starts_with(
        &mut self,
        data: *const u8,
        len: usize,
        start_offset: u64,
        user_data: *mut c_void,
        callback: lg_hit_callback,
    ) {
        c_api::lg_starts_with(
            self.0.as_ptr(),
            data,
            data.add(len),
            start_offset,
            user_data,
            Some(callback),
        )
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        // SAFETY: the handle came from lg_create_context and is freed once
        unsafe { c_api::lg_destroy_context(self.0.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_carry_message() {
        let mut parser = NativeParser::create(0).unwrap();
        let err = parser
            .add_keyword("ab\\q", 0, false, false, "UTF-8")
            .unwrap_err();
        assert!(err.contains("unknown escape"), "{}", err);

        let err = parser.create_program(false).err().unwrap();
        assert!(err.contains("no keywords"), "{}", err);
    }

    #[test]
    fn test_program_outlives_parser() {
        let mut parser = NativeParser::create(0).unwrap();
        parser.add_keyword("abc", 3, false, false, "ASCII").unwrap();
        let program = parser.create_program(true).unwrap();
        drop(parser);
        assert!(program.size() > 0);
        assert!(program.create_context().is_ok());
    }
}

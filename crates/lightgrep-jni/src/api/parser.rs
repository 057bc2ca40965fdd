//! `ParserHandle` native methods

use super::Bridge;
use crate::error::{BridgeError, Result};
use crate::exception::{check, guard};
use crate::host::{class_names, HostEnv};
use crate::native::NativeParser;
use crate::registry::lock;
use crate::validate::{non_negative, require};
use tracing::debug;

impl<H: HostEnv> Bridge<'_, H> {
    /// `static void init(Class)`
    pub fn parser_init(&self, class: &H::Class) {
        guard(self.host, "ParserHandle.init", (), || {
            self.bindings.bind_parser_handle(self.host, class)
        })
    }

    /// `static long create(int numFsmStateSizeHint)`; 0 on failure
    pub fn parser_create(&self, num_fsm_state_size_hint: i32) -> i64 {
        guard(self.host, "ParserHandle.create", 0, || {
            non_negative("numFsmStateSizeHint", num_fsm_state_size_hint)?;
            let parser =
                NativeParser::create(num_fsm_state_size_hint as u32).map_err(BridgeError::Keyword)?;
            let token = self.handles.parsers.insert(parser.into());
            debug!(token, "created parser");
            Ok(token)
        })
    }

    /// `void destroy()`
    pub fn parser_destroy(&self, this: &H::Object) {
        guard(self.host, "ParserHandle.destroy", (), || {
            let class = self.bindings.parser()?;
            self.destroy(this, class.pointer, &self.handles.parsers, "parser");
            Ok(())
        })
    }

    /// `int addKeyword(String keyword, int keyIndex, KeyOptions options, String encoding)`
    ///
    /// 1 on success, 0 on failure.
    pub fn parser_add_keyword(
        &self,
        this: &H::Object,
        keyword: Option<&H::Object>,
        key_index: i32,
        options: Option<&H::Object>,
        encoding: Option<&H::Object>,
    ) -> i32 {
        guard(self.host, "ParserHandle.addKeyword", 0, || {
            let keyword = require("keyword", keyword)?;
            non_negative("keyIndex", key_index)?;
            let options = require("options", options)?;
            let encoding = require("encoding", encoding)?;

            let class = self.bindings.parser()?;
            let parser = self
                .handles
                .parsers
                .get(self.host.get_long(this, class.pointer))?;

            let key_options = self.bindings.key_options()?;
            let fixed_string = self.host.get_bool(options, key_options.fixed_string);
            let case_insensitive = self.host.get_bool(options, key_options.case_insensitive);
            check(self.host)?;

            let keyword = self.host_string("keyword", keyword)?;
            let encoding = self.host_string("encoding", encoding)?;

            lock(&parser)?
                .add_keyword(
                    &keyword,
                    key_index as u32,
                    fixed_string,
                    case_insensitive,
                    &encoding,
                )
                .map_err(BridgeError::Keyword)?;
            Ok(1)
        })
    }

    /// Decode a host string; unpaired surrogates are a keyword error
    fn host_string(&self, name: &str, string: &H::Object) -> Result<String> {
        let units = self
            .host
            .string_utf16(string)
            .ok_or(BridgeError::PendingException)?;
        String::from_utf16(&units)
            .map_err(|_| BridgeError::Keyword(format!("{} is not valid UTF-16", name)))
    }

    /// `ProgramHandle createProgram(ProgramOptions options)`; null on failure
    pub fn parser_create_program(
        &self,
        this: &H::Object,
        options: Option<&H::Object>,
    ) -> Option<H::Object> {
        guard(self.host, "ParserHandle.createProgram", None, || {
            let options = require("options", options)?;

            let class = self.bindings.parser()?;
            let parser = self
                .handles
                .parsers
                .get(self.host.get_long(this, class.pointer))?;

            let program_options = self.bindings.program_options()?;
            let determinize = self.host.get_bool(options, program_options.determinize);
            check(self.host)?;

            let handle_class = self.bindings.program()?;
            let program = lock(&parser)?
                .create_program(determinize)
                .map_err(BridgeError::Keyword)?;
            let token = self.handles.programs.insert(program);
            self.new_handle(
                class_names::PROGRAM_HANDLE,
                handle_class.ctor,
                &self.handles.programs,
                token,
            )
            .map(Some)
        })
    }
}

//! `ProgramHandle` native methods

use super::Bridge;
use crate::error::{BridgeError, Result};
use crate::exception::guard;
use crate::host::{class_names, HostEnv, PinMode};
use crate::native::NativeProgram;
use crate::pin::Pinned;
use crate::validate::{check_array_capacity, non_negative, require};
use std::sync::Arc;

impl<H: HostEnv> Bridge<'_, H> {
    /// `static void init(Class)`
    pub fn program_init(&self, class: &H::Class) {
        guard(self.host, "ProgramHandle.init", (), || {
            self.bindings.bind_program_handle(self.host, class)
        })
    }

    fn program_of(&self, this: &H::Object) -> Result<Arc<NativeProgram>> {
        let class = self.bindings.program()?;
        self.handles
            .programs
            .get(self.host.get_long(this, class.pointer))
    }

    /// `void destroy()`
    pub fn program_destroy(&self, this: &H::Object) {
        guard(self.host, "ProgramHandle.destroy", (), || {
            let class = self.bindings.program()?;
            self.destroy(this, class.pointer, &self.handles.programs, "program");
            Ok(())
        })
    }

    /// `int size()`; -1 on failure
    pub fn program_size(&self, this: &H::Object) -> i32 {
        guard(self.host, "ProgramHandle.size", -1, || {
            let program = self.program_of(this)?;
            i32::try_from(program.size())
                .map_err(|_| BridgeError::Program("program size exceeds int range".to_string()))
        })
    }

    /// `void write(byte[] buffer, int offset)`
    pub fn program_write(&self, this: &H::Object, buffer: Option<&H::Object>, offset: i32) {
        guard(self.host, "ProgramHandle.write", (), || {
            let buffer = require("buffer", buffer)?;
            non_negative("offset", offset)?;

            let program = self.program_of(this)?;
            check_array_capacity(
                self.host,
                "buffer",
                buffer,
                "offset",
                offset,
                "program size",
                i64::from(program.size()),
            )?;

            let pinned = Pinned::new(self.host, buffer, PinMode::CopyBack)?;
            // SAFETY: the capacity check leaves room for size() bytes at offset
            unsafe { program.write(pinned.at(offset)) };
            Ok(())
        })
    }

    /// `static ProgramHandle read(byte[] buffer, int offset, int size)`; null on failure
    pub fn program_read(
        &self,
        buffer: Option<&H::Object>,
        offset: i32,
        size: i32,
    ) -> Option<H::Object> {
        guard(self.host, "ProgramHandle.read", None, || {
            let buffer = require("buffer", buffer)?;
            non_negative("offset", offset)?;
            non_negative("size", size)?;
            check_array_capacity(
                self.host,
                "buffer",
                buffer,
                "offset",
                offset,
                "size",
                i64::from(size),
            )?;

            let handle_class = self.bindings.program()?;
            let program = {
                let pinned = Pinned::new(self.host, buffer, PinMode::Discard)?;
                // SAFETY: the capacity check keeps [offset, offset + size) inside the array
                unsafe { NativeProgram::read(pinned.at(offset), size as u32) }
                    .map_err(BridgeError::Program)?
            };
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

    /// `ContextHandle createContext(ContextOptions options)`; null on failure
    pub fn program_create_context(
        &self,
        this: &H::Object,
        options: Option<&H::Object>,
    ) -> Option<H::Object> {
        guard(self.host, "ProgramHandle.createContext", None, || {
            require("options", options)?;
            let program = self.program_of(this)?;
            self.bindings.context_options()?;
            let handle_class = self.bindings.context()?;

            let context = program.create_context().map_err(BridgeError::Program)?;
            let token = self.handles.contexts.insert(context.into());
            self.new_handle(
                class_names::CONTEXT_HANDLE,
                handle_class.ctor,
                &self.handles.contexts,
                token,
            )
            .map(Some)
        })
    }
}

//! Entry points
//!
//! One method per host native method. Each runs inside
//! [`crate::exception::guard`] and returns the host-visible sentinel on
//! failure. Argument checks run in a fixed order before any handle is
//! touched.

mod context;
mod parser;
mod program;

use crate::error::{BridgeError, Result};
use crate::host::{HostEnv, HostValue};
use crate::lifecycle::Bindings;
use crate::registry::{HandleRegistry, HandleTable};
use tracing::debug;

/// The bridge as seen from one host thread
pub struct Bridge<'a, H: HostEnv> {
    host: &'a H,
    bindings: &'a Bindings<H>,
    handles: &'a HandleRegistry,
}

impl<'a, H: HostEnv> Bridge<'a, H> {
    pub fn new(host: &'a H, bindings: &'a Bindings<H>, handles: &'a HandleRegistry) -> Self {
        Self {
            host,
            bindings,
            handles,
        }
    }

    pub fn host(&self) -> &'a H {
        self.host
    }

    /// Load-time binding, from the module load hook
    pub fn on_load(&self) -> Result<()> {
        self.bindings.on_load(self.host)
    }

    /// Static initializer of `KeyOptions`
    pub fn key_options_init(&self, class: &H::Class) {
        crate::exception::guard(self.host, "KeyOptions.init", (), || {
            self.bindings.bind_key_options(self.host, class)
        })
    }

    /// Static initializer of `ProgramOptions`
    pub fn program_options_init(&self, class: &H::Class) {
        crate::exception::guard(self.host, "ProgramOptions.init", (), || {
            self.bindings.bind_program_options(self.host, class)
        })
    }

    /// Static initializer of `ContextOptions`
    pub fn context_options_init(&self, class: &H::Class) {
        crate::exception::guard(self.host, "ContextOptions.init", (), || {
            self.bindings.bind_context_options(self.host, class)
        })
    }

    /// Unregister the resource whose token `this` holds, then zero the field
    ///
    /// Safe to repeat: a zero token is left alone.
    fn destroy<T>(&self, this: &H::Object, pointer: H::FieldId, table: &HandleTable<T>, kind: &str) {
        let token = self.host.get_long(this, pointer);
        if token == 0 {
            return;
        }
        // The resource is freed here unless a call in flight still holds it
        if table.remove(token).is_some() {
            debug!(kind, token, "destroyed handle");
        }
        self.host.set_long(this, pointer, 0);
    }

    /// Wrap a freshly registered `token` in a new host handle object
    ///
    /// The class is looked up per call. If the object cannot be built the
    /// token is unregistered again, so nothing leaks.
    fn new_handle<T>(
        &self,
        class_name: &str,
        ctor: H::MethodId,
        table: &HandleTable<T>,
        token: i64,
    ) -> Result<H::Object> {
        let object = self.host.find_class(class_name).and_then(|class| {
            self.host
                .new_object(&class, ctor, &[HostValue::Long(token)])
        });
        match object {
            Some(object) => {
                debug!(class = class_name, token, "created handle");
                Ok(object)
            }
            None => {
                table.remove(token);
                Err(BridgeError::PendingException)
            }
        }
    }
}

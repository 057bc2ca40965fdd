//! Module Lifecycle and bound native identities
//!
//! Field and method IDs belong to one loaded version of a class, so each
//! host class binds its own identities from its static initializer and
//! re-binds after a reload. Entry points only read these slots; an empty
//! slot is an error, never a trigger for lazy lookup.
//!
//! `HitCallback` is an interface and cannot run an initializer, so it and
//! `SearchHit` are resolved once at load and kept loaded with global
//! references until unload.

use crate::error::{BridgeError, Result};
use crate::host::{class_names, HostEnv};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, warn};

const SEARCH_HIT_SIGNATURE: &str = "(Lcom/lightboxtechnologies/lightgrep/SearchHit;)V";

/// `ParserHandle`: the token field
pub struct ParserClass<H: HostEnv> {
    pub pointer: H::FieldId,
}

/// `ProgramHandle` / `ContextHandle`: the token field and `(J)V` constructor
pub struct HandleClass<H: HostEnv> {
    pub pointer: H::FieldId,
    pub ctor: H::MethodId,
}

pub struct KeyOptionsClass<H: HostEnv> {
    pub fixed_string: H::FieldId,
    pub case_insensitive: H::FieldId,
}

pub struct ProgramOptionsClass<H: HostEnv> {
    pub determinize: H::FieldId,
}

/// `ContextOptions` carries no fields the bridge reads
pub struct ContextOptionsClass;

/// Identities resolved at load time
pub struct RuntimeClasses<H: HostEnv> {
    pub hit_callback: H::GlobalClass,
    pub callback: H::MethodId,
    pub search_hit: H::GlobalClass,
    pub search_hit_ctor: H::MethodId,
    pub start: H::FieldId,
    pub end: H::FieldId,
    pub keyword_index: H::FieldId,
}

/// Process-wide registry of bound identities, one slot per host type
pub struct Bindings<H: HostEnv> {
    parser: ArcSwapOption<ParserClass<H>>,
    program: ArcSwapOption<HandleClass<H>>,
    context: ArcSwapOption<HandleClass<H>>,
    key_options: ArcSwapOption<KeyOptionsClass<H>>,
    program_options: ArcSwapOption<ProgramOptionsClass<H>>,
    context_options: ArcSwapOption<ContextOptionsClass>,
    runtime: ArcSwapOption<RuntimeClasses<H>>,
}

impl<H: HostEnv> Default for Bindings<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn loaded<T>(slot: &ArcSwapOption<T>, name: &'static str) -> Result<Arc<T>> {
    slot.load_full().ok_or(BridgeError::Unbound(name))
}

/// Store the outcome of a bind; a failed bind empties the slot
fn store<T>(slot: &ArcSwapOption<T>, name: &str, bound: Option<T>) -> Result<()> {
    match bound {
        Some(value) => {
            slot.store(Some(Arc::new(value)));
            debug!(class = name, "bound native identities");
            Ok(())
        }
        None => {
            slot.store(None);
            warn!(class = name, "binding native identities failed");
            Err(BridgeError::PendingException)
        }
    }
}

impl<H: HostEnv> Bindings<H> {
    pub fn new() -> Self {
        Self {
            parser: ArcSwapOption::empty(),
            program: ArcSwapOption::empty(),
            context: ArcSwapOption::empty(),
            key_options: ArcSwapOption::empty(),
            program_options: ArcSwapOption::empty(),
            context_options: ArcSwapOption::empty(),
            runtime: ArcSwapOption::empty(),
        }
    }

    fn handle_class(host: &H, class: &H::Class) -> Option<HandleClass<H>> {
        Some(HandleClass {
            ctor: host.method_id(class, "<init>", "(J)V")?,
            pointer: host.field_id(class, "Pointer", "J")?,
        })
    }

    pub fn bind_parser_handle(&self, host: &H, class: &H::Class) -> Result<()> {
        let bound = host
            .field_id(class, "Pointer", "J")
            .map(|pointer| ParserClass { pointer });
        store(&self.parser, "ParserHandle", bound)
    }

    pub fn bind_program_handle(&self, host: &H, class: &H::Class) -> Result<()> {
        store(&self.program, "ProgramHandle", Self::handle_class(host, class))
    }

    pub fn bind_context_handle(&self, host: &H, class: &H::Class) -> Result<()> {
        store(&self.context, "ContextHandle", Self::handle_class(host, class))
    }

    pub fn bind_key_options(&self, host: &H, class: &H::Class) -> Result<()> {
        let bound = (|| {
            Some(KeyOptionsClass {
                fixed_string: host.field_id(class, "FixedString", "Z")?,
                case_insensitive: host.field_id(class, "CaseInsensitive", "Z")?,
            })
        })();
        store(&self.key_options, "KeyOptions", bound)
    }

    pub fn bind_program_options(&self, host: &H, class: &H::Class) -> Result<()> {
        let bound = host
            .field_id(class, "Determinize", "Z")
            .map(|determinize| ProgramOptionsClass { determinize });
        store(&self.program_options, "ProgramOptions", bound)
    }

    pub fn bind_context_options(&self, _host: &H, _class: &H::Class) -> Result<()> {
        store(&self.context_options, "ContextOptions", Some(ContextOptionsClass))
    }

    /// Resolve and pin the load-time classes
    ///
    /// On failure nothing stays pinned and the lookup's exception is pending.
    pub fn on_load(&self, host: &H) -> Result<()> {
        let hit_callback = Self::pin(host, class_names::HIT_CALLBACK)?;
        let search_hit = match Self::pin(host, class_names::SEARCH_HIT) {
            Ok(class) => class,
            Err(err) => {
                host.unpin_class(hit_callback);
                return Err(err);
            }
        };

        let members = {
            let callback_class = host.global_as_class(&hit_callback);
            let hit_class = host.global_as_class(&search_hit);
            (|| {
                Some((
                    host.method_id(&callback_class, "callback", SEARCH_HIT_SIGNATURE)?,
                    host.method_id(&hit_class, "<init>", "(JJI)V")?,
                    host.field_id(&hit_class, "Start", "J")?,
                    host.field_id(&hit_class, "End", "J")?,
                    host.field_id(&hit_class, "KeywordIndex", "I")?,
                ))
            })()
        };

        let Some((callback, search_hit_ctor, start, end, keyword_index)) = members else {
            warn!("resolving load-time members failed");
            host.unpin_class(hit_callback);
            host.unpin_class(search_hit);
            return Err(BridgeError::PendingException);
        };

        let previous = self.runtime.swap(Some(Arc::new(RuntimeClasses {
            hit_callback,
            callback,
            search_hit,
            search_hit_ctor,
            start,
            end,
            keyword_index,
        })));
        if let Some(previous) = previous {
            Self::release(host, previous);
        }
        debug!("lightgrep bridge loaded");
        Ok(())
    }

    /// Release the load-time classes; without a host there is nothing to call
    pub fn on_unload(&self, host: Option<&H>) {
        let Some(host) = host else {
            return;
        };
        if let Some(runtime) = self.runtime.swap(None) {
            Self::release(host, runtime);
        }
        debug!("lightgrep bridge unloaded");
    }

    fn pin(host: &H, name: &str) -> Result<H::GlobalClass> {
        host.find_class(name)
            .and_then(|class| host.pin_class(&class))
            .ok_or(BridgeError::PendingException)
    }

    fn release(host: &H, runtime: Arc<RuntimeClasses<H>>) {
        match Arc::try_unwrap(runtime) {
            Ok(runtime) => {
                host.unpin_class(runtime.hit_callback);
                host.unpin_class(runtime.search_hit);
            }
            Err(_) => warn!("load-time classes still in use; leaving them pinned"),
        }
    }

    pub fn parser(&self) -> Result<Arc<ParserClass<H>>> {
        loaded(&self.parser, "ParserHandle")
    }

    pub fn program(&self) -> Result<Arc<HandleClass<H>>> {
        loaded(&self.program, "ProgramHandle")
    }

    pub fn context(&self) -> Result<Arc<HandleClass<H>>> {
        loaded(&self.context, "ContextHandle")
    }

    pub fn key_options(&self) -> Result<Arc<KeyOptionsClass<H>>> {
        loaded(&self.key_options, "KeyOptions")
    }

    pub fn program_options(&self) -> Result<Arc<ProgramOptionsClass<H>>> {
        loaded(&self.program_options, "ProgramOptions")
    }

    pub fn context_options(&self) -> Result<Arc<ContextOptionsClass>> {
        loaded(&self.context_options, "ContextOptions")
    }

    pub fn runtime(&self) -> Result<Arc<RuntimeClasses<H>>> {
        loaded(&self.runtime, "HitCallback")
    }
}

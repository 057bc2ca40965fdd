//! jlightgrep - JVM bridge for the lightgrep engine
//!
//! Exposes lightgrep's parser, program and context handles to
//! `com.lightboxtechnologies.lightgrep` without ever letting bad input from
//! Java crash the VM. Every native method follows the same path:
//!
//! 1. validate arguments ([`validate`])
//! 2. resolve the handle token ([`registry`])
//! 3. pin byte arrays for the duration of the call ([`pin`])
//! 4. call the engine, relaying hits through [`shim`]
//! 5. turn any failure into a Java exception and return a sentinel
//!    ([`exception`])
//!
//! The managed runtime is reached only through [`HostEnv`]. The JVM
//! implementation and the exported `Java_*` symbols live behind the `jni`
//! feature; `testing::MockHost` (feature `testing`) drives the same code in tests.

mod api;
mod native;

pub mod config;
pub mod error;
pub mod exception;
pub mod host;
pub mod lifecycle;
pub mod pin;
pub mod registry;
pub mod shim;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(feature = "jni")]
pub mod jni;

pub use api::Bridge;
pub use config::LogConfig;
pub use error::{BridgeError, Result};
pub use host::{class_names, HostEnv, HostValue, PinMode};
pub use lifecycle::Bindings;
pub use native::{NativeContext, NativeParser, NativeProgram};
pub use registry::HandleRegistry;

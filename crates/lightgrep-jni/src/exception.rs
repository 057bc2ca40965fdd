//! Exception Propagation Protocol
//!
//! Entry points run inside [`guard`]: an `Err` becomes a host exception and
//! the entry point returns its sentinel. An exception the host already has
//! pending is never replaced. If even raising fails, the host aborts.

use crate::error::{BridgeError, Result};
use crate::host::HostEnv;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

const FATAL_MESSAGE: &str = "lightgrep bridge could not raise an exception";

/// Surface `error` to the host
pub fn raise<H: HostEnv>(host: &H, error: &BridgeError) {
    let Some(class_name) = error.exception_class() else {
        return;
    };
    if host.exception_pending() {
        return;
    }
    // A failed lookup leaves its own exception (NoClassDefFoundError) pending
    let Some(class) = host.find_class(class_name) else {
        return;
    };
    if !host.throw_new(&class, &error.to_string()) {
        error!(class = class_name, error = %error, "failed to raise host exception");
        host.fatal_error(FATAL_MESSAGE);
    }
}

/// Fail with [`BridgeError::PendingException`] if a host call left one
pub fn check<H: HostEnv>(host: &H) -> Result<()> {
    if host.exception_pending() {
        Err(BridgeError::PendingException)
    } else {
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run one entry point body
///
/// Returns the body's value, or `sentinel` after raising the failure.
pub fn guard<H, T, F>(host: &H, entry: &'static str, sentinel: T, f: F) -> T
where
    H: HostEnv,
    F: FnOnce() -> Result<T>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(BridgeError::Panicked {
            entry,
            message: panic_message(payload.as_ref()),
        })
    });

    match outcome {
        Ok(value) => value,
        Err(err) => {
            match &err {
                BridgeError::Panicked { .. } => error!(entry, error = %err, "panic in entry point"),
                _ => debug!(entry, error = %err, "entry point failed"),
            }
            raise(host, &err);
            sentinel
        }
    }
}

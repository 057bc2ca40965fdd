//! Callback Shim
//!
//! The engine reports hits through a C callback. The shim turns each hit
//! into a host `SearchHit` and calls `HitCallback.callback` with it. The
//! first failure is recorded and the engine is told to stop; the entry
//! point surfaces it after the native call has returned.

use crate::error::{BridgeError, Result};
use crate::exception::panic_message;
use crate::host::{HostEnv, HostValue};
use crate::lifecycle::RuntimeClasses;
use lightgrep::c_api::{lg_search_hit, LG_ABORT, LG_CONTINUE};
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;

/// Per-call state handed to the engine as `user_data`
pub struct HitSink<'a, H: HostEnv> {
    host: &'a H,
    runtime: &'a RuntimeClasses<H>,
    callback: &'a H::Object,
    delivered: u64,
    failure: Option<BridgeError>,
}

impl<'a, H: HostEnv> HitSink<'a, H> {
    pub fn new(host: &'a H, runtime: &'a RuntimeClasses<H>, callback: &'a H::Object) -> Self {
        Self {
            host,
            runtime,
            callback,
            delivered: 0,
            failure: None,
        }
    }

    /// Pointer to pass as the engine's `user_data` alongside [`hit_shim::<H>`]
    pub fn user_data(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// The recorded failure, if any
    pub fn finish(self) -> Result<u64> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.delivered),
        }
    }

    fn deliver(&mut self, hit: &lg_search_hit) -> Result<()> {
        trace!(
            start = hit.start,
            end = hit.end,
            keyword_index = hit.keyword_index,
            "delivering hit"
        );
        let class = self.host.global_as_class(&self.runtime.search_hit);
        let object = self
            .host
            .new_object(
                &class,
                self.runtime.search_hit_ctor,
                &[
                    HostValue::Long(hit.start as i64),
                    HostValue::Long(hit.end as i64),
                    HostValue::Int(hit.keyword_index as i32),
                ],
            )
            .ok_or(BridgeError::PendingException)?;

        self.host
            .call_void(self.callback, self.runtime.callback, &object);
        self.host.delete_local(object);
        self.delivered += 1;

        if self.host.exception_pending() {
            return Err(BridgeError::PendingException);
        }
        Ok(())
    }
}

/// Engine callback for a [`HitSink<H>`]
///
/// # Safety
/// `user_data` must come from [`HitSink::user_data`] on a sink of the same
/// `H` that outlives the native call, and `hit` must be valid.
pub unsafe extern "C" fn hit_shim<H: HostEnv>(
    user_data: *mut c_void,
    hit: *const lg_search_hit,
) -> c_int {
    if user_data.is_null() || hit.is_null() {
        return LG_ABORT;
    }
    let sink = &mut *(user_data as *mut HitSink<'_, H>);
    if sink.failure.is_some() {
        return LG_ABORT;
    }
    let hit = &*hit;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(hit)))
        .unwrap_or_else(|payload| {
            Err(BridgeError::Panicked {
                entry: "HitCallback.callback",
                message: panic_message(payload.as_ref()),
            })
        });
    match outcome {
        Ok(()) => LG_CONTINUE,
        Err(err) => {
            sink.failure = Some(err);
            LG_ABORT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    fn hit(start: u64, end: u64, keyword_index: u32) -> lg_search_hit {
        lg_search_hit {
            start,
            end,
            keyword_index,
        }
    }

    #[test]
    fn test_hits_reach_callback_in_order() {
        let harness = Harness::new();
        let runtime = harness.bindings.runtime().unwrap();
        let callback = harness.host.new_callback();
        let mut sink = HitSink::new(&harness.host, &runtime, &callback);
        let user_data = sink.user_data();

        for h in [hit(5, 10, 0), hit(20, 25, 1)] {
            assert_eq!(unsafe { hit_shim::<crate::testing::MockHost>(user_data, &h) }, LG_CONTINUE);
        }
        assert_eq!(sink.finish(), Ok(2));
        assert_eq!(harness.host.hits(&callback), vec![(5, 10, 0), (20, 25, 1)]);
        assert_eq!(harness.host.live_hits(), 0);
    }

    #[test]
    fn test_callback_exception_aborts() {
        let harness = Harness::new();
        let runtime = harness.bindings.runtime().unwrap();
        let callback = harness
            .host
            .new_callback_with(|host, _| host.throw("java/lang/IllegalArgumentException", "stop"));
        let mut sink = HitSink::new(&harness.host, &runtime, &callback);
        let user_data = sink.user_data();

        let first = hit(0, 1, 0);
        let second = hit(1, 2, 0);
        unsafe {
            assert_eq!(hit_shim::<crate::testing::MockHost>(user_data, &first), LG_ABORT);
            assert_eq!(hit_shim::<crate::testing::MockHost>(user_data, &second), LG_ABORT);
        }
        assert_eq!(sink.finish(), Err(BridgeError::PendingException));
        assert_eq!(harness.host.hits(&callback).len(), 1);
    }

    #[test]
    fn test_hit_allocation_failure_aborts() {
        let harness = Harness::new();
        let runtime = harness.bindings.runtime().unwrap();
        let callback = harness.host.new_callback();
        harness.host.fail_hit_allocation_after(1);
        let mut sink = HitSink::new(&harness.host, &runtime, &callback);
        let user_data = sink.user_data();

        let h = hit(0, 1, 0);
        unsafe {
            assert_eq!(hit_shim::<crate::testing::MockHost>(user_data, &h), LG_CONTINUE);
            assert_eq!(hit_shim::<crate::testing::MockHost>(user_data, &h), LG_ABORT);
        }
        assert_eq!(sink.delivered(), 1);
        assert_eq!(sink.finish(), Err(BridgeError::PendingException));
        assert_eq!(
            harness.host.pending_exception().map(|(class, _)| class),
            Some("java/lang/OutOfMemoryError".to_string())
        );
    }
}

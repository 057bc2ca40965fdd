//! `ContextHandle` native methods

use super::Bridge;
use crate::error::Result;
use crate::exception::guard;
use crate::host::{HostEnv, PinMode};
use crate::native::NativeContext;
use crate::pin::Pinned;
use crate::registry::lock;
use crate::shim::{hit_shim, HitSink};
use crate::validate::{check_array_capacity, non_negative, require};
use std::ffi::c_void;
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// Arguments shared by `search` and `startsWith`
struct Scan<'o, O> {
    buffer: &'o O,
    offset: i32,
    size: i32,
    start_offset: u64,
    callback: &'o O,
}

impl<H: HostEnv> Bridge<'_, H> {
    /// `static void init(Class)`
    pub fn context_init(&self, class: &H::Class) {
        guard(self.host, "ContextHandle.init", (), || {
            self.bindings.bind_context_handle(self.host, class)
        })
    }

    fn context_of(&self, this: &H::Object) -> Result<Arc<Mutex<NativeContext>>> {
        let class = self.bindings.context()?;
        self.handles
            .contexts
            .get(self.host.get_long(this, class.pointer))
    }

    /// `void destroy()`
    pub fn context_destroy(&self, this: &H::Object) {
        guard(self.host, "ContextHandle.destroy", (), || {
            let class = self.bindings.context()?;
            self.destroy(this, class.pointer, &self.handles.contexts, "context");
            Ok(())
        })
    }

    /// `void reset()`
    pub fn context_reset(&self, this: &H::Object) {
        guard(self.host, "ContextHandle.reset", (), || {
            let context = self.context_of(this)?;
            lock(&context)?.reset();
            Ok(())
        })
    }

    /// Validate in the order the host API documents: buffer, offset, size,
    /// capacity, startOffset, callback
    fn scan_args<'o>(
        &self,
        buffer: Option<&'o H::Object>,
        offset: i32,
        size: i32,
        start_offset: i64,
        callback: Option<&'o H::Object>,
    ) -> Result<Scan<'o, H::Object>> {
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
        non_negative("startOffset", start_offset)?;
        let callback = require("callback", callback)?;
        Ok(Scan {
            buffer,
            offset,
            size,
            start_offset: start_offset as u64,
            callback,
        })
    }

    /// Run `f` against the pinned scan range with a fresh hit sink
    ///
    /// A failed hit delivery resets the context, since the engine stopped
    /// partway through the stream.
    fn run_scan<T>(
        &self,
        this: &H::Object,
        scan: Scan<'_, H::Object>,
        f: impl FnOnce(&mut NativeContext, *const u8, usize, u64, *mut c_void) -> T,
    ) -> Result<T> {
        let context = self.context_of(this)?;
        let runtime = self.bindings.runtime()?;
        let mut native = lock(&context)?;

        let pinned = Pinned::new(self.host, scan.buffer, PinMode::Discard)?;
        let mut sink = HitSink::new(self.host, &runtime, scan.callback);
        let value = f(
            &mut *native,
            pinned.at(scan.offset),
            scan.size as usize,
            scan.start_offset,
            sink.user_data(),
        );
        drop(pinned);

        trace!(delivered = sink.delivered(), "scan finished");
        if let Err(err) = sink.finish() {
            warn!(error = %err, "hit delivery failed; resetting context");
            native.reset();
            return Err(err);
        }
        Ok(value)
    }

    /// `long search(byte[] buffer, int offset, int size, long startOffset, HitCallback callback)`
    ///
    /// Returns the resume offset, 0 on failure.
    pub fn context_search(
        &self,
        this: &H::Object,
        buffer: Option<&H::Object>,
        offset: i32,
        size: i32,
        start_offset: i64,
        callback: Option<&H::Object>,
    ) -> i64 {
        guard(self.host, "ContextHandle.search", 0, || {
            let scan = self.scan_args(buffer, offset, size, start_offset, callback)?;
            let resume = self.run_scan(this, scan, |native, data, len, start, sink| {
                // SAFETY: data is pinned for len bytes and the sink outlives the call
                unsafe { native.search(data, len, start, sink, hit_shim::<H>) }
            })?;
            Ok(resume as i64)
        })
    }

    /// `void closeoutSearch(HitCallback callback)`
    pub fn context_closeout_search(&self, this: &H::Object, callback: Option<&H::Object>) {
        guard(self.host, "ContextHandle.closeoutSearch", (), || {
            let callback = require("callback", callback)?;
            let context = self.context_of(this)?;
            let runtime = self.bindings.runtime()?;
            let mut native = lock(&context)?;

            let mut sink = HitSink::new(self.host, &runtime, callback);
            // SAFETY: sink outlives the call
            unsafe { native.closeout(sink.user_data(), hit_shim::<H>) };
            if let Err(err) = sink.finish() {
                native.reset();
                return Err(err);
            }
            Ok(())
        })
    }

    /// `void startsWith(byte[] buffer, int offset, int size, long startOffset, HitCallback callback)`
    pub fn context_starts_with(
        &self,
        this: &H::Object,
        buffer: Option<&H::Object>,
        offset: i32,
        size: i32,
        start_offset: i64,
        callback: Option<&H::Object>,
    ) {
        guard(self.host, "ContextHandle.startsWith", (), || {
            let scan = self.scan_args(buffer, offset, size, start_offset, callback)?;
            self.run_scan(this, scan, |native, data, len, start, sink| {
                // SAFETY: data is pinned for len bytes and the sink outlives the call
                unsafe { native.starts_with(data, len, start, sink, hit_shim::<H>) }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;

    #[test]
    fn test_search_argument_order() {
        let harness = Harness::new();
        let host = &harness.host;
        let parser = harness.parser_with(&[("abc", 0)]);
        let program = harness.program(&parser, false);
        let context = harness.context(&program);
        let buffer = host.new_byte_array(vec![0; 4]);
        let callback = host.new_callback();
        let bridge = harness.bridge();

        let cases: [(Option<&_>, i32, i32, i64, Option<&_>, &str); 6] = [
            (None, -1, -1, -1, None, "buffer == null"),
            (Some(&buffer), -1, -1, -1, None, "offset == -1 < 0"),
            (Some(&buffer), 0, -1, -1, None, "size == -1 < 0"),
            (
                Some(&buffer),
                6,
                1,
                -1,
                None,
                "buffer.length == 4, offset == 6, buffer.length - offset < size == 1",
            ),
            (Some(&buffer), 0, 4, -1, None, "startOffset == -1 < 0"),
            (Some(&buffer), 0, 4, 0, None, "callback == null"),
        ];
        for (buffer, offset, size, start, callback, message) in cases {
            assert_eq!(
                bridge.context_search(&context, buffer, offset, size, start, callback),
                0
            );
            assert_eq!(host.take_exception().map(|(_, m)| m).as_deref(), Some(message));
        }

        assert_eq!(
            bridge.context_search(&context, Some(&buffer), 4, 0, 0, Some(&callback)),
            0
        );
        assert_eq!(host.pending_exception(), None);
        assert!(host.pin_log().len() == 1);
    }

    #[test]
    fn test_search_reports_resume_offset() {
        let harness = Harness::new();
        let parser = harness.parser_with(&[("abcd", 0)]);
        let program = harness.program(&parser, false);
        let context = harness.context(&program);
        let callback = harness.host.new_callback();

        assert_eq!(harness.search(&context, b"xxab", 100, &callback), 102);
        assert_eq!(harness.search(&context, b"cd", 104, &callback), 106);
        assert_eq!(harness.host.hits(&callback), vec![(102, 106, 0)]);
    }

    #[test]
    fn test_starts_with_is_anchored() {
        let harness = Harness::new();
        let parser = harness.parser_with(&[("ab", 0), ("b", 1)]);
        let program = harness.program(&parser, false);
        let context = harness.context(&program);
        let callback = harness.host.new_callback();
        let buffer = harness.host.new_byte_array(b"zabab".to_vec());

        harness
            .bridge()
            .context_starts_with(&context, Some(&buffer), 1, 4, 50, Some(&callback));
        assert_eq!(harness.host.pending_exception(), None);
        assert_eq!(harness.host.hits(&callback), vec![(50, 52, 0)]);
    }

    #[test]
    fn test_reentrant_search_is_busy() {
        let harness = Harness::new();
        let parser = harness.parser_with(&[("a", 0)]);
        let program = harness.program(&parser, false);
        let context = harness.context(&program);

        let bindings = harness.bindings.clone();
        let handles = harness.handles.clone();
        let callback = harness.host.new_callback_with(move |host, _| {
            let inner = host.new_callback();
            let buffer = host.new_byte_array(b"a".to_vec());
            let bridge = crate::api::Bridge::new(host, &bindings, &handles);
            bridge.context_search(&context, Some(&buffer), 0, 1, 0, Some(&inner));
        });

        assert_eq!(harness.search(&context, b"a", 0, &callback), 0);
        assert_eq!(
            harness.host.take_exception(),
            Some((
                "java/lang/IllegalStateException".into(),
                "Handle is already in use by another call".into()
            ))
        );
        assert_eq!(harness.host.open_pins(), 0);
    }
}

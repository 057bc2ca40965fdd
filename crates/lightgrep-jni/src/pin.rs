//! Buffer Pinning Layer

use crate::error::{BridgeError, Result};
use crate::host::{HostEnv, PinMode};
use std::ptr::NonNull;

/// A byte array pinned for the duration of one call
///
/// Dropping the guard releases the pin with the chosen [`PinMode`], on every
/// exit path.
pub struct Pinned<'h, H: HostEnv> {
    host: &'h H,
    array: &'h H::Object,
    elements: NonNull<u8>,
    mode: PinMode,
}

impl<'h, H: HostEnv> Pinned<'h, H> {
    /// Pin `array`; on failure the host's out-of-memory error stays pending
    pub fn new(host: &'h H, array: &'h H::Object, mode: PinMode) -> Result<Self> {
        let elements = host
            .pin_bytes(array)
            .ok_or(BridgeError::PendingException)?;
        Ok(Self {
            host,
            array,
            elements,
            mode,
        })
    }

    /// Address of element `offset`
    ///
    /// `offset` must have passed [`crate::validate::non_negative`] and a
    /// capacity check against this array.
    pub fn at(&self, offset: i32) -> *mut u8 {
        // SAFETY: validated offsets lie within (or one past) the pinned array
        unsafe { self.elements.as_ptr().add(offset as u32 as usize) }
    }
}

impl<H: HostEnv> Drop for Pinned<'_, H> {
    fn drop(&mut self) {
        self.host.unpin_bytes(self.array, self.elements, self.mode);
    }
}

//! Argument Validator
//!
//! Checks run in a fixed order per entry point and stop at the first
//! failure, so the host sees the same exception for the same bad call.

use crate::error::{BridgeError, Result};
use crate::host::HostEnv;

/// Reject a null reference argument
pub fn require<'o, O>(name: &'static str, value: Option<&'o O>) -> Result<&'o O> {
    value.ok_or(BridgeError::NullArgument { name })
}

/// Reject a negative offset, size or index
pub fn non_negative<V: Into<i64> + Copy>(name: &str, value: V) -> Result<()> {
    let value = value.into();
    if value < 0 {
        return Err(BridgeError::IndexOutOfRange(format!(
            "{} == {} < 0",
            name, value
        )));
    }
    Ok(())
}

/// Check that `size` bytes fit in a buffer of `length` bytes after `offset`
///
/// Both `offset` and `size` must already be known non-negative.
pub fn check_capacity(
    buffer_name: &str,
    length: i32,
    offset_name: &str,
    offset: i32,
    size_name: &str,
    size: i64,
) -> Result<()> {
    // signed 64-bit after the subtraction, so a past-the-end offset cannot wrap
    if i64::from(length) - i64::from(offset) < size {
        return Err(BridgeError::IndexOutOfRange(format!(
            "{}.length == {}, {} == {}, {}.length - {} < {} == {}",
            buffer_name, length, offset_name, offset, buffer_name, offset_name, size_name, size
        )));
    }
    Ok(())
}

/// [`check_capacity`] against a host byte array
pub fn check_array_capacity<H: HostEnv>(
    host: &H,
    buffer_name: &str,
    buffer: &H::Object,
    offset_name: &str,
    offset: i32,
    size_name: &str,
    size: i64,
) -> Result<()> {
    let length = host.array_len(buffer);
    check_capacity(buffer_name, length, offset_name, offset, size_name, size)
}

use std::slice;

use crate::raw::{AutoChar, AutoString};

/// Copies a caller-owned, NUL-terminated platform string. Returns `None` for null.
///
/// # Safety
/// `value` must be null or point to a NUL-terminated string that stays valid for the call.
pub unsafe fn auto_string_to_owned(value: *const AutoChar) -> Option<String> {
    if value.is_null() {
        return None;
    }

    #[cfg(windows)]
    {
        let mut length = 0usize;
        while *value.add(length) != 0 {
            length += 1;
        }
        let units = slice::from_raw_parts(value, length);
        Some(String::from_utf16_lossy(units))
    }

    #[cfg(not(windows))]
    {
        let bytes = std::ffi::CStr::from_ptr(value).to_bytes();
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Copies `length` bytes out of a host-owned buffer.
///
/// # Safety
/// `data` must be null or valid for reads of `length` bytes.
pub unsafe fn copy_host_bytes(data: *const u8, length: usize) -> Vec<u8> {
    if data.is_null() || length == 0 {
        return Vec::new();
    }
    slice::from_raw_parts(data, length).to_vec()
}

/// Lends `value` to `callback` as a temporary NUL-terminated platform string.
/// Text after an interior NUL is not representable and is dropped.
pub fn with_auto_string<R>(value: &str, callback: impl FnOnce(AutoString) -> R) -> R {
    let mut units = encode(value);
    callback(units.as_mut_ptr())
}

#[cfg(windows)]
fn encode(value: &str) -> Vec<AutoChar> {
    let mut units: Vec<u16> = value.encode_utf16().take_while(|unit| *unit != 0).collect();
    units.push(0);
    units
}

#[cfg(not(windows))]
fn encode(value: &str) -> Vec<AutoChar> {
    value
        .bytes()
        .take_while(|byte| *byte != 0)
        .map(|byte| byte as AutoChar)
        .chain(std::iter::once(0))
        .collect()
}

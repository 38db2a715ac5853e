#![allow(non_camel_case_types)]

use std::ffi::c_void;
#[cfg(not(windows))]
use std::os::raw::c_char;
use std::os::raw::{c_int, c_uint};

/// Platform-wide character unit used by the host: UTF-16 on Windows, UTF-8 bytes elsewhere.
#[cfg(windows)]
pub type AutoChar = u16;
#[cfg(not(windows))]
pub type AutoChar = c_char;

pub type AutoString = *mut AutoChar;

pub type ACTION = extern "C" fn();
pub type WebMessageReceivedCallback = extern "C" fn(message: AutoString);
pub type WebResourceRequestedCallback = extern "C" fn(
    url: AutoString,
    out_num_bytes: *mut c_int,
    out_content_type: *mut AutoString,
) -> *mut c_void;
pub type GetAllMonitorsCallback = extern "C" fn(monitor: *const NativeMonitor) -> c_int;
pub type ResizedCallback = extern "C" fn(width: c_int, height: c_int);
pub type MovedCallback = extern "C" fn(x: c_int, y: c_int);

pub type message_box_flags_t = c_uint;

pub const MB_ICONERROR: message_box_flags_t = 0x10;
pub const MB_ICONQUESTION: message_box_flags_t = 0x20;
pub const MB_ICONWARNING: message_box_flags_t = 0x30;
pub const MB_ICONINFORMATION: message_box_flags_t = 0x40;
pub const MB_ICONMASK: message_box_flags_t = 0xf0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeRect {
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeMonitor {
    pub monitor: NativeRect,
    pub work: NativeRect,
}

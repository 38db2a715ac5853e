pub mod raw;
pub mod strings;

pub use raw::*;
pub use strings::{auto_string_to_owned, copy_host_bytes, with_auto_string};

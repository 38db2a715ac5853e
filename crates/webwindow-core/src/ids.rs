use std::fmt::{Display, Formatter, Result as FmtResult};

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Arena key of a window owned by a [`crate::UiDomain`].
    pub struct WindowId;
}

impl Display for WindowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "window:{}", self.data().as_ffi())
    }
}

/// Native handle value of a window surface, used to route native events back to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawSurface(pub u64);

impl Display for RawSurface {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "surface:{:#x}", self.0)
    }
}

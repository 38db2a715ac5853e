use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected WIDTHxHEIGHT with positive integers, got {0:?}")]
pub struct ParseSizeError(pub String);

impl FromStr for Size {
    type Err = ParseSizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseSizeError(value.to_owned());
        let (width, height) = value
            .trim()
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(invalid)?;
        let width = width.trim().parse::<i32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<i32>().map_err(|_| invalid())?;
        if width <= 0 || height <= 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin, as used for client areas.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Full monitor area plus the part not covered by task bars and docks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Monitor {
    pub area: Rect,
    pub work_area: Rect,
}

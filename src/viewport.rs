use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Width of the browsing context used for every render, in CSS pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
/// Height of the browsing context used for every render, in CSS pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1600;

/// Logical viewport of a browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1200x1600)")]
    InvalidFormat,
    #[error("Invalid viewport dimension: {0}")]
    InvalidDimension(String),
    #[error("Viewport dimensions must be positive")]
    Zero,
}

impl Viewport {
    pub fn validate(&self) -> Result<(), ViewportParseError> {
        if self.width == 0 || self.height == 0 {
            return Err(ViewportParseError::Zero);
        }
        Ok(())
    }
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;

        let parse = |raw: &str| {
            raw.trim()
                .parse::<u32>()
                .map_err(|_| ViewportParseError::InvalidDimension(raw.trim().to_string()))
        };

        let viewport = Viewport {
            width: parse(width)?,
            height: parse(height)?,
        };
        viewport.validate()?;
        Ok(viewport)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

//! Loader error types.

use core::num::NonZeroI32;
use std::path::PathBuf;

use capgroup_abi::{IntError, LayoutMismatch};

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors raised while loading a plugin.
///
/// Every variant maps to a small integer code so the same failures can be reported through
/// `extern "C"` entry points.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The plugin path is invalid (wrong extension, not a file, too large).
    #[error("Invalid plugin path {path}: {reason}")]
    Path { path: PathBuf, reason: String },

    /// No library with this name in any search path.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// The library exists but could not be opened.
    #[error("Failed to load {path}: {message}")]
    Loading { path: PathBuf, message: String },

    /// A required export is missing.
    #[error("Missing symbol {symbol}: {message}")]
    Symbol { symbol: String, message: String },

    /// The plugin was built against a different interface layout.
    #[error("Layout mismatch: {0}")]
    Abi(#[from] LayoutMismatch),

    /// The plugin's constructor reported failure.
    #[error("Plugin constructor failed with code {0}")]
    Constructor(i32),
}

impl LoadError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Path { .. } => 1,
            Self::NotFound(_) | Self::Loading { .. } => 2,
            Self::Symbol { .. } => 3,
            Self::Abi(_) => 4,
            Self::Constructor(_) => 5,
        }
    }
}

impl IntError for LoadError {
    fn into_int_err(self) -> NonZeroI32 {
        NonZeroI32::new(self.code()).unwrap_or(NonZeroI32::MIN)
    }

    // Details are lost across the boundary; only the category survives.
    fn from_int_err(err: NonZeroI32) -> Self {
        match err.get() {
            1 => Self::Path {
                path: PathBuf::new(),
                reason: "reported by plugin host".into(),
            },
            2 => Self::NotFound(String::new()),
            3 => Self::Symbol {
                symbol: String::new(),
                message: "reported by plugin host".into(),
            },
            4 => Self::Abi(LayoutMismatch::Missing),
            code => Self::Constructor(code),
        }
    }
}

/// Error returned by a plugin constructor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConstructorError {
    pub message: String,
}

impl ConstructorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntError for ConstructorError {
    fn into_int_err(self) -> NonZeroI32 {
        NonZeroI32::new(5).unwrap_or(NonZeroI32::MIN)
    }

    fn from_int_err(err: NonZeroI32) -> Self {
        Self::new(format!("plugin constructor failed with code {err}"))
    }
}

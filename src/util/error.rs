//! Error types for voxreg.

use crate::image::PixelType;
use thiserror::Error;

/// Result alias for voxreg operations.
pub type VoxRegResult<T> = std::result::Result<T, VoxRegError>;

/// Errors that can occur when configuring or running voxreg algorithms.
///
/// Numerical non-convergence is not an error; solvers and minimizers report
/// it through [`crate::OptimizationOutcome`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VoxRegError {
    /// A parameter, descriptor or size is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A grid has a zero extent or disagrees with its buffer.
    #[error("invalid argument: invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// An operation has no implementation for the resolved pixel type.
    #[error("invalid argument: {operation} does not support pixel type {pixel_type}")]
    UnsupportedType {
        operation: &'static str,
        pixel_type: PixelType,
    },
    /// A descriptor names a plugin that is not registered.
    #[error("invalid argument: unknown {category} plugin '{name}'")]
    UnknownPlugin {
        category: &'static str,
        name: String,
    },
    /// A failure that only shows up while running.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Reading or writing a file failed.
    #[error("runtime error: i/o failure on '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl VoxRegError {
    /// Shorthand for [`VoxRegError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`VoxRegError::Runtime`].
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Returns true for the configuration error family.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidDimensions { .. }
                | Self::UnsupportedType { .. }
                | Self::UnknownPlugin { .. }
        )
    }
}

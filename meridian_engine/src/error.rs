//! Error types for the Meridian engine
//!
//! This module defines the error types used throughout the engine,
//! including resource creation, GPU transfers, and material lookups.

use std::fmt;

/// Result type for Meridian engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Meridian engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, DirectX, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource or invalid resource usage (buffer, image, shader, etc.)
    InvalidResource(String),

    /// A named property does not exist on a material
    NotFoundInMaterial(String),

    /// A GPU transfer (staging upload, one-shot submit) failed
    TransferFailed(String),

    /// Initialization failed (device, allocator, subsystems)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::NotFoundInMaterial(name) => {
                write!(f, "Property '{}' not found in material", name)
            }
            Error::TransferFailed(msg) => write!(f, "GPU transfer failed: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

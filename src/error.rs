//! Error types for fastcanvas
//!
//! Errors only surface from constructors and explicit export operations
//! (surface creation, region readback). Drawing operations on a
//! [`Context`](crate::context::Context) never return errors: a failure
//! marks the context invalid and every later call becomes a no-op.
//!
//! All errors use the `thiserror` crate for minimal boilerplate and
//! proper error trait implementations.

use thiserror::Error;

/// Result type alias for fastcanvas operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for fastcanvas
#[derive(Error, Debug)]
pub enum Error {
  /// Surface allocation or raster operation error
  #[error("Surface error: {0}")]
  Surface(#[from] SurfaceError),

  /// Generic error for miscellaneous issues
  #[error("{0}")]
  Other(String),
}

/// Errors from raster surface management
///
/// These cover surface creation and pixel readback. Failures during
/// drawing are reported through the context's validity flag instead.
#[derive(Error, Debug, Clone)]
pub enum SurfaceError {
  /// Surface creation failed
  #[error("Failed to create surface: {width}x{height}")]
  CreationFailed { width: u32, height: u32 },

  /// An allocation exceeded the per-raster byte limit or overflowed
  #[error("Raster allocation rejected: {message}")]
  AllocationRejected { message: String },

  /// Invalid parameters for a surface operation
  #[error("Invalid surface parameters: {message}")]
  InvalidParameters { message: String },

  /// Requested readback region lies outside the surface
  #[error("Readback region {x},{y} {width}x{height} is out of bounds")]
  RegionOutOfBounds {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
  },
}

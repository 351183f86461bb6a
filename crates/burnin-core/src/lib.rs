//! Burnin Core - Foundation types for the transcode pipeline
//!
//! This crate provides the fundamental types used throughout burnin:
//! - Error taxonomy and `Result` alias
//! - Frame buffers and pixel formats
//! - Frame rate and frame timing
//! - Cooperative cancellation

pub mod cancel;
pub mod error;
pub mod frame;
pub mod time;

pub use cancel::CancelHandle;
pub use error::{Error, Result};
pub use frame::{FrameBuffer, PixelFormat};
pub use time::{FrameRate, FrameTiming};

/// Timestamp sentinel reported by a sample source once its track is exhausted.
pub const END_OF_TRACK_US: i64 = -1;

//! Burnin Color — color model, HDR transfer curves, profile resolution.
//!
//! Everything here is pure computation: the profile resolver runs before any
//! codec or GPU resource exists because its output gates how both are
//! configured.

pub mod model;
pub mod profile;
pub mod transfer;
pub mod ycbcr;

pub use model::{BitDepth, CodecProfile, ColorStandard, ColorTransfer};
pub use profile::{resolve, ColorProfile, ProbedSource, ResolvedOutput};
pub use ycbcr::{yuv_to_rgb_bt2020, BT2020_YUV_OFFSET, BT2020_YUV_TO_RGB};

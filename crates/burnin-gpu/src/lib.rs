//! Burnin GPU - wgpu-based overlay compositing
//!
//! One composited frame per pass: the newest decoded video frame plus a
//! host-painted overlay canvas, rendered into the encoder's input surface.
//! All GPU work is confined to the single thread that owns the composer.

pub mod canvas;
pub mod compose;
pub mod context;
pub mod gpu_composer;
pub mod shaders;
pub mod software;
pub mod texture;

pub use canvas::OverlayCanvas;
pub use compose::{Composer, DrawStatus, FramePainter};
pub use context::GpuContext;
pub use gpu_composer::GpuComposer;
pub use software::SoftwareComposer;
pub use texture::GpuTexture;

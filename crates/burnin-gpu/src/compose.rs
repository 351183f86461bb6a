//! The compositing seam between the pipeline coordinator and a renderer.
//!
//! The GPU composer is the production implementation; a CPU composer backs
//! tests and adapterless environments. Both present one timestamped frame
//! to the encoder surface per draw iteration.

use burnin_core::{CancelHandle, Result};

use crate::canvas::OverlayCanvas;

/// What the per-frame callback decided: whether another iteration should
/// run, and the presentation timestamp to stamp on the swapped buffer.
#[derive(Debug, Clone, Copy)]
pub struct DrawStatus {
    pub has_next: bool,
    pub pts_us: i64,
}

/// Drawing operations available to the per-frame callback.
pub trait FramePainter {
    /// Import the newest decoded frame and draw it across the target.
    fn draw_video(&mut self) -> Result<()>;

    /// Clear the overlay canvas, let `draw` paint it, and composite it over
    /// the video with straight alpha.
    fn draw_overlay(&mut self, draw: &mut dyn FnMut(&mut OverlayCanvas)) -> Result<()>;
}

/// A compositing backend bound to an encoder input surface.
pub trait Composer: Send {
    /// One-time setup: shader compilation, texture allocation, blending.
    /// Failures here are fatal for the run and never retried.
    fn prepare(&mut self) -> Result<()>;

    /// Run the draw loop until the callback reports no further frame or an
    /// error. Each iteration clears the target, invokes `per_frame`, stamps
    /// the returned timestamp and presents the result. The loop checks for
    /// cancellation between iterations, never mid-frame.
    fn draw_loop(
        &mut self,
        cancel: &CancelHandle,
        per_frame: &mut dyn FnMut(&mut dyn FramePainter) -> Result<DrawStatus>,
    ) -> Result<()>;

    /// Release the rendering resources. Idempotent; must be called on every
    /// exit path, cancellation included.
    fn destroy(&mut self);
}

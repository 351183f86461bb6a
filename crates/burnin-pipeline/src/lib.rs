//! Burnin Pipeline - the transcode coordinator.
//!
//! Wires the frame decoder, the compositor and the frame encoder together:
//! resolves the color profile, runs the encoder drain concurrently with the
//! GPU draw loop, tears everything down on every exit path, then remuxes the
//! encoded video with the original audio.

pub mod coordinator;
pub mod options;
pub mod state;

pub use coordinator::{transcode, ComposerBinding, ComposerFactory, OverlayPaint, TranscodeJob};
pub use options::{TranscodeOptions, TranscodeReport};
pub use state::{Phase, PhaseCell};

//! Poll-based codec backend protocol.
//!
//! Decoders and encoders are external devices driven through an
//! asynchronous, non-blocking buffer-exchange protocol. Rather than
//! callbacks, both directions are modeled as an explicit poll state machine
//! with a small fixed set of statuses, which keeps timestamp and ordering
//! invariants auditable from the calling loops.

use burnin_color::{CodecProfile, ColorStandard, ColorTransfer};
use burnin_core::{FrameRate, Result};
use serde::{Deserialize, Serialize};

use crate::sample::{SampleFlags, SampleInfo, TrackDescriptor};
use crate::surface::{EncoderSurface, FramePublisher};

/// Status of one non-blocking dequeue attempt.
#[derive(Debug)]
pub enum CodecPoll<T> {
    /// An output unit is ready.
    Ready(T),
    /// Nothing available right now; poll again later.
    TryAgain,
    /// The device finalized its output format. For encoders this carries
    /// the negotiated track descriptor and arrives before any sample.
    FormatChanged(TrackDescriptor),
    /// The device has flushed everything it will ever produce.
    EndOfStream,
}

/// Token for a free decoder input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub usize);

/// Metadata of a decoded frame that was just rendered to the image source.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame {
    pub pts_us: i64,
}

/// A compressed output unit produced by an encoder.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub data: Vec<u8>,
    pub info: SampleInfo,
}

/// An external video decoder.
///
/// Decoded images are never handed to the caller: the device renders each
/// one to the [`FramePublisher`] it was configured with and only reports the
/// frame's timestamp.
pub trait DecoderBackend: Send {
    /// Configure for a compressed track, directing output at `output`.
    /// `transfer_override` requests decoder-side tone mapping to the given
    /// transfer function (used for HDR→SDR conversion).
    fn configure(
        &mut self,
        track: &TrackDescriptor,
        output: FramePublisher,
        transfer_override: Option<ColorTransfer>,
    ) -> Result<()>;

    /// Move to the ready-to-receive state.
    fn start(&mut self) -> Result<()>;

    /// Non-blocking: a free input slot, or `None` if the device is full.
    fn dequeue_input(&mut self) -> Result<Option<InputSlot>>;

    /// Hand one compressed sample to a previously dequeued slot.
    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: SampleFlags,
    ) -> Result<()>;

    /// Non-blocking: render the next decoded frame to the image source if
    /// one is ready.
    fn poll_frame(&mut self) -> Result<CodecPoll<DecodedFrame>>;

    /// Stop and release the device. Idempotent.
    fn stop(&mut self);
}

/// Factory resolving a decoder implementation for a codec mime type.
pub trait DecoderRegistry: Send + Sync {
    /// Instantiate a decoder for `mime`, or `None` when no implementation
    /// is available for that codec.
    fn create(&self, mime: &str) -> Option<Box<dyn DecoderBackend>>;
}

/// 10-bit HDR parameters for encoding.
///
/// Defaults describe HLG content: BT.2020 with the HLG curve and the
/// matching 10-bit profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdrEncodingParams {
    pub standard: ColorStandard,
    pub transfer: ColorTransfer,
    pub codec_profile: CodecProfile,
}

impl Default for HdrEncodingParams {
    fn default() -> Self {
        Self {
            standard: ColorStandard::Bt2020,
            transfer: ColorTransfer::Hlg,
            codec_profile: CodecProfile::Main10,
        }
    }
}

/// Encoder configuration, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub bit_rate: u64,
    pub keyframe_interval_sec: u32,
    /// `None` for SDR output; HDR parameters enable the 10-bit path.
    pub hdr: Option<HdrEncodingParams>,
}

/// An external video encoder with surface-driven input.
pub trait EncoderBackend: Send {
    fn configure(&mut self, config: &EncoderConfig) -> Result<()>;

    /// The surface the compositor renders into. Each submitted buffer
    /// becomes one encoded frame.
    fn input_surface(&mut self) -> Result<EncoderSurface>;

    fn start(&mut self) -> Result<()>;

    /// Non-blocking: the next compressed output unit. The first non-retry
    /// status after `start` is `FormatChanged` carrying the negotiated
    /// track descriptor.
    fn poll_output(&mut self) -> Result<CodecPoll<EncodedSample>>;

    /// No further frames will arrive on the input surface.
    fn signal_end_of_input(&mut self);

    /// Stop and release the device. Idempotent.
    fn stop(&mut self);
}

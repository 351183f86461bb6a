//! Transcode options and the completion report.

use burnin_media::sample::MIME_VIDEO_HEVC;
use serde::{Deserialize, Serialize};

/// Caller-facing knobs for one transcode run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeOptions {
    /// Target video bit rate in bits per second.
    pub bit_rate: u64,
    /// Keyframe interval in seconds.
    pub keyframe_interval_sec: u32,
    /// Codec mime for the re-encoded video track.
    pub codec_mime: String,
    /// Convert HDR sources to SDR (tone mapping) instead of carrying the
    /// 10-bit pipeline through.
    pub tone_map_to_sdr: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            bit_rate: 20_000_000,
            keyframe_interval_sec: 1,
            codec_mime: MIME_VIDEO_HEVC.to_string(),
            tone_map_to_sdr: false,
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeReport {
    /// Frames rendered by the draw loop.
    pub frames_rendered: u64,
    /// Output duration in milliseconds (frames x frame interval).
    pub duration_ms: i64,
    /// Samples copied into the final container.
    pub video_samples: u64,
    pub audio_samples: u64,
}

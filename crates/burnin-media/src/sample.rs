//! Sample and track metadata exchanged with container collaborators.

use burnin_color::{ColorStandard, ColorTransfer};
use burnin_core::FrameRate;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Mime prefix shared by all video tracks.
pub const MIME_VIDEO_PREFIX: &str = "video/";
/// Mime prefix shared by all audio tracks.
pub const MIME_AUDIO_PREFIX: &str = "audio/";

pub const MIME_VIDEO_HEVC: &str = "video/hevc";
pub const MIME_VIDEO_AVC: &str = "video/avc";
pub const MIME_VIDEO_DOLBY_VISION: &str = "video/dolby-vision";
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";

/// Per-sample flags carried from demux to mux unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const NONE: Self = Self(0);
    /// Sample is a sync point (keyframe).
    pub const KEYFRAME: Self = Self(1);
    /// Sample carries codec configuration, not picture data.
    pub const CODEC_CONFIG: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SampleFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Size, timestamp and flags of one compressed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub size: usize,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    pub flags: SampleFlags,
}

/// Color parameters attached to a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackColor {
    pub standard: ColorStandard,
    pub transfer: ColorTransfer,
}

/// Format description of one container track.
///
/// Produced when a track is selected from a container, consumed when a track
/// is added to an output container. Video and audio tracks share the type;
/// fields that do not apply are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<FrameRate>,
    pub bit_rate: Option<u64>,
    pub color: Option<TrackColor>,
    /// Codec-specific configuration blocks (e.g. parameter sets).
    pub codec_config: Vec<Vec<u8>>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl TrackDescriptor {
    /// A bare video track descriptor.
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            width,
            height,
            frame_rate: None,
            bit_rate: None,
            color: None,
            codec_config: Vec::new(),
            sample_rate: None,
            channels: None,
        }
    }

    /// A bare audio track descriptor.
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: mime.into(),
            width: 0,
            height: 0,
            frame_rate: None,
            bit_rate: None,
            color: None,
            codec_config: Vec::new(),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime.starts_with(MIME_VIDEO_PREFIX)
    }

    pub fn is_audio(&self) -> bool {
        self.mime.starts_with(MIME_AUDIO_PREFIX)
    }
}

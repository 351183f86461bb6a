//! Color profile resolution from probed source metadata.

use burnin_core::{Error, FrameRate, Result};
use serde::{Deserialize, Serialize};

use crate::model::{BitDepth, CodecProfile, ColorStandard, ColorTransfer};

/// Metadata probed from the source file before the pipeline starts.
///
/// Every field has a documented fallback used when the container does not
/// carry it; [`Default`] produces exactly those fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbedSource {
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees (0, 90, 180, 270).
    pub rotation_degrees: u32,
    pub frame_rate: FrameRate,
    pub standard: ColorStandard,
    pub transfer: ColorTransfer,
}

impl Default for ProbedSource {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            rotation_degrees: 0,
            frame_rate: FrameRate::FPS_30,
            standard: ColorStandard::Bt2020,
            transfer: ColorTransfer::Hlg,
        }
    }
}

/// The working color configuration, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub bit_depth: BitDepth,
    pub standard: ColorStandard,
    pub transfer: ColorTransfer,
    pub tone_map_to_sdr: bool,
    pub codec_profile: CodecProfile,
}

impl ColorProfile {
    /// Whether the GPU and encoder run their 10-bit HDR paths.
    pub fn is_hdr(&self) -> bool {
        !self.tone_map_to_sdr && self.standard == ColorStandard::Bt2020 && self.transfer.is_hdr()
    }
}

/// Resolved output configuration: oriented dimensions, rate and color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub color: ColorProfile,
}

/// Resolve the working profile from probed metadata and the tone-map choice.
///
/// Portrait sources (rotation 90/270) have width and height swapped before
/// any downstream use. Tone mapping forces the 8-bit SDR path regardless of
/// the source transfer; otherwise HLG selects `Main10`, PQ selects
/// `Main10Hdr10`, and an HDR transfer outside BT.2020 is rejected.
pub fn resolve(probed: &ProbedSource, tone_map_to_sdr: bool) -> Result<ResolvedOutput> {
    let (width, height) = match probed.rotation_degrees % 360 {
        90 | 270 => (probed.height, probed.width),
        _ => (probed.width, probed.height),
    };

    let color = if tone_map_to_sdr {
        ColorProfile {
            bit_depth: BitDepth::Eight,
            standard: ColorStandard::Bt709,
            transfer: ColorTransfer::Sdr,
            tone_map_to_sdr: true,
            codec_profile: CodecProfile::Main,
        }
    } else {
        match probed.transfer {
            ColorTransfer::Sdr => ColorProfile {
                bit_depth: BitDepth::Eight,
                standard: probed.standard,
                transfer: ColorTransfer::Sdr,
                tone_map_to_sdr: false,
                codec_profile: CodecProfile::Main,
            },
            hdr_transfer => {
                if probed.standard != ColorStandard::Bt2020 {
                    return Err(Error::Configuration(format!(
                        "{} requires BT.2020, source is {}",
                        hdr_transfer.name(),
                        probed.standard.name()
                    )));
                }
                let codec_profile = match hdr_transfer {
                    ColorTransfer::Hlg => CodecProfile::Main10,
                    ColorTransfer::Pq => CodecProfile::Main10Hdr10,
                    ColorTransfer::Sdr => unreachable!(),
                };
                ColorProfile {
                    bit_depth: BitDepth::Ten,
                    standard: ColorStandard::Bt2020,
                    transfer: hdr_transfer,
                    tone_map_to_sdr: false,
                    codec_profile,
                }
            }
        }
    };

    Ok(ResolvedOutput {
        width,
        height,
        frame_rate: probed.frame_rate,
        color,
    })
}

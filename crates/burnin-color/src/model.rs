//! Color standard, transfer function, bit depth and codec profile enums.

use serde::{Deserialize, Serialize};

/// Color standard (primaries + matrix) of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorStandard {
    Bt601,
    Bt709,
    Bt2020,
}

impl ColorStandard {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bt601 => "BT.601",
            Self::Bt709 => "BT.709",
            Self::Bt2020 => "BT.2020",
        }
    }
}

/// Transfer function (gamma curve) of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorTransfer {
    /// Standard dynamic range (BT.709-style OETF).
    Sdr,
    /// Hybrid Log-Gamma (BT.2100).
    Hlg,
    /// Perceptual Quantizer (ST.2084).
    Pq,
}

impl ColorTransfer {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sdr => "SDR",
            Self::Hlg => "HLG (BT.2100)",
            Self::Pq => "PQ (ST.2084)",
        }
    }

    /// Whether this transfer carries high dynamic range.
    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::Hlg | Self::Pq)
    }
}

/// Bit depth of the working pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Ten,
}

impl BitDepth {
    pub fn bits(&self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Ten => 10,
        }
    }
}

/// Encoder codec profile selected from the working transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecProfile {
    /// 8-bit SDR.
    Main,
    /// 10-bit, HLG.
    Main10,
    /// 10-bit, PQ with static HDR10 metadata.
    Main10Hdr10,
}

impl CodecProfile {
    /// Profile string understood by x265-style encoders.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Main10 | Self::Main10Hdr10 => "main10",
        }
    }

    pub fn is_ten_bit(&self) -> bool {
        !matches!(self, Self::Main)
    }
}

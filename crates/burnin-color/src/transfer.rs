//! Transfer-function curves (OETF/EOTF).
#![allow(clippy::excessive_precision)]

use crate::model::ColorTransfer;

impl ColorTransfer {
    /// Convert a non-linear (encoded) value to linear light.
    pub fn to_linear(&self, v: f32) -> f32 {
        match self {
            Self::Sdr => rec709_to_linear(v),
            Self::Hlg => decode_hlg(v),
            Self::Pq => decode_pq(v),
        }
    }

    /// Convert linear light to a non-linear (encoded) value.
    pub fn from_linear(&self, v: f32) -> f32 {
        match self {
            Self::Sdr => linear_to_rec709(v),
            Self::Hlg => encode_hlg(v),
            Self::Pq => encode_pq(v),
        }
    }
}

fn rec709_to_linear(v: f32) -> f32 {
    if v < 0.081 {
        v / 4.5
    } else {
        ((v + 0.099) / 1.099).powf(1.0 / 0.45)
    }
}

fn linear_to_rec709(v: f32) -> f32 {
    if v < 0.018 {
        v * 4.5
    } else {
        1.099 * v.powf(0.45) - 0.099
    }
}

// PQ (ST.2084) constants
const PQ_M1: f32 = 0.1593017578125;
const PQ_M2: f32 = 78.84375;
const PQ_C1: f32 = 0.8359375;
const PQ_C2: f32 = 18.8515625;
const PQ_C3: f32 = 18.6875;

/// Encode linear luminance (in nits / 10000) to PQ [0, 1].
pub fn encode_pq(linear: f32) -> f32 {
    let y = linear.max(0.0);
    let ym1 = y.powf(PQ_M1);
    let num = PQ_C1 + PQ_C2 * ym1;
    let den = 1.0 + PQ_C3 * ym1;
    (num / den).powf(PQ_M2)
}

/// Decode PQ [0, 1] to linear luminance (in nits / 10000).
pub fn decode_pq(pq: f32) -> f32 {
    let pq = pq.max(0.0);
    let p = pq.powf(1.0 / PQ_M2);
    let num = (p - PQ_C1).max(0.0);
    let den = PQ_C2 - PQ_C3 * p;
    if den.abs() < 1e-10 {
        0.0
    } else {
        (num / den).powf(1.0 / PQ_M1)
    }
}

// HLG constants
const HLG_A: f32 = 0.17883277;
const HLG_B: f32 = 0.28466892;
const HLG_C: f32 = 0.55991073;

/// Encode scene-referred linear to HLG.
pub fn encode_hlg(linear: f32) -> f32 {
    let e = linear.max(0.0);
    if e <= 1.0 / 12.0 {
        (3.0 * e).sqrt()
    } else {
        HLG_A * (12.0 * e - HLG_B).ln() + HLG_C
    }
}

/// Decode HLG to scene-referred linear.
pub fn decode_hlg(hlg: f32) -> f32 {
    let e = hlg.max(0.0);
    if e <= 0.5 {
        e * e / 3.0
    } else {
        ((e - HLG_C) / HLG_A).exp() / 12.0 + HLG_B / 12.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdr_roundtrip() {
        for &v in &[0.0, 0.04, 0.5, 1.0] {
            let linear = ColorTransfer::Sdr.to_linear(v);
            let back = ColorTransfer::Sdr.from_linear(linear);
            assert!((back - v).abs() < 0.001, "SDR roundtrip failed for {v}");
        }
    }

    #[test]
    fn pq_roundtrip() {
        for &v in &[0.0, 0.1, 0.5, 0.9] {
            let linear = ColorTransfer::Pq.to_linear(v);
            let back = ColorTransfer::Pq.from_linear(linear);
            assert!((back - v).abs() < 0.01, "PQ roundtrip failed for {v}");
        }
    }

    #[test]
    fn hlg_roundtrip() {
        for &v in &[0.0, 0.1, 0.3, 0.5, 0.8] {
            let linear = ColorTransfer::Hlg.to_linear(v);
            let back = ColorTransfer::Hlg.from_linear(linear);
            assert!((back - v).abs() < 0.01, "HLG roundtrip failed for {v}");
        }
    }

    #[test]
    fn hlg_half_maps_to_one_twelfth() {
        // HLG reference point: E' = 0.5 corresponds to E = 1/12.
        assert!((decode_hlg(0.5) - 1.0 / 12.0).abs() < 1e-4);
    }
}

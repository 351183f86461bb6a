//! WGSL shader variants for the compositing pass.
//!
//! Two fragment entry points per variant: `fs_video` samples the imported
//! video frame, `fs_overlay` samples the host-painted canvas (flipped
//! vertically to match texture-coordinate convention). The HDR variant
//! converts limited-range BT.2020 YCbCr to RGB with a matrix bound as a
//! uniform; the SDR variant samples the video texture directly.

use burnin_color::ColorProfile;

/// Shared shader scaffolding: uniforms, vertex stage, overlay stage.
const COMMON: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
    tex_transform: mat4x4<f32>,
    yuv_to_rgb: mat4x4<f32>,
    yuv_offset: vec4<f32>,
};

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(0) @binding(1) var video_tex: texture_2d<f32>;
@group(0) @binding(2) var overlay_tex: texture_2d<f32>;
@group(0) @binding(3) var samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = uniforms.mvp * vec4<f32>(pos, 1.0);
    out.uv = (uniforms.tex_transform * vec4<f32>(uv, 0.0, 1.0)).xy;
    return out;
}

@fragment
fn fs_overlay(in: VertexOutput) -> @location(0) vec4<f32> {
    // Texture coordinates grow downward; the canvas is painted top-down.
    return textureSample(overlay_tex, samp, vec2<f32>(in.uv.x, 1.0 - in.uv.y));
}
"#;

/// Video stage for SDR frames: direct sampling.
const FS_VIDEO_SDR: &str = r#"
@fragment
fn fs_video(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(textureSample(video_tex, samp, in.uv).rgb, 1.0);
}
"#;

/// Video stage for 10-bit HDR frames: the texture carries packed AYCbCr,
/// converted to RGB with the bound BT.2020 limited-range matrix.
const FS_VIDEO_HDR: &str = r#"
@fragment
fn fs_video(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(video_tex, samp, in.uv);
    let yuv = texel.gba - uniforms.yuv_offset.xyz;
    let rgb = (uniforms.yuv_to_rgb * vec4<f32>(yuv, 0.0)).xyz;
    return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

/// The composed WGSL module for the active color profile.
pub fn shader_source(profile: &ColorProfile) -> String {
    let video_stage = if profile.is_hdr() {
        FS_VIDEO_HDR
    } else {
        FS_VIDEO_SDR
    };
    format!("{COMMON}{video_stage}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use burnin_color::{resolve, ColorTransfer, ProbedSource};

    fn profile(transfer: ColorTransfer, tone_map: bool) -> ColorProfile {
        let probed = ProbedSource {
            transfer,
            ..Default::default()
        };
        resolve(&probed, tone_map).unwrap().color
    }

    #[test]
    fn hdr_profile_selects_ycbcr_conversion() {
        let source = shader_source(&profile(ColorTransfer::Hlg, false));
        assert!(source.contains("yuv_to_rgb"));
        assert!(source.contains("texel.gba"));
    }

    #[test]
    fn sdr_and_tone_mapped_profiles_sample_directly() {
        for p in [
            profile(ColorTransfer::Sdr, false),
            profile(ColorTransfer::Pq, true),
        ] {
            let source = shader_source(&p);
            assert!(!source.contains("texel.gba"));
            assert!(source.contains("fs_video"));
        }
    }

    #[test]
    fn every_variant_keeps_both_entry_points() {
        for hdr in [true, false] {
            let p = profile(if hdr { ColorTransfer::Hlg } else { ColorTransfer::Sdr }, false);
            let source = shader_source(&p);
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_video"));
            assert!(source.contains("fn fs_overlay"));
        }
    }
}

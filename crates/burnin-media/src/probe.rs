//! Source metadata probing.
//!
//! Production probing shells out to `ffprobe` and parses its JSON output;
//! every field falls back to the documented default when the container does
//! not carry it.

use burnin_color::{ColorStandard, ColorTransfer, ProbedSource};
use burnin_core::{Error, FrameRate, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::info;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    color_space: Option<String>,
    color_transfer: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<i64>,
}

/// Probe a media file with ffprobe.
pub fn probe_source<P: AsRef<Path>>(path: P) -> Result<ProbedSource> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| Error::ResourceUnavailable(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(Error::Configuration(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let probed = parse_probe_json(&output.stdout)?;
    info!(
        width = probed.width,
        height = probed.height,
        rotation = probed.rotation_degrees,
        standard = probed.standard.name(),
        transfer = probed.transfer.name(),
        "probed source"
    );
    Ok(probed)
}

/// Map ffprobe JSON to a [`ProbedSource`], applying defaults for anything
/// missing.
pub fn parse_probe_json(json: &[u8]) -> Result<ProbedSource> {
    let parsed: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::Configuration(format!("unreadable ffprobe output: {e}")))?;

    let defaults = ProbedSource::default();
    let Some(stream) = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        return Ok(defaults);
    };

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .map(|r| (r.unsigned_abs() % 360) as u32)
        .unwrap_or(0);

    Ok(ProbedSource {
        width: stream.width.unwrap_or(defaults.width),
        height: stream.height.unwrap_or(defaults.height),
        rotation_degrees: rotation,
        frame_rate: stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .unwrap_or(defaults.frame_rate),
        standard: stream
            .color_space
            .as_deref()
            .map(parse_color_standard)
            .unwrap_or(defaults.standard),
        transfer: stream
            .color_transfer
            .as_deref()
            .map(parse_color_transfer)
            .unwrap_or(defaults.transfer),
    })
}

fn parse_frame_rate(raw: &str) -> Option<FrameRate> {
    let (num, den) = raw.split_once('/')?;
    let num: i64 = num.trim().parse().ok()?;
    let den: i64 = den.trim().parse().ok()?;
    if num <= 0 || den <= 0 {
        return None;
    }
    Some(FrameRate::new(num, den))
}

fn parse_color_standard(raw: &str) -> ColorStandard {
    match raw {
        "bt2020nc" | "bt2020c" | "bt2020" => ColorStandard::Bt2020,
        "smpte170m" | "bt470bg" => ColorStandard::Bt601,
        _ => ColorStandard::Bt709,
    }
}

fn parse_color_transfer(raw: &str) -> ColorTransfer {
    match raw {
        "arib-std-b67" => ColorTransfer::Hlg,
        "smpte2084" => ColorTransfer::Pq,
        _ => ColorTransfer::Sdr,
    }
}

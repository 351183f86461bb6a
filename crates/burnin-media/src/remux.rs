//! Track remuxing: copy already-encoded tracks into one container.

use burnin_core::{CancelHandle, Result};
use tracing::{info, warn};

use crate::container::{SampleSink, SampleSource};
use crate::sample::SampleInfo;

/// Sample counts copied by [`mix_av_tracks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemuxStats {
    pub audio_samples: u64,
    pub video_samples: u64,
}

/// Combine an audio track and a video track into `sink` without re-encoding.
///
/// Both tracks are registered, the sink is started, then every sample is
/// copied byte-for-byte in source order with its timestamp and flags
/// preserved. The sink is finalized before returning. A missing audio track
/// produces a video-only container.
pub fn mix_av_tracks(
    mut audio: Option<&mut (dyn SampleSource + '_)>,
    video: &mut (dyn SampleSource + '_),
    sink: &mut dyn SampleSink,
    cancel: &CancelHandle,
) -> Result<RemuxStats> {
    if audio.is_none() {
        warn!("source has no audio track; producing a video-only container");
    }

    let audio_track = match audio.as_deref() {
        Some(track) => Some(sink.add_track(track.descriptor())?),
        None => None,
    };
    let video_track = sink.add_track(video.descriptor())?;
    sink.start()?;

    let mut stats = RemuxStats::default();
    if let (Some(track), Some(source)) = (audio_track, audio.as_deref_mut()) {
        stats.audio_samples = copy_track(source, sink, track, cancel)?;
    }
    stats.video_samples = copy_track(video, sink, video_track, cancel)?;

    sink.finish()?;
    info!(
        audio_samples = stats.audio_samples,
        video_samples = stats.video_samples,
        "remux complete"
    );
    Ok(stats)
}

/// Copy every remaining sample of `source` to `track` on `sink`.
fn copy_track(
    source: &mut dyn SampleSource,
    sink: &mut dyn SampleSink,
    track: usize,
    cancel: &CancelHandle,
) -> Result<u64> {
    let mut buf = Vec::new();
    let mut copied = 0u64;
    loop {
        cancel.checkpoint()?;
        let Some(size) = source.read_sample(&mut buf)? else {
            break;
        };
        let info = SampleInfo {
            size,
            pts_us: source.sample_time_us(),
            flags: source.sample_flags(),
        };
        sink.write_sample(track, &buf[..size], &info)?;
        copied += 1;
        if !source.advance() {
            break;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Demuxer, MemoryContainer};
    use crate::sample::{SampleFlags, TrackDescriptor, MIME_AUDIO_AAC, MIME_VIDEO_HEVC};

    fn sample(pts_us: i64, flags: SampleFlags, byte: u8) -> (Vec<u8>, SampleInfo) {
        let data = vec![byte; 16];
        let info = SampleInfo {
            size: data.len(),
            pts_us,
            flags,
        };
        (data, info)
    }

    #[test]
    fn copies_both_tracks_with_counts_and_metadata() {
        let source = MemoryContainer::new();
        source.push_track(
            TrackDescriptor::audio(MIME_AUDIO_AAC, 48_000, 2),
            (0..7).map(|i| sample(i * 21_333, SampleFlags::NONE, 0xAA)),
        );
        source.push_track(
            TrackDescriptor::video(MIME_VIDEO_HEVC, 320, 240),
            (0..5).map(|i| sample(i * 33_333, SampleFlags::KEYFRAME, 0xBB)),
        );

        let mut audio = source.clone().select_track("audio/").unwrap();
        let mut video = source.clone().select_track("video/").unwrap();
        let mut out = MemoryContainer::new();

        let stats = mix_av_tracks(
            Some(audio.as_mut()),
            video.as_mut(),
            &mut out,
            &CancelHandle::new(),
        )
        .unwrap();

        assert_eq!(stats.audio_samples, 7);
        assert_eq!(stats.video_samples, 5);
        assert_eq!(out.track_count(), 2);
        assert_eq!(out.sample_count(0), 7);
        assert_eq!(out.sample_count(1), 5);
        assert!(out.is_finished());

        // Timestamps and flags survive byte-for-byte.
        let mut copied_video = out.clone().select_track("video/").unwrap();
        let mut buf = Vec::new();
        copied_video.read_sample(&mut buf).unwrap();
        assert_eq!(buf, vec![0xBB; 16]);
        assert_eq!(copied_video.sample_time_us(), 0);
        assert!(copied_video.sample_flags().contains(SampleFlags::KEYFRAME));
        assert!(copied_video.advance());
        assert_eq!(copied_video.sample_time_us(), 33_333);
    }

    #[test]
    fn missing_audio_produces_video_only_output() {
        let source = MemoryContainer::new();
        source.push_track(
            TrackDescriptor::video(MIME_VIDEO_HEVC, 320, 240),
            (0..3).map(|i| sample(i * 33_333, SampleFlags::NONE, 1)),
        );

        let mut video = source.clone().select_track("video/").unwrap();
        let mut out = MemoryContainer::new();
        let stats =
            mix_av_tracks(None, video.as_mut(), &mut out, &CancelHandle::new()).unwrap();

        assert_eq!(stats.audio_samples, 0);
        assert_eq!(stats.video_samples, 3);
        assert_eq!(out.track_count(), 1);
    }

    #[test]
    fn cancellation_stops_the_copy() {
        let source = MemoryContainer::new();
        source.push_track(
            TrackDescriptor::video(MIME_VIDEO_HEVC, 320, 240),
            (0..3).map(|i| sample(i, SampleFlags::NONE, 1)),
        );
        let mut video = source.clone().select_track("video/").unwrap();
        let mut out = MemoryContainer::new();

        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = mix_av_tracks(None, video.as_mut(), &mut out, &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}

//! Integration tests for the timestamp-driven decoder.

use burnin_core::{CancelHandle, Error, END_OF_TRACK_US};
use burnin_media::container::{Demuxer, SampleSource};
use burnin_media::sample::{
    SampleFlags, TrackDescriptor, MIME_VIDEO_DOLBY_VISION, MIME_VIDEO_HEVC,
};
use burnin_media::testing::{scripted_source, ResourceLedger, StubRegistry};
use burnin_media::{FrameDecoder, FrameImageSource, MemoryContainer};
use std::sync::{Arc, Mutex};

/// Wraps a sample source and records the timestamp of every sample read.
struct RecordingSource {
    inner: Box<dyn SampleSource>,
    reads: Arc<Mutex<Vec<i64>>>,
}

impl SampleSource for RecordingSource {
    fn descriptor(&self) -> &TrackDescriptor {
        self.inner.descriptor()
    }

    fn read_sample(&mut self, buf: &mut Vec<u8>) -> burnin_core::Result<Option<usize>> {
        let result = self.inner.read_sample(buf)?;
        if result.is_some() {
            self.reads.lock().unwrap().push(self.inner.sample_time_us());
        }
        Ok(result)
    }

    fn sample_time_us(&self) -> i64 {
        self.inner.sample_time_us()
    }

    fn sample_flags(&self) -> SampleFlags {
        self.inner.sample_flags()
    }

    fn advance(&mut self) -> bool {
        self.inner.advance()
    }
}

struct RecordingDemuxer {
    inner: MemoryContainer,
    reads: Arc<Mutex<Vec<i64>>>,
}

impl Demuxer for RecordingDemuxer {
    fn select_track(&mut self, mime_prefix: &str) -> Option<Box<dyn SampleSource>> {
        let inner = self.inner.select_track(mime_prefix)?;
        Some(Box::new(RecordingSource {
            inner,
            reads: self.reads.clone(),
        }))
    }
}

const FRAME_US: i64 = 33_333;

fn decoder_over(
    container: MemoryContainer,
) -> (FrameDecoder, FrameImageSource, Arc<Mutex<Vec<i64>>>, Arc<ResourceLedger>) {
    let reads = Arc::new(Mutex::new(Vec::new()));
    let mut demuxer = RecordingDemuxer {
        inner: container,
        reads: reads.clone(),
    };
    let ledger = Arc::new(ResourceLedger::default());
    let registry = StubRegistry::new(&[MIME_VIDEO_HEVC], ledger.clone());
    let image_source = FrameImageSource::new();
    let decoder =
        FrameDecoder::prepare(&mut demuxer, &registry, image_source.publisher(), false).unwrap();
    (decoder, image_source, reads, ledger)
}

#[test]
fn sequential_targets_never_read_backward() {
    let container = scripted_source(MIME_VIDEO_HEVC, 30, FRAME_US, 0);
    let (mut decoder, _source, reads, _ledger) = decoder_over(container);
    let cancel = CancelHandle::new();

    let mut returned = Vec::new();
    for k in 0..30i64 {
        let pts = decoder.advance_to(k * 33, &cancel).unwrap();
        if let Some(pts) = pts {
            returned.push(pts);
        }
    }

    // Returned timestamps are non-decreasing.
    assert!(returned.windows(2).all(|w| w[0] <= w[1]), "{returned:?}");
    // The track itself was consumed strictly forward, no sample re-read.
    let reads = reads.lock().unwrap();
    assert!(!reads.is_empty());
    assert!(reads.windows(2).all(|w| w[0] < w[1]), "{reads:?}");
}

#[test]
fn exhaustion_is_idempotent() {
    let container = scripted_source(MIME_VIDEO_HEVC, 3, FRAME_US, 0);
    let (mut decoder, _source, _reads, _ledger) = decoder_over(container);
    let cancel = CancelHandle::new();

    // Walk past the end of the 3-frame track.
    let mut last = None;
    for k in 0..10i64 {
        last = decoder.advance_to(k * 33, &cancel).unwrap();
    }
    assert!(last.is_none());
    // Every further request keeps reporting "no frame".
    assert!(decoder.advance_to(0, &cancel).unwrap().is_none());
    assert!(decoder.advance_to(10_000, &cancel).unwrap().is_none());
}

#[test]
fn decoded_frames_reach_the_image_source() {
    let container = scripted_source(MIME_VIDEO_HEVC, 2, FRAME_US, 0);
    let (mut decoder, image_source, _reads, _ledger) = decoder_over(container);
    let consumer = image_source.consumer();

    decoder.advance_to(0, &CancelHandle::new()).unwrap().unwrap();
    let frame = consumer.update_if_fresh().expect("frame published");
    assert_eq!(frame.pts_us, 0);
}

#[test]
fn dolby_vision_falls_back_to_hevc() {
    let container = MemoryContainer::new();
    let mut descriptor = TrackDescriptor::video(MIME_VIDEO_DOLBY_VISION, 1280, 720);
    descriptor.frame_rate = Some(burnin_core::FrameRate::FPS_30);
    container.push_track(descriptor, vec![]);

    let ledger = Arc::new(ResourceLedger::default());
    // Only an HEVC decoder exists; the Dolby Vision track must still open.
    let registry = StubRegistry::new(&[MIME_VIDEO_HEVC], ledger.clone());
    let image_source = FrameImageSource::new();
    let mut demuxer = container;
    let decoder =
        FrameDecoder::prepare(&mut demuxer, &registry, image_source.publisher(), false);
    assert!(decoder.is_ok());
}

#[test]
fn unknown_codec_is_resource_unavailable() {
    let container = MemoryContainer::new();
    container.push_track(TrackDescriptor::video("video/av01", 640, 480), vec![]);

    let registry = StubRegistry::new(&[MIME_VIDEO_HEVC], Arc::new(ResourceLedger::default()));
    let image_source = FrameImageSource::new();
    let mut demuxer = container;
    match FrameDecoder::prepare(&mut demuxer, &registry, image_source.publisher(), false) {
        Err(Error::ResourceUnavailable(_)) => {}
        Err(other) => panic!("expected ResourceUnavailable, got {other:?}"),
        Ok(_) => panic!("prepare unexpectedly succeeded"),
    }
}

#[test]
fn missing_video_track_is_a_configuration_error() {
    let container = MemoryContainer::new();
    container.push_track(
        TrackDescriptor::audio(burnin_media::sample::MIME_AUDIO_AAC, 48_000, 2),
        vec![],
    );

    let registry = StubRegistry::new(&[MIME_VIDEO_HEVC], Arc::new(ResourceLedger::default()));
    let image_source = FrameImageSource::new();
    let mut demuxer = container;
    match FrameDecoder::prepare(&mut demuxer, &registry, image_source.publisher(), false) {
        Err(Error::Configuration(_)) => {}
        Err(other) => panic!("expected Configuration error, got {other:?}"),
        Ok(_) => panic!("prepare unexpectedly succeeded"),
    }
}

#[test]
fn stalled_device_trips_the_idle_budget() {
    let container = scripted_source(MIME_VIDEO_HEVC, 10, FRAME_US, 0);
    let ledger = Arc::new(ResourceLedger::default());
    let registry = StubRegistry::new(&[MIME_VIDEO_HEVC], ledger).stalling_after(0);
    let image_source = FrameImageSource::new();
    let mut demuxer = container;
    let mut decoder =
        FrameDecoder::prepare(&mut demuxer, &registry, image_source.publisher(), false).unwrap();

    match decoder.advance_to(0, &CancelHandle::new()) {
        Err(Error::Codec(_)) => {}
        other => panic!("expected Codec error from a stalled device, got {other:?}"),
    }
}

#[test]
fn cancellation_interrupts_the_pull_loop() {
    let container = scripted_source(MIME_VIDEO_HEVC, 10, FRAME_US, 0);
    let (mut decoder, _source, _reads, _ledger) = decoder_over(container);

    let cancel = CancelHandle::new();
    cancel.cancel();
    let err = decoder.advance_to(0, &cancel).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn destroy_is_idempotent_and_balances_the_ledger() {
    let container = scripted_source(MIME_VIDEO_HEVC, 2, FRAME_US, 0);
    let (mut decoder, _source, _reads, ledger) = decoder_over(container);

    assert_eq!(ledger.acquired(), 1);
    decoder.destroy();
    decoder.destroy();
    assert!(ledger.balanced());

    // Using a destroyed decoder is an error, not a crash.
    assert!(decoder.advance_to(0, &CancelHandle::new()).is_err());
    // The end-of-track sentinel convention still holds for the container.
    assert_ne!(END_OF_TRACK_US, 0);
}

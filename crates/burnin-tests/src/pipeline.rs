//! End-to-end pipeline tests over the scripted backends and the CPU
//! reference composer.

use anyhow::Result;
use burnin_color::{ColorStandard, ColorTransfer, ProbedSource};
use burnin_core::{CancelHandle, Error, FrameRate};
use burnin_gpu::{Composer, SoftwareComposer};
use burnin_media::container::Demuxer;
use burnin_media::sample::{SampleFlags, SampleInfo, TrackColor, TrackDescriptor, MIME_VIDEO_HEVC};
use burnin_media::testing::{scripted_source, ResourceLedger, ScriptedEncoderBackend, StubRegistry};
use burnin_media::{MemoryContainer, MemoryStore};
use burnin_pipeline::{transcode, ComposerBinding, ComposerFactory, TranscodeJob, TranscodeOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const FRAME_US: i64 = 33_333;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn software_composer() -> ComposerFactory {
    Box::new(|binding: ComposerBinding| {
        Ok(Box::new(SoftwareComposer::new(
            binding.surface,
            binding.source,
            binding.width,
            binding.height,
            binding.profile,
        )) as Box<dyn Composer>)
    })
}

struct Harness {
    job: TranscodeJob,
    ledger: Arc<ResourceLedger>,
    temp: MemoryContainer,
    output: MemoryContainer,
}

fn harness(source: MemoryContainer, probed: ProbedSource, options: TranscodeOptions) -> Harness {
    let ledger = Arc::new(ResourceLedger::default());
    let temp_store = MemoryStore::new();
    let temp = temp_store.container().clone();
    let output = MemoryContainer::new();

    let job = TranscodeJob {
        probed,
        source: Box::new(source),
        decoders: Box::new(StubRegistry::new(&[MIME_VIDEO_HEVC], ledger.clone())),
        encoder: Box::new(ScriptedEncoderBackend::new(ledger.clone())),
        temp_store: Box::new(temp_store),
        output: Box::new(output.clone()),
        options,
        overlay: Box::new(|canvas| {
            canvas.fill_rect(100, 100, 200, 80, [255, 255, 255, 255]);
        }),
        composer: software_composer(),
    };

    Harness {
        job,
        ledger,
        temp,
        output,
    }
}

fn sdr_probe() -> ProbedSource {
    ProbedSource {
        standard: ColorStandard::Bt709,
        transfer: ColorTransfer::Sdr,
        frame_rate: FrameRate::FPS_30,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn two_second_sdr_source_round_trips_with_audio() -> Result<()> {
    init_tracing();
    // 2 seconds at 30 fps, with an audio track of 94 samples.
    let source = scripted_source(MIME_VIDEO_HEVC, 60, FRAME_US, 94);
    let h = harness(source, sdr_probe(), TranscodeOptions::default());

    let report = transcode(h.job, CancelHandle::new()).await?;

    assert_eq!(report.frames_rendered, 60);
    // Output duration stays within one frame interval of the source's 2 s.
    assert!((2_000 - report.duration_ms).abs() <= 34, "{}", report.duration_ms);

    // Audio came through untouched; video was re-encoded frame for frame
    // (plus the final flush of the last composited buffer).
    assert_eq!(report.audio_samples, 94);
    assert_eq!(report.video_samples, 61);
    assert_eq!(h.output.track_count(), 2);
    assert_eq!(h.output.sample_count(0), 94);
    assert_eq!(h.output.sample_count(1), 61);

    // Audio samples kept their timestamps and flags.
    let mut audio = h.output.clone().select_track("audio/").unwrap();
    assert_eq!(audio.sample_time_us(), 0);
    assert!(audio.advance());
    assert_eq!(audio.sample_time_us(), 21_333);

    // Video presentation timestamps follow the output frame clock.
    let mut video = h.output.clone().select_track("video/").unwrap();
    assert_eq!(video.sample_time_us(), 0);
    assert!(video.sample_flags().contains(SampleFlags::KEYFRAME));
    assert!(video.advance());
    assert_eq!(video.sample_time_us(), 33_000);

    // Temporary artifacts are gone, devices released.
    assert!(h.temp.is_discarded());
    assert!(h.ledger.balanced());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hlg_source_carries_hdr_parameters_through() -> Result<()> {
    let source = MemoryContainer::new();
    let mut descriptor = TrackDescriptor::video(MIME_VIDEO_HEVC, 1280, 720);
    descriptor.frame_rate = Some(FrameRate::FPS_30);
    descriptor.color = Some(TrackColor {
        standard: ColorStandard::Bt2020,
        transfer: ColorTransfer::Hlg,
    });
    source.push_track(
        descriptor,
        (0..60i64).map(|i| {
            let data = vec![0xC0; 64];
            let info = SampleInfo {
                size: data.len(),
                pts_us: i * FRAME_US,
                flags: SampleFlags::NONE,
            };
            (data, info)
        }),
    );

    // Probe defaults are exactly the HLG case.
    let h = harness(source, ProbedSource::default(), TranscodeOptions::default());
    let report = transcode(h.job, CancelHandle::new()).await?;

    assert_eq!(report.frames_rendered, 60);
    // The re-encoded track advertises the 10-bit HDR parameters.
    let video = h.output.clone().select_track("video/").unwrap();
    let color = video.descriptor().color.expect("HDR track color");
    assert_eq!(color.standard, ColorStandard::Bt2020);
    assert_eq!(color.transfer, ColorTransfer::Hlg);
    assert!(h.ledger.balanced());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn tone_mapping_produces_an_sdr_run_from_an_hdr_probe() -> Result<()> {
    let source = scripted_source(MIME_VIDEO_HEVC, 10, FRAME_US, 0);
    let options = TranscodeOptions {
        tone_map_to_sdr: true,
        ..Default::default()
    };
    let h = harness(source, ProbedSource::default(), options);

    let report = transcode(h.job, CancelHandle::new()).await?;
    assert_eq!(report.frames_rendered, 10);
    // No HDR parameters on the output track.
    let video = h.output.clone().select_track("video/").unwrap();
    assert!(video.descriptor().color.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_audio_degrades_to_video_only() -> Result<()> {
    let source = scripted_source(MIME_VIDEO_HEVC, 5, FRAME_US, 0);
    let h = harness(source, sdr_probe(), TranscodeOptions::default());

    let report = transcode(h.job, CancelHandle::new()).await?;
    assert_eq!(report.audio_samples, 0);
    assert_eq!(h.output.track_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_tears_down_and_deletes_partial_results() {
    let source = scripted_source(MIME_VIDEO_HEVC, 600, FRAME_US, 10);
    let h = harness(source, sdr_probe(), TranscodeOptions::default());

    // Re-wire the overlay to cancel the run after a handful of frames.
    let cancel = CancelHandle::new();
    let frames_seen = Arc::new(AtomicU64::new(0));
    let mut job = h.job;
    let cancel_from_overlay = cancel.clone();
    let counter = frames_seen.clone();
    job.overlay = Box::new(move |_canvas| {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
            cancel_from_overlay.cancel();
        }
    });

    let err = transcode(job, cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(frames_seen.load(Ordering::SeqCst) < 600);

    // Every prepared device was released, no partial artifact remains.
    assert!(h.ledger.balanced());
    assert!(h.temp.is_discarded());
    assert!(h.output.is_discarded());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_hdr_metadata_aborts_before_any_device_exists() {
    let source = scripted_source(MIME_VIDEO_HEVC, 5, FRAME_US, 0);
    let probed = ProbedSource {
        standard: ColorStandard::Bt709,
        transfer: ColorTransfer::Hlg,
        ..Default::default()
    };
    let h = harness(source, probed, TranscodeOptions::default());

    let err = transcode(h.job, CancelHandle::new()).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(h.ledger.acquired(), 0);
    assert!(h.output.is_discarded());
}

#[tokio::test(flavor = "multi_thread")]
async fn decoder_prepare_failure_releases_the_encoder() {
    // Source advertises a codec nobody can decode.
    let source = MemoryContainer::new();
    source.push_track(TrackDescriptor::video("video/av01", 640, 480), vec![]);

    let h = harness(source, sdr_probe(), TranscodeOptions::default());
    let err = transcode(h.job, CancelHandle::new()).await.unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));

    // The encoder had been configured already; its release must balance.
    assert!(h.ledger.balanced());
    assert!(h.ledger.acquired() > 0);
    assert!(h.temp.is_discarded());
}

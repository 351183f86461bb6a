//! The transcode coordinator.

use burnin_color::{resolve, ColorProfile, ProbedSource};
use burnin_core::{CancelHandle, Error, FrameRate, FrameTiming, Result};
use burnin_gpu::{Composer, DrawStatus, GpuComposer, GpuContext, OverlayCanvas};
use burnin_media::sample::MIME_AUDIO_PREFIX;
use burnin_media::{
    mix_av_tracks, DecoderRegistry, Demuxer, ElementaryStore, EncoderBackend, EncoderConfig,
    EncoderSurface, FrameConsumer, FrameDecoder, FrameEncoder, FrameImageSource,
    HdrEncodingParams, SampleSink,
};
use tracing::info;

use crate::options::{TranscodeOptions, TranscodeReport};
use crate::state::{Phase, PhaseCell};

/// Paint callback for the overlay layer, invoked once per output frame.
pub type OverlayPaint = Box<dyn FnMut(&mut OverlayCanvas) + Send>;

/// Everything a composer needs to bind to the pipeline.
pub struct ComposerBinding {
    pub surface: EncoderSurface,
    pub source: FrameConsumer,
    pub width: u32,
    pub height: u32,
    pub profile: ColorProfile,
}

/// Deferred composer construction: runs inside the dedicated draw-lane
/// thread so the GPU context never leaves it.
pub type ComposerFactory = Box<dyn FnOnce(ComposerBinding) -> Result<Box<dyn Composer>> + Send>;

/// One transcode run: source, collaborators, options and the overlay.
pub struct TranscodeJob {
    /// Probed source metadata (with documented defaults applied).
    pub probed: ProbedSource,
    /// Demuxer over the original file; supplies the video track for decode
    /// and the audio track for the final remux.
    pub source: Box<dyn Demuxer>,
    pub decoders: Box<dyn DecoderRegistry>,
    pub encoder: Box<dyn EncoderBackend>,
    /// Holder for the intermediate elementary video stream.
    pub temp_store: Box<dyn ElementaryStore>,
    /// Sink for the final remuxed container.
    pub output: Box<dyn SampleSink>,
    pub options: TranscodeOptions,
    pub overlay: OverlayPaint,
    pub composer: ComposerFactory,
}

impl TranscodeJob {
    /// The production composer: a wgpu context created on the draw lane.
    pub fn gpu_composer() -> ComposerFactory {
        Box::new(|binding: ComposerBinding| {
            let ctx = GpuContext::new_blocking(binding.profile.is_hdr())?;
            Ok(Box::new(GpuComposer::new(
                ctx,
                binding.surface,
                binding.source,
                binding.width,
                binding.height,
                binding.profile,
            )) as Box<dyn Composer>)
        })
    }
}

/// Transcode one video file: decode, composite the overlay onto every
/// frame, re-encode, then remux with the original audio track.
///
/// On success the temporary elementary stream is deleted and the report
/// describes the result. On any failure (cancellation included) temporary
/// and partial output artifacts are discarded after full teardown, so the
/// run never leaves a corrupt result behind.
pub async fn transcode(job: TranscodeJob, cancel: CancelHandle) -> Result<TranscodeReport> {
    let TranscodeJob {
        probed,
        mut source,
        decoders,
        encoder,
        mut temp_store,
        mut output,
        options,
        overlay,
        composer,
    } = job;

    let mut phase = PhaseCell::new();
    let result = run(
        &probed,
        source.as_mut(),
        decoders.as_ref(),
        encoder,
        temp_store.as_mut(),
        output.as_mut(),
        &options,
        overlay,
        composer,
        &cancel,
        &mut phase,
    )
    .await;
    phase.finalize();

    match result {
        Ok(report) => {
            // The intermediate stream is deleted only after the result has
            // been durably produced.
            temp_store.discard();
            info!(
                frames = report.frames_rendered,
                duration_ms = report.duration_ms,
                "transcode complete"
            );
            Ok(report)
        }
        Err(e) => {
            temp_store.discard();
            output.discard();
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    probed: &ProbedSource,
    source: &mut dyn Demuxer,
    decoders: &dyn DecoderRegistry,
    encoder_backend: Box<dyn EncoderBackend>,
    temp_store: &mut dyn ElementaryStore,
    output: &mut dyn SampleSink,
    options: &TranscodeOptions,
    overlay: OverlayPaint,
    composer: ComposerFactory,
    cancel: &CancelHandle,
    phase: &mut PhaseCell,
) -> Result<TranscodeReport> {
    // The color profile gates decoder, encoder and shader configuration, so
    // it is resolved before any of them exists.
    let resolved = resolve(probed, options.tone_map_to_sdr)?;
    info!(
        width = resolved.width,
        height = resolved.height,
        transfer = resolved.color.transfer.name(),
        profile = ?resolved.color.codec_profile,
        "profile resolved"
    );

    let hdr = resolved.color.is_hdr().then(|| HdrEncodingParams {
        standard: resolved.color.standard,
        transfer: resolved.color.transfer,
        codec_profile: resolved.color.codec_profile,
    });
    let config = EncoderConfig {
        mime: options.codec_mime.clone(),
        width: resolved.width,
        height: resolved.height,
        frame_rate: resolved.frame_rate,
        bit_rate: options.bit_rate,
        keyframe_interval_sec: options.keyframe_interval_sec,
        hdr,
    };

    let mut encoder = FrameEncoder::prepare(config, encoder_backend, temp_store.writer()?)?;
    let surface = encoder.input_surface()?;

    let image_source = FrameImageSource::new();
    let decoder = match FrameDecoder::prepare(
        source,
        decoders,
        image_source.publisher(),
        options.tone_map_to_sdr,
    ) {
        Ok(decoder) => decoder,
        Err(e) => {
            // The encoder is already holding a device; release it before
            // surfacing the prepare failure.
            encoder.abort();
            return Err(e);
        }
    };

    phase.advance(Phase::Running)?;

    // Two concurrent tasks: the encoder drain and the draw lane. They share
    // nothing but the image-source slot and the surface channel, each
    // single-writer by construction.
    let stop_encoder = CancelHandle::new();
    let encoder_task = tokio::spawn(encoder.run(stop_encoder.clone()));

    let binding = ComposerBinding {
        surface,
        source: image_source.consumer(),
        width: resolved.width,
        height: resolved.height,
        profile: resolved.color,
    };
    let draw_cancel = cancel.clone();
    let frame_rate = resolved.frame_rate;
    let draw_task = tokio::task::spawn_blocking(move || {
        draw_lane(binding, composer, decoder, overlay, frame_rate, draw_cancel)
    });

    let draw_result = match draw_task.await {
        Ok(result) => result,
        Err(e) => Err(Error::Codec(format!("draw lane panicked: {e}"))),
    };

    // The decoder ran dry (or the loop stopped): no more frames will reach
    // the encoder surface.
    phase.advance(Phase::Draining)?;

    // Stop the encoder and join it; its teardown (end-of-stream signal,
    // device stop, sink finalize) runs inside the task unconditionally.
    stop_encoder.cancel();
    let encoder_result = match encoder_task.await {
        Ok(result) => result,
        Err(e) => Err(Error::Codec(format!("encoder task panicked: {e}"))),
    };

    image_source.destroy();
    phase.advance(Phase::Destroyed)?;

    let (frames_rendered, duration_ms) = draw_result?;
    encoder_result?;

    // Final remux: original audio plus the freshly encoded video.
    let mut video = temp_store.reader()?;
    let mut audio = source.select_track(MIME_AUDIO_PREFIX);
    let stats = mix_av_tracks(audio.as_deref_mut(), video.as_mut(), output, cancel)?;

    Ok(TranscodeReport {
        frames_rendered,
        duration_ms,
        video_samples: stats.video_samples,
        audio_samples: stats.audio_samples,
    })
}

/// The dedicated thread owning composer and decoder for the whole run: all
/// rendering state mutation is serialized here.
fn draw_lane(
    binding: ComposerBinding,
    factory: ComposerFactory,
    mut decoder: FrameDecoder,
    mut overlay: OverlayPaint,
    frame_rate: FrameRate,
    cancel: CancelHandle,
) -> Result<(u64, i64)> {
    let result = (|| {
        let mut composer = factory(binding)?;
        let outcome = composer.prepare().and_then(|_| {
            let mut timing = FrameTiming::new(frame_rate);
            let mut frames_rendered = 0u64;
            let loop_result = composer.draw_loop(&cancel, &mut |painter| {
                // Advance the decoder to this frame's position, then render
                // video and overlay; the frame's own position is its
                // presentation timestamp.
                let position_ms = timing.step();
                let decoded = decoder.advance_to(position_ms, &cancel)?;
                painter.draw_video()?;
                painter.draw_overlay(overlay.as_mut())?;
                if decoded.is_some() {
                    frames_rendered += 1;
                }
                Ok(DrawStatus {
                    has_next: decoded.is_some(),
                    pts_us: position_ms * 1000,
                })
            });
            loop_result.map(|_| (frames_rendered, frames_rendered as i64 * timing.interval_ms()))
        });
        // Release runs on this thread on every exit path, cancellation
        // included.
        composer.destroy();
        outcome
    })();
    decoder.destroy();
    result
}

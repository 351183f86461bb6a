//! Frame encoder: surface-driven input, asynchronous sample drain.

use burnin_core::{CancelHandle, Error, Result};
use tracing::{debug, info};

use crate::codec::{CodecPoll, EncoderBackend, EncoderConfig};
use crate::container::SampleSink;
use crate::sample::SampleFlags;
use crate::surface::EncoderSurface;

/// Accepts composited frames through a GPU-writable surface and drains the
/// resulting compressed samples into a single-track container.
pub struct FrameEncoder {
    backend: Box<dyn EncoderBackend>,
    sink: Box<dyn SampleSink>,
}

impl FrameEncoder {
    /// Configure the encoder device. Fails with `ResourceUnavailable` when
    /// the requested codec cannot be instantiated; there is no retry.
    pub fn prepare(
        config: EncoderConfig,
        mut backend: Box<dyn EncoderBackend>,
        sink: Box<dyn SampleSink>,
    ) -> Result<Self> {
        backend.configure(&config)?;
        info!(
            mime = %config.mime,
            width = config.width,
            height = config.height,
            hdr = config.hdr.is_some(),
            "encoder prepared"
        );
        Ok(Self { backend, sink })
    }

    /// The surface the compositor renders into.
    pub fn input_surface(&mut self) -> Result<EncoderSurface> {
        self.backend.input_surface()
    }

    /// Run the drain loop until `stop` is signalled or the device reports
    /// end of stream.
    ///
    /// The video track is added to the sink exactly once, when the device
    /// finalizes its output format; only then are the codec-specific
    /// configuration parameters complete. Teardown always runs, stop or
    /// error, in fixed order: signal end of input, stop the encoder, then
    /// finalize (or discard) the sink. Teardown itself is not cancellable.
    pub async fn run(mut self, stop: CancelHandle) -> Result<()> {
        let result = self.drain(&stop).await;

        self.backend.signal_end_of_input();
        self.backend.stop();
        match result {
            Ok(()) => {
                self.sink.finish()?;
                debug!("encoder drain complete");
                Ok(())
            }
            Err(e) => {
                self.sink.discard();
                Err(e)
            }
        }
    }

    /// Release the device and abandon the sink without draining. Used when
    /// a later pipeline stage fails to prepare after this encoder was
    /// already configured.
    pub fn abort(mut self) {
        self.backend.signal_end_of_input();
        self.backend.stop();
        self.sink.discard();
    }

    async fn drain(&mut self, stop: &CancelHandle) -> Result<()> {
        self.backend.start()?;
        let mut track: Option<usize> = None;

        loop {
            // Cooperative yield so cancellation and the draw task are never
            // starved by a busy device.
            tokio::task::yield_now().await;

            match self.backend.poll_output()? {
                // A stop request takes effect once the device has nothing
                // ready: samples already produced still get muxed.
                CodecPoll::TryAgain => {
                    if stop.is_cancelled() {
                        return Ok(());
                    }
                }
                CodecPoll::FormatChanged(descriptor) => {
                    if track.is_some() {
                        return Err(Error::Codec(
                            "encoder changed its output format mid-stream".into(),
                        ));
                    }
                    let index = self.sink.add_track(&descriptor)?;
                    self.sink.start()?;
                    track = Some(index);
                    debug!(?index, "video track registered with negotiated format");
                }
                CodecPoll::Ready(sample) => {
                    if sample.info.flags.contains(SampleFlags::CODEC_CONFIG) {
                        // Configuration data already lives in the track
                        // descriptor; never muxed as a sample.
                        continue;
                    }
                    let Some(index) = track else {
                        return Err(Error::Codec(
                            "encoder produced a sample before its format".into(),
                        ));
                    };
                    self.sink.write_sample(index, &sample.data, &sample.info)?;
                }
                CodecPoll::EndOfStream => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;
    use crate::surface::SurfaceFrame;
    use crate::testing::{ResourceLedger, ScriptedEncoderBackend};
    use burnin_core::{FrameBuffer, FrameRate, PixelFormat};
    use std::sync::Arc;

    fn config() -> EncoderConfig {
        EncoderConfig {
            mime: crate::sample::MIME_VIDEO_HEVC.into(),
            width: 64,
            height: 64,
            frame_rate: FrameRate::FPS_30,
            bit_rate: 1_000_000,
            keyframe_interval_sec: 1,
            hdr: None,
        }
    }

    fn frame(pts_us: i64) -> SurfaceFrame {
        SurfaceFrame {
            buffer: FrameBuffer::new(64, 64, PixelFormat::Rgba8),
            pts_us,
        }
    }

    #[tokio::test]
    async fn drain_adds_track_once_and_skips_config_samples() {
        let ledger = Arc::new(ResourceLedger::default());
        let backend = Box::new(ScriptedEncoderBackend::new(ledger.clone()));
        let container = MemoryContainer::new();

        let mut encoder =
            FrameEncoder::prepare(config(), backend, Box::new(container.clone())).unwrap();
        let surface = encoder.input_surface().unwrap();

        for i in 0..4 {
            surface.submit(frame(i * 33_333).buffer, i * 33_333).unwrap();
        }
        drop(surface);

        let stop = CancelHandle::new();
        encoder.run(stop).await.unwrap();

        // One track, four picture samples; the codec-config buffer was not
        // written.
        assert_eq!(container.track_count(), 1);
        assert_eq!(container.sample_count(0), 4);
        assert!(container.is_finished());
        assert!(ledger.balanced());
    }

    #[tokio::test]
    async fn stop_flag_ends_drain_and_still_tears_down() {
        let ledger = Arc::new(ResourceLedger::default());
        let backend = Box::new(ScriptedEncoderBackend::new(ledger.clone()));
        let container = MemoryContainer::new();

        let encoder =
            FrameEncoder::prepare(config(), backend, Box::new(container.clone())).unwrap();

        let stop = CancelHandle::new();
        stop.cancel();
        encoder.run(stop).await.unwrap();
        assert!(ledger.balanced());
    }
}

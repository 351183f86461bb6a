//! Frame decoder: timestamp-driven, forward-only decode to an image source.

use burnin_color::ColorTransfer;
use burnin_core::{CancelHandle, Error, Result, END_OF_TRACK_US};
use tracing::{debug, info};

use crate::codec::{CodecPoll, DecoderBackend, DecoderRegistry};
use crate::container::{Demuxer, SampleSource};
use crate::sample::{MIME_VIDEO_DOLBY_VISION, MIME_VIDEO_HEVC, MIME_VIDEO_PREFIX};
use crate::surface::FramePublisher;

/// Iterations without input or output progress before the pull loop gives
/// up on the device. The underlying protocol has no timeout of its own, so
/// this bounds how long a single [`FrameDecoder::advance_to`] may spin.
pub const MAX_IDLE_POLLS: u32 = 10_000;

/// Decodes a compressed video track in presentation order, rendering frames
/// to an image source the compositor samples from.
///
/// The track is consumed strictly forward: sequential timestamp requests
/// never trigger a seek back to a keyframe.
pub struct FrameDecoder {
    backend: Option<Box<dyn DecoderBackend>>,
    track: Option<Box<dyn SampleSource>>,
    read_buf: Vec<u8>,
    exhausted: bool,
}

impl FrameDecoder {
    /// Select the video track, pick a decoder for its codec and start it.
    ///
    /// When `tone_map_to_sdr` is set the decoder is asked to output SDR
    /// regardless of the source transfer function. A Dolby Vision track
    /// falls back to the HEVC decoder when no Dolby Vision implementation
    /// exists; cross-codec profiles are never substituted.
    pub fn prepare(
        source: &mut dyn Demuxer,
        registry: &dyn DecoderRegistry,
        output: FramePublisher,
        tone_map_to_sdr: bool,
    ) -> Result<Self> {
        let track = source.select_track(MIME_VIDEO_PREFIX).ok_or_else(|| {
            Error::Configuration(format!("no {MIME_VIDEO_PREFIX} track in source"))
        })?;
        let descriptor = track.descriptor().clone();

        let mut backend = match registry.create(&descriptor.mime) {
            Some(backend) => backend,
            // Dolby Vision profiles that are HLG-compatible decode as plain
            // HEVC; true Dolby Vision content has no such fallback.
            None if descriptor.mime == MIME_VIDEO_DOLBY_VISION => {
                info!("no Dolby Vision decoder available, decoding as HEVC");
                registry.create(MIME_VIDEO_HEVC).ok_or_else(|| {
                    Error::ResourceUnavailable(
                        "no decoder for video/dolby-vision or its HEVC fallback".into(),
                    )
                })?
            }
            None => {
                return Err(Error::ResourceUnavailable(format!(
                    "no decoder for {}",
                    descriptor.mime
                )))
            }
        };

        let transfer_override = tone_map_to_sdr.then_some(ColorTransfer::Sdr);
        if let Err(e) = backend
            .configure(&descriptor, output, transfer_override)
            .and_then(|_| backend.start())
        {
            backend.stop();
            return Err(e);
        }

        info!(mime = %descriptor.mime, "decoder prepared");
        Ok(Self {
            backend: Some(backend),
            track: Some(track),
            read_buf: Vec::new(),
            exhausted: false,
        })
    }

    /// Decode forward until a frame with presentation timestamp >=
    /// `target_ms` has been rendered to the image source.
    ///
    /// Returns that frame's timestamp in milliseconds, or `None` once the
    /// track is exhausted before the target is reached. After exhaustion
    /// every further call returns `None`. Every loop iteration is a
    /// cancellation point.
    pub fn advance_to(&mut self, target_ms: i64, cancel: &CancelHandle) -> Result<Option<i64>> {
        let Self {
            backend: Some(backend),
            track: Some(track),
            read_buf,
            exhausted,
        } = self
        else {
            return Err(Error::Configuration(
                "decoder used after destroy".into(),
            ));
        };

        if *exhausted || track.sample_time_us() == END_OF_TRACK_US {
            *exhausted = true;
            return Ok(None);
        }

        let mut idle_polls = 0u32;
        loop {
            cancel.checkpoint()?;
            let mut progressed = false;

            // Feed one compressed sample when the device has a free slot.
            // Not seeking keeps sequential requests fast: the track cursor
            // only ever moves forward.
            let fed = match backend.dequeue_input()? {
                Some(slot) => match track.read_sample(read_buf)? {
                    Some(size) => {
                        backend.queue_input(
                            slot,
                            &read_buf[..size],
                            track.sample_time_us(),
                            track.sample_flags(),
                        )?;
                        progressed = true;
                        true
                    }
                    None => {
                        *exhausted = true;
                        return Ok(None);
                    }
                },
                None => false,
            };

            // Drain whatever the device has decoded so far.
            let mut reached = None;
            loop {
                cancel.checkpoint()?;
                match backend.poll_frame()? {
                    CodecPoll::TryAgain => break,
                    CodecPoll::FormatChanged(_) => {
                        progressed = true;
                    }
                    CodecPoll::EndOfStream => {
                        *exhausted = true;
                        return Ok(None);
                    }
                    CodecPoll::Ready(frame) => {
                        progressed = true;
                        let pts_ms = frame.pts_us / 1000;
                        if target_ms <= pts_ms {
                            reached = Some(pts_ms);
                            break;
                        }
                    }
                }
            }

            // Move past the sample we handed in, only after it was queued.
            if fed && !track.advance() {
                *exhausted = true;
                if reached.is_none() {
                    return Ok(None);
                }
            }

            if let Some(pts_ms) = reached {
                return Ok(Some(pts_ms));
            }

            if progressed {
                idle_polls = 0;
            } else {
                idle_polls += 1;
                if idle_polls >= MAX_IDLE_POLLS {
                    return Err(Error::Codec(format!(
                        "decoder made no progress in {MAX_IDLE_POLLS} polls"
                    )));
                }
                std::thread::yield_now();
            }
        }
    }

    /// Stop and release the decoder and the track reader. Idempotent and
    /// safe after a partially failed prepare.
    pub fn destroy(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop();
            debug!("decoder destroyed");
        }
        self.track = None;
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        self.destroy();
    }
}

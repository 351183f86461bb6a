//! Scripted codec backends and test instrumentation.
//!
//! These implement the backend protocol deterministically, with no devices
//! and no I/O, so the pipeline's coordination logic can be exercised in
//! unit and integration tests. Every prepare/release pair is counted in a
//! [`ResourceLedger`] so leak checks can assert that teardown ran on every
//! exit path.

use burnin_color::ColorTransfer;
use burnin_core::{Error, FrameBuffer, PixelFormat, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::{
    CodecPoll, DecodedFrame, DecoderBackend, DecoderRegistry, EncodedSample, EncoderBackend,
    EncoderConfig, InputSlot,
};
use crate::container::MemoryContainer;
use crate::sample::{SampleFlags, SampleInfo, TrackDescriptor};
use crate::surface::{
    encoder_surface, EncoderSurface, FramePublisher, SurfaceConsumer, SurfacePoll,
};

/// Counts native-handle acquisitions and releases.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ResourceLedger {
    pub fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// True when every acquisition has a matching release.
    pub fn balanced(&self) -> bool {
        self.acquired() == self.released()
    }
}

/// How many input slots the scripted decoder exposes at once.
const SCRIPTED_INPUT_SLOTS: usize = 2;

/// A decoder that "decodes" each queued sample into a solid-color frame
/// published to the image source, one output per input, in order.
pub struct ScriptedDecoderBackend {
    ledger: Arc<ResourceLedger>,
    publisher: Option<FramePublisher>,
    queued: VecDeque<i64>,
    width: u32,
    height: u32,
    hdr_output: bool,
    /// When set, the device stops making progress after this many frames,
    /// exercising the caller's idle-poll budget.
    stall_after: Option<u64>,
    frames_produced: u64,
    started: bool,
    stopped: bool,
}

impl ScriptedDecoderBackend {
    pub fn new(ledger: Arc<ResourceLedger>) -> Self {
        Self {
            ledger,
            publisher: None,
            queued: VecDeque::new(),
            width: 0,
            height: 0,
            hdr_output: false,
            stall_after: None,
            frames_produced: 0,
            started: false,
            stopped: false,
        }
    }

    pub fn stalling_after(mut self, frames: u64) -> Self {
        self.stall_after = Some(frames);
        self
    }

    fn stalled(&self) -> bool {
        self.stall_after
            .is_some_and(|limit| self.frames_produced >= limit)
    }
}

impl DecoderBackend for ScriptedDecoderBackend {
    fn configure(
        &mut self,
        track: &TrackDescriptor,
        output: FramePublisher,
        transfer_override: Option<ColorTransfer>,
    ) -> Result<()> {
        self.width = track.width.max(2);
        self.height = track.height.max(2);
        // SDR override or an SDR track keeps the 8-bit path.
        self.hdr_output = transfer_override.is_none()
            && track.color.is_some_and(|c| c.transfer.is_hdr());
        self.publisher = Some(output);
        self.ledger.acquire();
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn dequeue_input(&mut self) -> Result<Option<InputSlot>> {
        if !self.started {
            return Err(Error::Codec("decoder polled before start".into()));
        }
        if self.stalled() || self.queued.len() >= SCRIPTED_INPUT_SLOTS {
            return Ok(None);
        }
        Ok(Some(InputSlot(self.queued.len())))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        _data: &[u8],
        pts_us: i64,
        _flags: SampleFlags,
    ) -> Result<()> {
        self.queued.push_back(pts_us);
        Ok(())
    }

    fn poll_frame(&mut self) -> Result<CodecPoll<DecodedFrame>> {
        if self.stalled() {
            return Ok(CodecPoll::TryAgain);
        }
        let Some(pts_us) = self.queued.pop_front() else {
            return Ok(CodecPoll::TryAgain);
        };
        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| Error::Codec("decoder not configured".into()))?;
        let buffer = if self.hdr_output {
            FrameBuffer::new(self.width, self.height, PixelFormat::Yuv16)
        } else {
            FrameBuffer::solid(self.width, self.height, [0, 255, 0, 255])
        };
        publisher.publish(buffer, pts_us);
        self.frames_produced += 1;
        Ok(CodecPoll::Ready(DecodedFrame { pts_us }))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.ledger.release();
        }
    }
}

/// Registry creating [`ScriptedDecoderBackend`]s for a fixed mime list.
pub struct StubRegistry {
    mimes: Vec<String>,
    ledger: Arc<ResourceLedger>,
    stall_after: Option<u64>,
}

impl StubRegistry {
    pub fn new(mimes: &[&str], ledger: Arc<ResourceLedger>) -> Self {
        Self {
            mimes: mimes.iter().map(|m| m.to_string()).collect(),
            ledger,
            stall_after: None,
        }
    }

    pub fn stalling_after(mut self, frames: u64) -> Self {
        self.stall_after = Some(frames);
        self
    }
}

impl DecoderRegistry for StubRegistry {
    fn create(&self, mime: &str) -> Option<Box<dyn DecoderBackend>> {
        if !self.mimes.iter().any(|m| m == mime) {
            return None;
        }
        let mut backend = ScriptedDecoderBackend::new(self.ledger.clone());
        if let Some(frames) = self.stall_after {
            backend = backend.stalling_after(frames);
        }
        Some(Box::new(backend))
    }
}

/// An encoder that turns each surface frame into one "compressed" sample.
///
/// Emits the negotiated format first, then a codec-config buffer, then one
/// keyframe-flagged sample per keyframe interval.
pub struct ScriptedEncoderBackend {
    ledger: Arc<ResourceLedger>,
    config: Option<EncoderConfig>,
    surface: Option<SurfaceConsumer>,
    eos: Arc<AtomicBool>,
    format_emitted: bool,
    config_emitted: bool,
    frames_encoded: u64,
    stopped: bool,
}

impl ScriptedEncoderBackend {
    pub fn new(ledger: Arc<ResourceLedger>) -> Self {
        Self {
            ledger,
            config: None,
            surface: None,
            eos: Arc::new(AtomicBool::new(false)),
            format_emitted: false,
            config_emitted: false,
            frames_encoded: 0,
            stopped: false,
        }
    }

    fn negotiated_descriptor(config: &EncoderConfig) -> TrackDescriptor {
        let mut descriptor = TrackDescriptor::video(config.mime.clone(), config.width, config.height);
        descriptor.frame_rate = Some(config.frame_rate);
        descriptor.bit_rate = Some(config.bit_rate);
        descriptor.color = config.hdr.map(|hdr| crate::sample::TrackColor {
            standard: hdr.standard,
            transfer: hdr.transfer,
        });
        descriptor.codec_config = vec![vec![0x00, 0x00, 0x00, 0x01]];
        descriptor
    }
}

impl EncoderBackend for ScriptedEncoderBackend {
    fn configure(&mut self, config: &EncoderConfig) -> Result<()> {
        self.config = Some(config.clone());
        self.ledger.acquire();
        Ok(())
    }

    fn input_surface(&mut self) -> Result<EncoderSurface> {
        let (surface, consumer) = encoder_surface(4);
        self.surface = Some(consumer);
        Ok(surface)
    }

    fn start(&mut self) -> Result<()> {
        if self.config.is_none() {
            return Err(Error::Codec("encoder started before configure".into()));
        }
        Ok(())
    }

    fn poll_output(&mut self) -> Result<CodecPoll<EncodedSample>> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Codec("encoder not configured".into()))?;

        if !self.format_emitted {
            self.format_emitted = true;
            return Ok(CodecPoll::FormatChanged(Self::negotiated_descriptor(config)));
        }
        if !self.config_emitted {
            self.config_emitted = true;
            return Ok(CodecPoll::Ready(EncodedSample {
                data: vec![0x00, 0x00, 0x00, 0x01],
                info: SampleInfo {
                    size: 4,
                    pts_us: 0,
                    flags: SampleFlags::CODEC_CONFIG,
                },
            }));
        }

        let Some(surface) = self.surface.as_ref() else {
            return Ok(CodecPoll::EndOfStream);
        };
        match surface.poll() {
            SurfacePoll::Frame(frame) => {
                let keyframe_every =
                    (config.keyframe_interval_sec as u64 * config.frame_rate.fps_hz() as u64).max(1);
                let flags = if self.frames_encoded % keyframe_every == 0 {
                    SampleFlags::KEYFRAME
                } else {
                    SampleFlags::NONE
                };
                self.frames_encoded += 1;
                // Stand-in payload: the frame shrunk to a recognizable stub.
                let data = frame.buffer.data[..frame.buffer.data.len().min(32)].to_vec();
                Ok(CodecPoll::Ready(EncodedSample {
                    info: SampleInfo {
                        size: data.len(),
                        pts_us: frame.pts_us,
                        flags,
                    },
                    data,
                }))
            }
            SurfacePoll::Empty => {
                if self.eos.load(Ordering::SeqCst) {
                    Ok(CodecPoll::EndOfStream)
                } else {
                    Ok(CodecPoll::TryAgain)
                }
            }
            SurfacePoll::Closed => Ok(CodecPoll::EndOfStream),
        }
    }

    fn signal_end_of_input(&mut self) {
        self.eos.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.ledger.release();
        }
    }
}

/// Build a memory container holding one video track of `frames` samples at
/// the given interval, plus optionally one audio track.
pub fn scripted_source(
    video_mime: &str,
    frames: u64,
    frame_interval_us: i64,
    audio_samples: u64,
) -> MemoryContainer {
    let container = MemoryContainer::new();
    let mut descriptor = TrackDescriptor::video(video_mime, 1280, 720);
    descriptor.frame_rate = Some(burnin_core::FrameRate::FPS_30);
    container.push_track(
        descriptor,
        (0..frames as i64).map(|i| {
            let data = vec![0xC0; 64];
            let info = SampleInfo {
                size: data.len(),
                pts_us: i * frame_interval_us,
                flags: if i == 0 {
                    SampleFlags::KEYFRAME
                } else {
                    SampleFlags::NONE
                },
            };
            (data, info)
        }),
    );
    if audio_samples > 0 {
        container.push_track(
            TrackDescriptor::audio(crate::sample::MIME_AUDIO_AAC, 48_000, 2),
            (0..audio_samples as i64).map(|i| {
                let data = vec![0xA0; 32];
                let info = SampleInfo {
                    size: data.len(),
                    pts_us: i * 21_333,
                    flags: SampleFlags::NONE,
                };
                (data, info)
            }),
        );
    }
    container
}

//! FFmpeg-backed production codec backends.
//!
//! The decoder drives an `ffmpeg` process through ffmpeg-sidecar: compressed
//! samples go in on stdin as an elementary stream, raw frames come back on
//! stdout and are adapted to the poll protocol by a reader thread. The
//! encoder pipes raw frames from the input surface into a second process and
//! chunks its elementary-stream output into samples. Sample boundaries on
//! the encode side are transport chunks; access-unit framing is the
//! downstream container collaborator's concern.

use burnin_color::{ColorTransfer, CodecProfile};
use burnin_core::{Error, FrameBuffer, PixelFormat, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec::{
    CodecPoll, DecodedFrame, DecoderBackend, DecoderRegistry, EncodedSample, EncoderBackend,
    EncoderConfig, InputSlot,
};
use crate::sample::{
    SampleFlags, SampleInfo, TrackColor, TrackDescriptor, MIME_VIDEO_AVC, MIME_VIDEO_HEVC,
};
use crate::surface::{encoder_surface, EncoderSurface, FramePublisher, SurfaceConsumer, SurfacePoll};

/// Raw-stream demuxer name for a codec mime, if ffmpeg can take that codec
/// as an elementary stream on stdin.
fn elementary_format(mime: &str) -> Option<&'static str> {
    match mime {
        MIME_VIDEO_HEVC => Some("hevc"),
        MIME_VIDEO_AVC => Some("h264"),
        _ => None,
    }
}

/// Encoder binary name for a codec mime.
fn encoder_name(mime: &str) -> Option<&'static str> {
    match mime {
        MIME_VIDEO_HEVC => Some("libx265"),
        MIME_VIDEO_AVC => Some("libx264"),
        _ => None,
    }
}

enum DecodeEvent {
    Frame(FrameBuffer, i64),
    End,
    Fatal(String),
}

/// Decoder backend running `ffmpeg` as a child process.
pub struct FfmpegDecoderBackend {
    descriptor: Option<TrackDescriptor>,
    publisher: Option<FramePublisher>,
    transfer_override: Option<ColorTransfer>,
    stdin: Option<std::process::ChildStdin>,
    frames: Option<Receiver<DecodeEvent>>,
    reader: Option<JoinHandle<()>>,
    child: Option<ffmpeg_sidecar::child::FfmpegChild>,
}

impl FfmpegDecoderBackend {
    pub fn new() -> Self {
        Self {
            descriptor: None,
            publisher: None,
            transfer_override: None,
            stdin: None,
            frames: None,
            reader: None,
            child: None,
        }
    }

    fn output_format(&self) -> PixelFormat {
        let hdr_source = self
            .descriptor
            .as_ref()
            .and_then(|d| d.color)
            .is_some_and(|c| c.transfer.is_hdr());
        if hdr_source && self.transfer_override.is_none() {
            PixelFormat::Yuv16
        } else {
            PixelFormat::Rgba8
        }
    }
}

impl Default for FfmpegDecoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBackend for FfmpegDecoderBackend {
    fn configure(
        &mut self,
        track: &TrackDescriptor,
        output: FramePublisher,
        transfer_override: Option<ColorTransfer>,
    ) -> Result<()> {
        if elementary_format(&track.mime).is_none() {
            return Err(Error::Configuration(format!(
                "ffmpeg decoder cannot take {} as an elementary stream",
                track.mime
            )));
        }
        self.descriptor = Some(track.clone());
        self.publisher = Some(output);
        self.transfer_override = transfer_override;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or_else(|| Error::Codec("decoder started before configure".into()))?;
        let in_format = elementary_format(&descriptor.mime)
            .ok_or_else(|| Error::Codec("unsupported elementary format".into()))?;
        let pixel_format = self.output_format();
        let pix_fmt = match pixel_format {
            PixelFormat::Rgba8 => "rgba",
            PixelFormat::Yuv16 => "ayuv64le",
            PixelFormat::Rgba16 => "rgba64le",
        };

        let mut command = FfmpegCommand::new();
        command
            .args(["-hide_banner"])
            .format(in_format)
            .input("pipe:0");
        // Decoder-side tone mapping when an SDR override was requested for
        // an HDR source.
        let hdr_source = descriptor
            .color
            .is_some_and(|c: TrackColor| c.transfer.is_hdr());
        if hdr_source && self.transfer_override == Some(ColorTransfer::Sdr) {
            command.args([
                "-vf",
                "zscale=t=linear:npl=100,tonemap=hable,zscale=p=bt709:t=bt709:m=bt709",
            ]);
        }
        command
            .args(["-f", "rawvideo", "-pix_fmt", pix_fmt])
            .output("pipe:1");

        let mut child = command
            .spawn()
            .map_err(|e| Error::ResourceUnavailable(format!("failed to spawn ffmpeg: {e}")))?;
        self.stdin = child.take_stdin();

        let iter = child
            .iter()
            .map_err(|e| Error::ResourceUnavailable(format!("ffmpeg output unavailable: {e}")))?;

        let frame_interval_us = descriptor
            .frame_rate
            .map(|r| r.frame_interval_us())
            .unwrap_or(33_333);
        let (width, height) = (descriptor.width.max(1), descriptor.height.max(1));
        let (tx, rx) = bounded(4);

        let reader = std::thread::spawn(move || {
            let frame_bytes = width as usize * height as usize * pixel_format.bytes_per_pixel();
            let mut pending: Vec<u8> = Vec::new();
            let mut frame_index: i64 = 0;
            let emit = |data: Vec<u8>, pts_us: i64| -> bool {
                match FrameBuffer::from_data(width, height, pixel_format, data) {
                    Ok(buffer) => tx.send(DecodeEvent::Frame(buffer, pts_us)).is_ok(),
                    Err(_) => true,
                }
            };
            for event in iter {
                match event {
                    FfmpegEvent::OutputFrame(frame) => {
                        let pts_us = (frame.timestamp as f64 * 1_000_000.0) as i64;
                        if !emit(frame.data, pts_us) {
                            return;
                        }
                        frame_index += 1;
                    }
                    FfmpegEvent::OutputChunk(chunk) => {
                        pending.extend_from_slice(&chunk);
                        while pending.len() >= frame_bytes {
                            let data: Vec<u8> = pending.drain(..frame_bytes).collect();
                            let pts_us = frame_index * frame_interval_us;
                            if !emit(data, pts_us) {
                                return;
                            }
                            frame_index += 1;
                        }
                    }
                    FfmpegEvent::Error(message) => {
                        let _ = tx.send(DecodeEvent::Fatal(message));
                        return;
                    }
                    FfmpegEvent::Done => break,
                    _ => {}
                }
            }
            let _ = tx.send(DecodeEvent::End);
        });

        self.frames = Some(rx);
        self.reader = Some(reader);
        self.child = Some(child);
        debug!(format = in_format, pix_fmt, "ffmpeg decoder started");
        Ok(())
    }

    fn dequeue_input(&mut self) -> Result<Option<InputSlot>> {
        Ok(self.stdin.is_some().then_some(InputSlot(0)))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        _pts_us: i64,
        _flags: SampleFlags,
    ) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Codec("decoder input is closed".into()))?;
        stdin
            .write_all(data)
            .map_err(|e| Error::Codec(format!("failed to feed decoder: {e}")))
    }

    fn poll_frame(&mut self) -> Result<CodecPoll<DecodedFrame>> {
        let Some(frames) = self.frames.as_ref() else {
            return Err(Error::Codec("decoder polled before start".into()));
        };
        match frames.try_recv() {
            Ok(DecodeEvent::Frame(buffer, pts_us)) => {
                let publisher = self
                    .publisher
                    .as_ref()
                    .ok_or_else(|| Error::Codec("decoder not configured".into()))?;
                publisher.publish(buffer, pts_us);
                Ok(CodecPoll::Ready(DecodedFrame { pts_us }))
            }
            Ok(DecodeEvent::End) => Ok(CodecPoll::EndOfStream),
            Ok(DecodeEvent::Fatal(message)) => Err(Error::Codec(message)),
            Err(TryRecvError::Empty) => Ok(CodecPoll::TryAgain),
            Err(TryRecvError::Disconnected) => Ok(CodecPoll::EndOfStream),
        }
    }

    fn stop(&mut self) {
        self.stdin = None; // closes the pipe, letting ffmpeg flush
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("failed to kill ffmpeg decoder: {e}");
            }
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for FfmpegDecoderBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Registry for the codecs the ffmpeg decoder backend handles.
///
/// Dolby Vision is deliberately absent: the frame decoder substitutes plain
/// HEVC for the HLG-compatible profiles.
pub struct FfmpegDecoders;

impl DecoderRegistry for FfmpegDecoders {
    fn create(&self, mime: &str) -> Option<Box<dyn DecoderBackend>> {
        if elementary_format(mime).is_some() {
            Some(Box::new(FfmpegDecoderBackend::new()))
        } else {
            None
        }
    }
}

// ── Encoder ─────────────────────────────────────────────────────

enum EncodeEvent {
    Sample(Vec<u8>),
    End,
    Fatal(String),
}

/// Encoder backend piping raw frames into a spawned `ffmpeg`.
pub struct FfmpegEncoderBackend {
    config: Option<EncoderConfig>,
    surface: Option<SurfaceConsumer>,
    surface_handle: Option<EncoderSurface>,
    eos: Arc<AtomicBool>,
    child: Option<Child>,
    feeder: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    samples: Option<Receiver<EncodeEvent>>,
    format_emitted: bool,
    sample_index: i64,
}

impl FfmpegEncoderBackend {
    pub fn new() -> Self {
        Self {
            config: None,
            surface: None,
            surface_handle: None,
            eos: Arc::new(AtomicBool::new(false)),
            child: None,
            feeder: None,
            reader: None,
            samples: None,
            format_emitted: false,
            sample_index: 0,
        }
    }

    fn ffmpeg_args(config: &EncoderConfig) -> Result<Vec<String>> {
        let encoder = encoder_name(&config.mime).ok_or_else(|| {
            Error::ResourceUnavailable(format!("no encoder for {}", config.mime))
        })?;
        let input_pixel_format = if config.hdr.is_some() { "rgba64le" } else { "rgba" };

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            input_pixel_format.into(),
            "-video_size".into(),
            format!("{}x{}", config.width, config.height),
            "-framerate".into(),
            format!(
                "{}/{}",
                config.frame_rate.numerator, config.frame_rate.denominator
            ),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            encoder.into(),
            "-b:v".into(),
            config.bit_rate.to_string(),
            "-g".into(),
            (config.keyframe_interval_sec as i64 * config.frame_rate.fps_hz() as i64)
                .max(1)
                .to_string(),
        ];

        if let Some(hdr) = config.hdr {
            let transfer = match hdr.transfer {
                ColorTransfer::Hlg => "arib-std-b67",
                ColorTransfer::Pq => "smpte2084",
                ColorTransfer::Sdr => "bt709",
            };
            let mut x265_params =
                format!("colorprim=bt2020:transfer={transfer}:colormatrix=bt2020nc");
            if hdr.codec_profile == CodecProfile::Main10Hdr10 {
                x265_params.push_str(":hdr10=1");
            }
            args.extend_from_slice(&[
                "-profile:v".into(),
                hdr.codec_profile.encoder_name().into(),
                "-pix_fmt".into(),
                "yuv420p10le".into(),
                "-x265-params".into(),
                x265_params,
            ]);
        } else {
            args.extend_from_slice(&["-pix_fmt".into(), "yuv420p".into()]);
        }

        let out_format = match config.mime.as_str() {
            MIME_VIDEO_AVC => "h264",
            _ => "hevc",
        };
        args.extend_from_slice(&["-f".into(), out_format.into(), "pipe:1".into()]);
        Ok(args)
    }

    fn negotiated_descriptor(config: &EncoderConfig) -> TrackDescriptor {
        let mut descriptor =
            TrackDescriptor::video(config.mime.clone(), config.width, config.height);
        descriptor.frame_rate = Some(config.frame_rate);
        descriptor.bit_rate = Some(config.bit_rate);
        descriptor.color = config.hdr.map(|hdr| TrackColor {
            standard: hdr.standard,
            transfer: hdr.transfer,
        });
        descriptor
    }
}

impl Default for FfmpegEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBackend for FfmpegEncoderBackend {
    fn configure(&mut self, config: &EncoderConfig) -> Result<()> {
        // Argument construction is where an unsupported codec surfaces.
        Self::ffmpeg_args(config)?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn input_surface(&mut self) -> Result<EncoderSurface> {
        if self.config.is_none() {
            return Err(Error::Codec("surface requested before configure".into()));
        }
        let (surface, consumer) = encoder_surface(4);
        self.surface = Some(consumer);
        self.surface_handle = Some(surface.clone());
        Ok(surface)
    }

    fn start(&mut self) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Codec("encoder started before configure".into()))?;
        let consumer = self
            .surface
            .take()
            .ok_or_else(|| Error::Codec("encoder started without an input surface".into()))?;

        let args = Self::ffmpeg_args(config)?;
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ResourceUnavailable(format!("failed to spawn ffmpeg: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ResourceUnavailable("failed to open ffmpeg stdin".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ResourceUnavailable("failed to open ffmpeg stdout".into()))?;

        let eos = self.eos.clone();
        let feeder = std::thread::spawn(move || {
            loop {
                match consumer.recv_timeout(Duration::from_millis(50)) {
                    SurfacePoll::Frame(frame) => {
                        if stdin.write_all(&frame.buffer.data).is_err() {
                            break;
                        }
                    }
                    SurfacePoll::Empty => {
                        if eos.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    SurfacePoll::Closed => break,
                }
            }
            // Dropping stdin signals end of stream to the encoder.
        });

        let (tx, rx) = bounded(16);
        let reader = std::thread::spawn(move || {
            use std::io::Read;
            let mut chunk = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) => {
                        let _ = tx.send(EncodeEvent::End);
                        return;
                    }
                    Ok(n) => {
                        if tx.send(EncodeEvent::Sample(chunk[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(EncodeEvent::Fatal(e.to_string()));
                        return;
                    }
                }
            }
        });

        self.child = Some(child);
        self.feeder = Some(feeder);
        self.reader = Some(reader);
        self.samples = Some(rx);
        debug!("ffmpeg encoder started");
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
        let Some(samples) = self.samples.as_ref() else {
            return Err(Error::Codec("encoder polled before start".into()));
        };
        match samples.try_recv() {
            Ok(EncodeEvent::Sample(data)) => {
                let pts_us = self.sample_index * config.frame_rate.frame_interval_us();
                let flags = if self.sample_index == 0 {
                    SampleFlags::KEYFRAME
                } else {
                    SampleFlags::NONE
                };
                self.sample_index += 1;
                Ok(CodecPoll::Ready(EncodedSample {
                    info: SampleInfo {
                        size: data.len(),
                        pts_us,
                        flags,
                    },
                    data,
                }))
            }
            Ok(EncodeEvent::End) => Ok(CodecPoll::EndOfStream),
            Ok(EncodeEvent::Fatal(message)) => Err(Error::Codec(message)),
            Err(TryRecvError::Empty) => Ok(CodecPoll::TryAgain),
            Err(TryRecvError::Disconnected) => Ok(CodecPoll::EndOfStream),
        }
    }

    fn signal_end_of_input(&mut self) {
        self.eos.store(true, Ordering::SeqCst);
        // Drop our producer handle so the feeder sees the channel close once
        // the compositor's handle is gone too.
        self.surface_handle = None;
    }

    fn stop(&mut self) {
        self.samples = None;
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("failed to kill ffmpeg encoder: {e}");
            }
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for FfmpegEncoderBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

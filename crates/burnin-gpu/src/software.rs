//! CPU reference composer.
//!
//! Implements the same seam as [`crate::GpuComposer`] with plain pixel
//! arithmetic: video base layer, straight-alpha overlay on top. Used by the
//! test suite and as a fallback where no GPU adapter exists.

use burnin_color::{yuv_to_rgb_bt2020, ColorProfile};
use burnin_core::{CancelHandle, Error, FrameBuffer, PixelFormat, Result};
use burnin_media::{EncoderSurface, FrameConsumer};
use tracing::debug;

use crate::canvas::OverlayCanvas;
use crate::compose::{Composer, DrawStatus, FramePainter};

/// CPU compositing into the encoder surface.
pub struct SoftwareComposer {
    surface: EncoderSurface,
    source: FrameConsumer,
    canvas: OverlayCanvas,
    width: u32,
    height: u32,
    profile: ColorProfile,
    target_format: PixelFormat,
    /// The most recently imported video frame, already in target format.
    video_plane: Option<FrameBuffer>,
    target: Option<FrameBuffer>,
}

impl SoftwareComposer {
    pub fn new(
        surface: EncoderSurface,
        source: FrameConsumer,
        width: u32,
        height: u32,
        profile: ColorProfile,
    ) -> Self {
        let target_format = if profile.is_hdr() {
            PixelFormat::Rgba16
        } else {
            PixelFormat::Rgba8
        };
        Self {
            surface,
            source,
            canvas: OverlayCanvas::new(width, height),
            width,
            height,
            profile,
            target_format,
            video_plane: None,
            target: None,
        }
    }

    fn target_mut(&mut self) -> Result<&mut FrameBuffer> {
        self.target
            .as_mut()
            .ok_or_else(|| Error::Configuration("composer used before prepare".into()))
    }

    /// Convert a decoded frame into the target pixel format.
    fn convert(&self, frame: &FrameBuffer) -> Result<FrameBuffer> {
        match (frame.format, self.target_format) {
            (PixelFormat::Rgba8, PixelFormat::Rgba8) => Ok(frame.clone()),
            (PixelFormat::Yuv16, PixelFormat::Rgba16) => {
                let mut out = FrameBuffer::new(frame.width, frame.height, PixelFormat::Rgba16);
                for (src, dst) in frame
                    .data
                    .chunks_exact(8)
                    .zip(out.data.chunks_exact_mut(8))
                {
                    // Packed AYCbCr, 16 bits per channel, little endian.
                    let y = u16::from_le_bytes([src[2], src[3]]) as f32 / 65535.0;
                    let u = u16::from_le_bytes([src[4], src[5]]) as f32 / 65535.0;
                    let v = u16::from_le_bytes([src[6], src[7]]) as f32 / 65535.0;
                    let rgb = yuv_to_rgb_bt2020([y, u, v]);
                    for (c, value) in rgb.iter().enumerate() {
                        let word = (value * 65535.0).round() as u16;
                        dst[c * 2..c * 2 + 2].copy_from_slice(&word.to_le_bytes());
                    }
                    dst[6..8].copy_from_slice(&u16::MAX.to_le_bytes());
                }
                Ok(out)
            }
            (from, to) => Err(Error::Configuration(format!(
                "cannot composite {from:?} frames into a {to:?} target"
            ))),
        }
    }
}

impl Composer for SoftwareComposer {
    fn prepare(&mut self) -> Result<()> {
        self.target = Some(FrameBuffer::new(self.width, self.height, self.target_format));
        debug!(hdr = self.profile.is_hdr(), "software composer prepared");
        Ok(())
    }

    fn draw_loop(
        &mut self,
        cancel: &CancelHandle,
        per_frame: &mut dyn FnMut(&mut dyn FramePainter) -> Result<DrawStatus>,
    ) -> Result<()> {
        if self.target.is_none() {
            return Err(Error::Configuration("draw loop before prepare".into()));
        }
        loop {
            cancel.checkpoint()?;
            if let Some(target) = self.target.as_mut() {
                target.data.fill(0);
            }
            let status = per_frame(self)?;
            let frame = self
                .target_mut()?
                .clone();
            self.surface.submit(frame, status.pts_us)?;
            if !status.has_next {
                return Ok(());
            }
        }
    }

    fn destroy(&mut self) {
        if self.target.take().is_some() {
            self.source.detach();
            self.video_plane = None;
            debug!("software composer destroyed");
        }
    }
}

impl FramePainter for SoftwareComposer {
    fn draw_video(&mut self) -> Result<()> {
        self.source.detach();
        self.source.attach();
        if let Some(frame) = self.source.update_if_fresh() {
            self.video_plane = Some(self.convert(&frame.buffer)?);
        }
        if let Some(plane) = self.video_plane.clone() {
            let target = self.target_mut()?;
            target.data.copy_from_slice(&plane.data);
        }
        Ok(())
    }

    fn draw_overlay(&mut self, draw: &mut dyn FnMut(&mut OverlayCanvas)) -> Result<()> {
        self.canvas.clear();
        draw(&mut self.canvas);

        let canvas = self.canvas.clone();
        let bytes_per_channel = match self.target_format {
            PixelFormat::Rgba8 => 1usize,
            _ => 2usize,
        };
        let target = self.target_mut()?;
        for (i, px) in canvas.data().chunks_exact(4).enumerate() {
            let alpha = px[3] as u32;
            if alpha == 0 {
                continue;
            }
            let inv = 255 - alpha;
            let base = i * 4 * bytes_per_channel;
            for c in 0..4 {
                if bytes_per_channel == 1 {
                    let dst = &mut target.data[base + c];
                    *dst = ((px[c] as u32 * alpha + *dst as u32 * inv) / 255) as u8;
                } else {
                    let offset = base + c * 2;
                    let dst = u16::from_le_bytes([target.data[offset], target.data[offset + 1]]);
                    let src = px[c] as u32 * 257; // widen 8-bit to 16-bit
                    let blended = ((src * alpha + dst as u32 * inv) / 255) as u16;
                    target.data[offset..offset + 2].copy_from_slice(&blended.to_le_bytes());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burnin_color::{resolve, ProbedSource};
    use burnin_media::{encoder_surface, FrameImageSource, SurfacePoll};

    fn sdr_profile() -> ColorProfile {
        resolve(&ProbedSource::default(), true).unwrap().color
    }

    #[test]
    fn composites_video_and_overlay_into_one_presented_frame() {
        let (surface, consumer) = encoder_surface(4);
        let image_source = FrameImageSource::new();
        let publisher = image_source.publisher();

        let mut composer =
            SoftwareComposer::new(surface, image_source.consumer(), 4, 4, sdr_profile());
        composer.prepare().unwrap();

        publisher.publish(FrameBuffer::solid(4, 4, [10, 20, 30, 255]), 0);

        let cancel = CancelHandle::new();
        let mut iterations = 0;
        composer
            .draw_loop(&cancel, &mut |painter| {
                painter.draw_video()?;
                painter.draw_overlay(&mut |canvas| {
                    canvas.fill_rect(0, 0, 1, 1, [255, 255, 255, 255]);
                })?;
                iterations += 1;
                Ok(DrawStatus {
                    has_next: false,
                    pts_us: 33_000,
                })
            })
            .unwrap();
        composer.destroy();

        assert_eq!(iterations, 1);
        let SurfacePoll::Frame(frame) = consumer.poll() else {
            panic!("no composited frame presented");
        };
        assert_eq!(frame.pts_us, 33_000);
        // Top-left pixel is the opaque overlay, the rest is video.
        assert_eq!(&frame.buffer.data[0..4], &[255, 255, 255, 255]);
        assert_eq!(&frame.buffer.data[4..8], &[10, 20, 30, 255]);
    }

    #[test]
    fn cancellation_stops_the_loop_before_the_next_frame() {
        let (surface, _consumer) = encoder_surface(4);
        let image_source = FrameImageSource::new();
        let mut composer =
            SoftwareComposer::new(surface, image_source.consumer(), 2, 2, sdr_profile());
        composer.prepare().unwrap();

        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = composer
            .draw_loop(&cancel, &mut |_| {
                panic!("callback must not run after cancellation")
            })
            .unwrap_err();
        assert!(err.is_cancelled());
        composer.destroy();
    }

    #[test]
    fn hdr_frames_convert_to_rgba16() {
        let probed = ProbedSource::default(); // BT.2020 + HLG
        let profile = resolve(&probed, false).unwrap().color;
        let (surface, consumer) = encoder_surface(4);
        let image_source = FrameImageSource::new();

        let mut composer =
            SoftwareComposer::new(surface, image_source.consumer(), 2, 2, profile);
        composer.prepare().unwrap();

        // Limited-range black in packed AYCbCr.
        let mut hdr = FrameBuffer::new(2, 2, PixelFormat::Yuv16);
        for px in hdr.data.chunks_exact_mut(8) {
            px[2..4].copy_from_slice(&((0.0625f32 * 65535.0) as u16).to_le_bytes());
            px[4..6].copy_from_slice(&(32768u16).to_le_bytes());
            px[6..8].copy_from_slice(&(32768u16).to_le_bytes());
        }
        image_source.publisher().publish(hdr, 0);

        composer
            .draw_loop(&CancelHandle::new(), &mut |painter| {
                painter.draw_video()?;
                Ok(DrawStatus {
                    has_next: false,
                    pts_us: 0,
                })
            })
            .unwrap();

        let SurfacePoll::Frame(frame) = consumer.poll() else {
            panic!("no frame presented");
        };
        assert_eq!(frame.buffer.format, PixelFormat::Rgba16);
        // Black video: first three channels near zero.
        let r = u16::from_le_bytes([frame.buffer.data[0], frame.buffer.data[1]]);
        assert!(r < 1000, "expected near-black, got {r}");
    }
}

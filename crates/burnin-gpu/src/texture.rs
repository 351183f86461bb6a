//! GPU texture upload and readback.

use burnin_core::{Error, FrameBuffer, PixelFormat, Result};

/// Map a pipeline pixel format to its texture format.
pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        // Packed 16-bit AYCbCr and 16-bit RGBA both live in Rgba16Unorm;
        // the shader decides how to interpret the channels.
        PixelFormat::Yuv16 | PixelFormat::Rgba16 => wgpu::TextureFormat::Rgba16Unorm,
    }
}

/// A GPU texture holding one video-sized image.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl GpuTexture {
    fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(pixel_format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            pixel_format,
        }
    }

    /// Texture the decoder's frames are imported into.
    pub fn for_video_frames(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self::new(
            device,
            width,
            height,
            pixel_format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            Some("Video Frame Texture"),
        )
    }

    /// Texture the overlay canvas is uploaded into.
    pub fn for_overlay(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::new(
            device,
            width,
            height,
            PixelFormat::Rgba8,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            Some("Overlay Texture"),
        )
    }

    /// The composited render target that feeds the encoder surface.
    pub fn render_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self::new(
            device,
            width,
            height,
            pixel_format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            Some("Composite Target"),
        )
    }

    /// Upload a frame buffer into this texture.
    pub fn upload(&self, queue: &wgpu::Queue, frame: &FrameBuffer) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::Configuration(format!(
                "frame size {}x{} does not match texture size {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if frame.format != self.pixel_format {
            return Err(Error::Configuration(format!(
                "frame format {:?} does not match texture format {:?}",
                frame.format, self.pixel_format
            )));
        }
        self.upload_bytes(queue, &frame.data)
    }

    /// Upload raw, tightly packed pixel data in this texture's format.
    pub fn upload_bytes(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<()> {
        let row_bytes = self.width as usize * self.pixel_format.bytes_per_pixel();
        if data.len() != row_bytes * self.height as usize {
            return Err(Error::Configuration(format!(
                "upload of {} bytes does not fill a {}x{} {:?} texture",
                data.len(),
                self.width,
                self.height,
                self.pixel_format
            )));
        }

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(row_bytes as u32),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Row stride the readback staging buffer needs, padded to the copy
    /// alignment.
    pub fn padded_bytes_per_row(&self) -> u32 {
        let unpadded = self.width * self.pixel_format.bytes_per_pixel() as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        unpadded.div_ceil(align) * align
    }

    /// Copy the texture into `staging` and read it back as a frame buffer.
    pub fn read_back(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        staging: &wgpu::Buffer,
    ) -> Result<FrameBuffer> {
        let padded = self.padded_bytes_per_row();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Composite Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| Error::Codec("readback mapping was abandoned".into()))?
            .map_err(|e| Error::Codec(format!("failed to map readback buffer: {e}")))?;

        let row_bytes = self.width as usize * self.pixel_format.bytes_per_pixel();
        let mut data = Vec::with_capacity(row_bytes * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in 0..self.height as usize {
                let start = row * padded as usize;
                data.extend_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        staging.unmap();

        FrameBuffer::from_data(self.width, self.height, self.pixel_format, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_map_to_expected_texture_formats() {
        assert_eq!(
            texture_format(PixelFormat::Rgba8),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            texture_format(PixelFormat::Yuv16),
            wgpu::TextureFormat::Rgba16Unorm
        );
        assert_eq!(
            texture_format(PixelFormat::Rgba16),
            wgpu::TextureFormat::Rgba16Unorm
        );
    }
}

//! wgpu implementation of the compositing pass.

use burnin_color::{ColorProfile, BT2020_YUV_OFFSET, BT2020_YUV_TO_RGB};
use burnin_core::{CancelHandle, Error, PixelFormat, Result};
use burnin_media::{EncoderSurface, FrameConsumer};
use glam::Mat4;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::canvas::OverlayCanvas;
use crate::compose::{Composer, DrawStatus, FramePainter};
use crate::context::GpuContext;
use crate::shaders::shader_source;
use crate::texture::{texture_format, GpuTexture};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 3],
    uv: [f32; 2],
}

/// Fullscreen quad as a triangle strip.
const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { pos: [-1.0, -1.0, 0.0], uv: [0.0, 0.0] },
    Vertex { pos: [1.0, -1.0, 0.0], uv: [1.0, 0.0] },
    Vertex { pos: [-1.0, 1.0, 0.0], uv: [0.0, 1.0] },
    Vertex { pos: [1.0, 1.0, 0.0], uv: [1.0, 1.0] },
];

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    mvp: [[f32; 4]; 4],
    tex_transform: [[f32; 4]; 4],
    yuv_to_rgb: [[f32; 4]; 4],
    yuv_offset: [f32; 4],
}

impl Uniforms {
    fn with_tex_transform(tex_transform: Mat4) -> Self {
        let m = BT2020_YUV_TO_RGB;
        Self {
            mvp: Mat4::IDENTITY.to_cols_array_2d(),
            tex_transform: tex_transform.to_cols_array_2d(),
            yuv_to_rgb: [
                [m[0][0], m[0][1], m[0][2], 0.0],
                [m[1][0], m[1][1], m[1][2], 0.0],
                [m[2][0], m[2][1], m[2][2], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            yuv_offset: [
                BT2020_YUV_OFFSET[0],
                BT2020_YUV_OFFSET[1],
                BT2020_YUV_OFFSET[2],
                0.0,
            ],
        }
    }

    /// Identity transform: the overlay path flips in the shader instead.
    fn overlay() -> Self {
        Self::with_tex_transform(Mat4::IDENTITY)
    }

    /// Transform applied when sampling imported video frames. Frames are
    /// uploaded top-down while quad coordinates grow upward, so the image
    /// source's transform is a vertical flip.
    fn video() -> Self {
        let flip_y = Mat4::from_translation(glam::Vec3::new(0.0, 1.0, 0.0))
            * Mat4::from_scale(glam::Vec3::new(1.0, -1.0, 1.0));
        Self::with_tex_transform(flip_y)
    }
}

struct GpuResources {
    video_pipeline: wgpu::RenderPipeline,
    overlay_pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    video_tex: GpuTexture,
    overlay_tex: GpuTexture,
    target: GpuTexture,
    staging: wgpu::Buffer,
}

/// The production compositor: renders video + overlay into the encoder's
/// input surface, selecting SDR or HDR shading from the color profile.
///
/// Exactly one thread may own and drive a `GpuComposer`; the pipeline
/// coordinator constructs it inside the dedicated draw-lane thread.
pub struct GpuComposer {
    ctx: GpuContext,
    surface: EncoderSurface,
    source: FrameConsumer,
    canvas: OverlayCanvas,
    width: u32,
    height: u32,
    profile: ColorProfile,
    video_format: PixelFormat,
    target_format: PixelFormat,
    gpu: Option<GpuResources>,
}

impl GpuComposer {
    /// Bind a composer to the encoder surface and the decoder's image
    /// source. GPU resources are not touched until [`Composer::prepare`].
    pub fn new(
        ctx: GpuContext,
        surface: EncoderSurface,
        source: FrameConsumer,
        width: u32,
        height: u32,
        profile: ColorProfile,
    ) -> Self {
        let (video_format, target_format) = if profile.is_hdr() {
            (PixelFormat::Yuv16, PixelFormat::Rgba16)
        } else {
            (PixelFormat::Rgba8, PixelFormat::Rgba8)
        };
        Self {
            ctx,
            surface,
            source,
            canvas: OverlayCanvas::new(width, height),
            width,
            height,
            profile,
            video_format,
            target_format,
            gpu: None,
        }
    }

    fn resources(&self) -> Result<&GpuResources> {
        self.gpu
            .as_ref()
            .ok_or_else(|| Error::Configuration("composer used before prepare".into()))
    }

    /// Render the fullscreen quad with `pipeline` onto the target, keeping
    /// previously drawn content.
    fn quad_pass(&self, pipeline_is_video: bool) -> Result<()> {
        let res = self.resources()?;
        let pipeline = if pipeline_is_video {
            &res.video_pipeline
        } else {
            &res.overlay_pipeline
        };
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composite Pass"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &res.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &res.bind_group, &[]);
            rpass.set_vertex_buffer(0, res.vertex_buffer.slice(..));
            rpass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn clear_target(&self) -> Result<()> {
        let res = self.resources()?;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Target"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Target"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &res.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Read the composited target back and hand it to the encoder with its
    /// presentation timestamp (the buffer swap).
    fn present(&self, pts_us: i64) -> Result<()> {
        let res = self.resources()?;
        let frame = res
            .target
            .read_back(&self.ctx.device, &self.ctx.queue, &res.staging)?;
        self.surface.submit(frame, pts_us)
    }
}

impl Composer for GpuComposer {
    fn prepare(&mut self) -> Result<()> {
        let device = &self.ctx.device;

        // Pipeline setup is one-time and deterministic given the shader
        // source, so any validation failure aborts the run.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shaders"),
            source: wgpu::ShaderSource::Wgsl(shader_source(&self.profile).into()),
        });

        let video_tex =
            GpuTexture::for_video_frames(device, self.width, self.height, self.video_format);
        let overlay_tex = GpuTexture::for_overlay(device, self.width, self.height);
        let target = GpuTexture::render_target(device, self.width, self.height, self.target_format);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Composite Uniforms"),
            contents: bytemuck::bytes_of(&Uniforms::video()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bindings"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bindings"),
            layout: &bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&video_tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&overlay_tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |entry_point: &str, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format(self.target_format),
                        // Straight alpha so transparent overlay regions do
                        // not occlude the video underneath.
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let video_pipeline = make_pipeline("fs_video", "Video Pipeline");
        let overlay_pipeline = make_pipeline("fs_overlay", "Overlay Pipeline");

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: target.padded_bytes_per_row() as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::ResourceUnavailable(format!(
                "GPU pipeline setup failed: {error}"
            )));
        }

        self.gpu = Some(GpuResources {
            video_pipeline,
            overlay_pipeline,
            bind_group,
            vertex_buffer,
            uniform_buffer,
            video_tex,
            overlay_tex,
            target,
            staging,
        });
        info!(
            hdr = self.profile.is_hdr(),
            width = self.width,
            height = self.height,
            "GPU composer prepared"
        );
        Ok(())
    }

    fn draw_loop(
        &mut self,
        cancel: &CancelHandle,
        per_frame: &mut dyn FnMut(&mut dyn FramePainter) -> Result<DrawStatus>,
    ) -> Result<()> {
        self.resources()?;
        loop {
            cancel.checkpoint()?;
            self.clear_target()?;
            let status = per_frame(self)?;
            self.present(status.pts_us)?;
            if !status.has_next {
                return Ok(());
            }
        }
    }

    fn destroy(&mut self) {
        if self.gpu.take().is_some() {
            self.source.detach();
            debug!("GPU composer destroyed");
        }
    }
}

impl FramePainter for GpuComposer {
    fn draw_video(&mut self) -> Result<()> {
        // Detach/re-attach before sampling so the import always binds the
        // image source exclusively to this context, then pick up the newest
        // frame if one arrived.
        self.source.detach();
        self.source.attach();
        if let Some(frame) = self.source.update_if_fresh() {
            self.resources()?
                .video_tex
                .upload(&self.ctx.queue, &frame.buffer)?;
        }
        let res = self.resources()?;
        self.ctx.queue.write_buffer(
            &res.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms::video()),
        );
        self.quad_pass(true)
    }

    fn draw_overlay(&mut self, draw: &mut dyn FnMut(&mut OverlayCanvas)) -> Result<()> {
        self.canvas.clear();
        draw(&mut self.canvas);
        let res = self.resources()?;
        res.overlay_tex
            .upload_bytes(&self.ctx.queue, self.canvas.data())?;
        self.ctx.queue.write_buffer(
            &res.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms::overlay()),
        );
        self.quad_pass(false)
    }
}

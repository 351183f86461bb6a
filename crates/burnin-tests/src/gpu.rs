//! GPU composer smoke test.
//!
//! Skips when the machine has no usable adapter, so CI without a GPU still
//! passes; everywhere else it pushes one real frame through the wgpu path.

use burnin_color::{resolve, ColorStandard, ColorTransfer, ProbedSource};
use burnin_core::{CancelHandle, FrameBuffer, PixelFormat};
use burnin_gpu::{Composer, DrawStatus, GpuComposer, GpuContext};
use burnin_media::{encoder_surface, FrameImageSource, SurfacePoll};

#[test]
fn renders_one_composited_frame_when_an_adapter_exists() {
    let Ok(ctx) = GpuContext::new_blocking(false) else {
        eprintln!("skipping: no GPU adapter available");
        return;
    };

    let probed = ProbedSource {
        width: 64,
        height: 64,
        standard: ColorStandard::Bt709,
        transfer: ColorTransfer::Sdr,
        ..Default::default()
    };
    let profile = resolve(&probed, false).unwrap().color;

    let (surface, consumer) = encoder_surface(2);
    let image_source = FrameImageSource::new();
    image_source
        .publisher()
        .publish(FrameBuffer::solid(64, 64, [0, 0, 255, 255]), 0);

    let mut composer = GpuComposer::new(ctx, surface, image_source.consumer(), 64, 64, profile);
    composer.prepare().expect("pipeline setup");

    composer
        .draw_loop(&CancelHandle::new(), &mut |painter| {
            painter.draw_video()?;
            painter.draw_overlay(&mut |canvas| {
                canvas.fill_rect(0, 0, 8, 8, [255, 0, 0, 255]);
            })?;
            Ok(DrawStatus {
                has_next: false,
                pts_us: 33_000,
            })
        })
        .expect("draw loop");
    composer.destroy();

    let SurfacePoll::Frame(frame) = consumer.poll() else {
        panic!("no frame reached the encoder surface");
    };
    assert_eq!(frame.pts_us, 33_000);
    assert_eq!(frame.buffer.format, PixelFormat::Rgba8);
    assert_eq!(frame.buffer.width, 64);

    // Top-left corner carries the opaque red overlay.
    assert_eq!(&frame.buffer.data[0..3], &[255, 0, 0]);
    // Outside the overlay the blue video shows through.
    let px = &frame.buffer.data[(32 * 64 + 32) * 4..(32 * 64 + 32) * 4 + 3];
    assert_eq!(px, &[0, 0, 255]);
}

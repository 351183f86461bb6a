//! Cross-component surfaces.
//!
//! Two single-writer handoffs connect the pipeline stages: the decoder
//! publishes its latest image into a [`FrameImageSource`] the compositor
//! samples from, and the compositor submits composited frames into an
//! [`EncoderSurface`] the encoder consumes. Neither side ever shares a
//! buffer with the other after handoff.

use burnin_core::FrameBuffer;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burnin_core::{Error, Result};

/// A decoded image together with its presentation timestamp.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub buffer: FrameBuffer,
    pub pts_us: i64,
}

#[derive(Debug, Default)]
struct SourceInner {
    slot: Mutex<Option<SourceFrame>>,
    fresh: AtomicBool,
    attached: AtomicBool,
}

/// Latest-frame slot between the decoder and the compositor.
///
/// The decoder overwrites the slot with each rendered frame; the compositor
/// imports the newest one when it samples. Only freshness is tracked, so a
/// slow consumer sees the latest frame rather than a backlog.
#[derive(Debug)]
pub struct FrameImageSource {
    inner: Arc<SourceInner>,
}

impl Default for FrameImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameImageSource {
    pub fn new() -> Self {
        let source = Self {
            inner: Arc::new(SourceInner::default()),
        };
        source.inner.attached.store(true, Ordering::Release);
        source
    }

    /// The write side handed to the decoder backend.
    pub fn publisher(&self) -> FramePublisher {
        FramePublisher {
            inner: self.inner.clone(),
        }
    }

    /// The read side handed to the compositor.
    pub fn consumer(&self) -> FrameConsumer {
        FrameConsumer {
            inner: self.inner.clone(),
        }
    }

    /// Drop the held image. Idempotent.
    pub fn destroy(&self) {
        *self.inner.slot.lock() = None;
        self.inner.fresh.store(false, Ordering::Release);
    }
}

/// Write side of a [`FrameImageSource`].
#[derive(Debug, Clone)]
pub struct FramePublisher {
    inner: Arc<SourceInner>,
}

impl FramePublisher {
    /// Replace the slot content with a newly decoded frame.
    pub fn publish(&self, buffer: FrameBuffer, pts_us: i64) {
        *self.inner.slot.lock() = Some(SourceFrame { buffer, pts_us });
        self.inner.fresh.store(true, Ordering::Release);
    }
}

/// Read side of a [`FrameImageSource`].
#[derive(Debug)]
pub struct FrameConsumer {
    inner: Arc<SourceInner>,
}

impl FrameConsumer {
    /// Release the binding to the sampling context.
    pub fn detach(&self) {
        self.inner.attached.store(false, Ordering::Release);
    }

    /// Re-establish the binding to the sampling context.
    pub fn attach(&self) {
        self.inner.attached.store(true, Ordering::Release);
    }

    /// Take the newest frame if one arrived since the last call.
    ///
    /// Returns `None` when nothing fresh is available or while detached, so
    /// the caller keeps sampling its previously imported image.
    pub fn update_if_fresh(&self) -> Option<SourceFrame> {
        if !self.inner.attached.load(Ordering::Acquire) {
            return None;
        }
        if self
            .inner
            .fresh
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.inner.slot.lock().take()
    }
}

// ── Encoder input surface ────────────────────────────────────────

/// A composited frame with the presentation timestamp stamped at swap.
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    pub buffer: FrameBuffer,
    pub pts_us: i64,
}

/// GPU-writable input surface of an encoder.
///
/// Submitting blocks once the device's queue depth is reached, which is the
/// natural backpressure between the draw loop and the encoder.
#[derive(Debug, Clone)]
pub struct EncoderSurface {
    tx: Sender<SurfaceFrame>,
}

impl EncoderSurface {
    /// Hand one composited frame to the encoder.
    pub fn submit(&self, buffer: FrameBuffer, pts_us: i64) -> Result<()> {
        self.tx
            .send(SurfaceFrame { buffer, pts_us })
            .map_err(|_| Error::Codec("encoder input surface is closed".into()))
    }
}

/// Encoder-side consumer of an [`EncoderSurface`].
#[derive(Debug)]
pub struct SurfaceConsumer {
    rx: Receiver<SurfaceFrame>,
}

/// Result of a non-blocking surface poll.
#[derive(Debug)]
pub enum SurfacePoll {
    Frame(SurfaceFrame),
    Empty,
    /// Every producer handle is gone; no more frames can arrive.
    Closed,
}

impl SurfaceConsumer {
    pub fn poll(&self) -> SurfacePoll {
        match self.rx.try_recv() {
            Ok(frame) => SurfacePoll::Frame(frame),
            Err(TryRecvError::Empty) => SurfacePoll::Empty,
            Err(TryRecvError::Disconnected) => SurfacePoll::Closed,
        }
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> SurfacePoll {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => SurfacePoll::Frame(frame),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => SurfacePoll::Empty,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => SurfacePoll::Closed,
        }
    }
}

/// Create an encoder surface with the given queue depth.
pub fn encoder_surface(depth: usize) -> (EncoderSurface, SurfaceConsumer) {
    let (tx, rx) = bounded(depth);
    (EncoderSurface { tx }, SurfaceConsumer { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burnin_core::PixelFormat;

    fn frame() -> FrameBuffer {
        FrameBuffer::new(2, 2, PixelFormat::Rgba8)
    }

    #[test]
    fn consumer_sees_only_the_newest_frame() {
        let source = FrameImageSource::new();
        let publisher = source.publisher();
        let consumer = source.consumer();

        assert!(consumer.update_if_fresh().is_none());

        publisher.publish(frame(), 1_000);
        publisher.publish(frame(), 2_000);

        let got = consumer.update_if_fresh().unwrap();
        assert_eq!(got.pts_us, 2_000);
        // Freshness is consumed.
        assert!(consumer.update_if_fresh().is_none());
    }

    #[test]
    fn detached_consumer_never_updates() {
        let source = FrameImageSource::new();
        source.publisher().publish(frame(), 5);
        let consumer = source.consumer();
        consumer.detach();
        assert!(consumer.update_if_fresh().is_none());
        consumer.attach();
        assert!(consumer.update_if_fresh().is_some());
    }

    #[test]
    fn surface_reports_closed_after_producer_drop() {
        let (surface, consumer) = encoder_surface(2);
        surface.submit(frame(), 33_000).unwrap();
        drop(surface);

        match consumer.poll() {
            SurfacePoll::Frame(f) => assert_eq!(f.pts_us, 33_000),
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(consumer.poll(), SurfacePoll::Closed));
    }

    #[test]
    fn submit_fails_once_consumer_is_gone() {
        let (surface, consumer) = encoder_surface(1);
        drop(consumer);
        assert!(surface.submit(frame(), 0).is_err());
    }
}

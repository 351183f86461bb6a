//! Container collaborator traits and the in-memory reference container.
//!
//! Byte-level container I/O (mp4 parsing, file handling) stays behind these
//! traits: the pipeline only ever needs forward sample reading, track
//! selection by mime prefix, and append-only sample writing. The in-memory
//! implementations back the test suite and the temporary elementary stream.

use burnin_core::{Error, Result, END_OF_TRACK_US};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::sample::{SampleFlags, SampleInfo, TrackDescriptor};

/// Forward-only reader over one selected track.
///
/// The cursor starts at the first sample. Once [`SampleSource::advance`]
/// returns `false` the track is exhausted: `sample_time_us` reports the
/// [`END_OF_TRACK_US`] sentinel and `read_sample` returns `None` from then
/// on. There is no way to seek backward by design.
pub trait SampleSource: Send {
    fn descriptor(&self) -> &TrackDescriptor;

    /// Copy the current sample into `buf` and return its size, or `None`
    /// once the track is exhausted.
    fn read_sample(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>>;

    /// Presentation timestamp of the current sample in microseconds, or
    /// [`END_OF_TRACK_US`] once exhausted.
    fn sample_time_us(&self) -> i64;

    /// Flags of the current sample.
    fn sample_flags(&self) -> SampleFlags;

    /// Move to the next sample. Returns `false` once the track is exhausted.
    fn advance(&mut self) -> bool;
}

/// Demux side of a container collaborator.
pub trait Demuxer: Send {
    /// Return a reader over the first track whose mime type starts with
    /// `mime_prefix`, or `None` if no track matches.
    fn select_track(&mut self, mime_prefix: &str) -> Option<Box<dyn SampleSource>>;
}

/// Mux side of a container collaborator.
///
/// All tracks must be added before [`SampleSink::start`]; samples are only
/// accepted between `start` and [`SampleSink::finish`].
pub trait SampleSink: Send {
    fn add_track(&mut self, descriptor: &TrackDescriptor) -> Result<usize>;
    fn start(&mut self) -> Result<()>;
    fn write_sample(&mut self, track: usize, data: &[u8], info: &SampleInfo) -> Result<()>;
    /// Finalize the container.
    fn finish(&mut self) -> Result<()>;
    /// Abandon the container, deleting any partial artifact.
    fn discard(&mut self);
}

/// Holder of the temporary elementary video stream between the encode and
/// remux stages: written once, read once, then discarded.
pub trait ElementaryStore: Send {
    fn writer(&mut self) -> Result<Box<dyn SampleSink>>;
    fn reader(&mut self) -> Result<Box<dyn SampleSource>>;
    /// Delete the backing artifact. Idempotent.
    fn discard(&mut self);
}

// ── In-memory reference container ────────────────────────────────

#[derive(Debug, Clone)]
struct MemorySample {
    data: Vec<u8>,
    info: SampleInfo,
}

#[derive(Debug)]
struct MemoryTrack {
    descriptor: TrackDescriptor,
    samples: Vec<MemorySample>,
}

#[derive(Debug, Default)]
struct ContainerInner {
    tracks: Vec<MemoryTrack>,
    started: bool,
    finished: bool,
    discarded: bool,
}

/// In-memory container implementing both the demux and mux interfaces.
///
/// Clones share the same storage, so a container written through one handle
/// can be read back through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    inner: Arc<RwLock<ContainerInner>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fully-formed track. Test-data convenience; the mux interface
    /// goes through [`SampleSink`].
    pub fn push_track(
        &self,
        descriptor: TrackDescriptor,
        samples: impl IntoIterator<Item = (Vec<u8>, SampleInfo)>,
    ) {
        let mut inner = self.inner.write();
        inner.tracks.push(MemoryTrack {
            descriptor,
            samples: samples
                .into_iter()
                .map(|(data, info)| MemorySample { data, info })
                .collect(),
        });
    }

    pub fn track_count(&self) -> usize {
        self.inner.read().tracks.len()
    }

    pub fn sample_count(&self, track: usize) -> usize {
        self.inner
            .read()
            .tracks
            .get(track)
            .map_or(0, |t| t.samples.len())
    }

    pub fn is_finished(&self) -> bool {
        self.inner.read().finished
    }

    pub fn is_discarded(&self) -> bool {
        self.inner.read().discarded
    }
}

impl Demuxer for MemoryContainer {
    fn select_track(&mut self, mime_prefix: &str) -> Option<Box<dyn SampleSource>> {
        let inner = self.inner.read();
        let index = inner
            .tracks
            .iter()
            .position(|t| t.descriptor.mime.starts_with(mime_prefix))?;
        let descriptor = inner.tracks[index].descriptor.clone();
        drop(inner);
        Some(Box::new(MemoryTrackReader {
            container: self.inner.clone(),
            track: index,
            cursor: 0,
            descriptor,
        }))
    }
}

impl SampleSink for MemoryContainer {
    fn add_track(&mut self, descriptor: &TrackDescriptor) -> Result<usize> {
        let mut inner = self.inner.write();
        if inner.started {
            return Err(Error::Configuration(
                "tracks must be added before the container is started".into(),
            ));
        }
        inner.tracks.push(MemoryTrack {
            descriptor: descriptor.clone(),
            samples: Vec::new(),
        });
        Ok(inner.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.tracks.is_empty() {
            return Err(Error::Configuration(
                "container started with no tracks".into(),
            ));
        }
        inner.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &SampleInfo) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.started {
            return Err(Error::Configuration(
                "sample written before the container was started".into(),
            ));
        }
        let track = inner
            .tracks
            .get_mut(track)
            .ok_or_else(|| Error::Configuration(format!("unknown track index {track}")))?;
        track.samples.push(MemorySample {
            data: data.to_vec(),
            info: *info,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.write().finished = true;
        Ok(())
    }

    fn discard(&mut self) {
        let mut inner = self.inner.write();
        inner.tracks.clear();
        inner.started = false;
        inner.finished = false;
        inner.discarded = true;
        debug!("memory container discarded");
    }
}

struct MemoryTrackReader {
    container: Arc<RwLock<ContainerInner>>,
    track: usize,
    cursor: usize,
    descriptor: TrackDescriptor,
}

impl SampleSource for MemoryTrackReader {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    fn read_sample(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>> {
        let inner = self.container.read();
        let Some(sample) = inner
            .tracks
            .get(self.track)
            .and_then(|t| t.samples.get(self.cursor))
        else {
            return Ok(None);
        };
        buf.clear();
        buf.extend_from_slice(&sample.data);
        Ok(Some(sample.data.len()))
    }

    fn sample_time_us(&self) -> i64 {
        let inner = self.container.read();
        inner
            .tracks
            .get(self.track)
            .and_then(|t| t.samples.get(self.cursor))
            .map_or(END_OF_TRACK_US, |s| s.info.pts_us)
    }

    fn sample_flags(&self) -> SampleFlags {
        let inner = self.container.read();
        inner
            .tracks
            .get(self.track)
            .and_then(|t| t.samples.get(self.cursor))
            .map_or(SampleFlags::NONE, |s| s.info.flags)
    }

    fn advance(&mut self) -> bool {
        let inner = self.container.read();
        let len = inner.tracks.get(self.track).map_or(0, |t| t.samples.len());
        drop(inner);
        if self.cursor + 1 < len {
            self.cursor += 1;
            true
        } else {
            self.cursor = len;
            false
        }
    }
}

/// [`ElementaryStore`] over a [`MemoryContainer`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    container: MemoryContainer,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self) -> &MemoryContainer {
        &self.container
    }
}

impl ElementaryStore for MemoryStore {
    fn writer(&mut self) -> Result<Box<dyn SampleSink>> {
        Ok(Box::new(self.container.clone()))
    }

    fn reader(&mut self) -> Result<Box<dyn SampleSource>> {
        let mut container = self.container.clone();
        container
            .select_track(crate::sample::MIME_VIDEO_PREFIX)
            .ok_or_else(|| {
                Error::Configuration("temporary stream holds no video track".into())
            })
    }

    fn discard(&mut self) {
        SampleSink::discard(&mut self.container);
    }
}

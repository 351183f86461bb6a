//! Burnin Media - container and codec orchestration
//!
//! This crate holds:
//! - The sample/track data model shared with container collaborators
//! - Demux/mux collaborator traits and an in-memory reference container
//! - The poll-based codec backend protocol
//! - The frame decoder ("decode up to timestamp T")
//! - The frame encoder (surface-driven input, async drain)
//! - The cross-component surfaces (decoded-image source, encoder input)
//! - The track remuxer
//! - Source probing and ffmpeg-backed production backends

pub mod codec;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod ffmpeg;
pub mod probe;
pub mod remux;
pub mod sample;
pub mod surface;
pub mod testing;

pub use codec::{
    CodecPoll, DecodedFrame, DecoderBackend, DecoderRegistry, EncodedSample, EncoderBackend,
    EncoderConfig, HdrEncodingParams, InputSlot,
};
pub use container::{
    Demuxer, ElementaryStore, MemoryContainer, MemoryStore, SampleSink, SampleSource,
};
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use ffmpeg::{FfmpegDecoders, FfmpegEncoderBackend};
pub use probe::probe_source;
pub use remux::{mix_av_tracks, RemuxStats};
pub use sample::{SampleFlags, SampleInfo, TrackColor, TrackDescriptor};
pub use surface::{
    encoder_surface, EncoderSurface, FrameConsumer, FrameImageSource, FramePublisher, SourceFrame,
    SurfaceConsumer, SurfaceFrame, SurfacePoll,
};

//! Encoder-tool integration: per-part sinks, concatenation, probing.

/// Concat descriptor and final-merge invocation.
pub mod concat;
/// Per-part ffmpeg subprocess sink.
pub mod ffmpeg;
/// ffprobe wrapper for output verification.
pub mod probe;
/// Sink trait, factory seam and the in-memory test sink.
pub mod sink;

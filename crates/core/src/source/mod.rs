//! Frame source abstraction
//!
//! A `FrameSource` produces a rate-paced sequence of JPEG frames from a
//! video file, a live network stream, or a single still image. A source
//! is single-use: restart means constructing a new instance.

mod ffmpeg;
mod image;
mod synthetic;

pub use ffmpeg::FfmpegSource;
pub use image::StillImageSource;
pub use synthetic::SyntheticSource;

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::Frame;

/// How a source paces and buffers frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Finite file: every paced frame is delivered, the decoder is
    /// backpressured by the consumer
    File,

    /// Live stream: only the most recently captured frame is kept, stale
    /// frames are discarded while the consumer is busy
    Live,
}

/// Produces a bounded (file/image) or unbounded-until-cancelled (live)
/// sequence of frames
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame; `None` means the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Filename or URL this source reads from
    fn descriptor(&self) -> &str;

    /// Release the underlying decoder/handles
    ///
    /// Must be called before the owning job transitions to a terminal
    /// state; it is idempotent.
    async fn close(&mut self);
}

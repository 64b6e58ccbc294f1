//! Single still image source

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::frame::Frame;

use super::FrameSource;

/// Source yielding exactly one frame from already-encoded image bytes
pub struct StillImageSource {
    descriptor: String,
    image: Option<Bytes>,
}

impl StillImageSource {
    pub fn new(descriptor: &str, image: impl Into<Bytes>) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            image: Some(image.into()),
        }
    }
}

#[async_trait]
impl FrameSource for StillImageSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.image.take().map(Frame::new))
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    async fn close(&mut self) {
        self.image = None;
    }
}

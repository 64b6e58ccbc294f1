//! Synthetic frame source for tests and demos
//!
//! Generates minimal JPEG-framed payloads without touching a decoder, so
//! job behavior can be exercised hermetically.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::frame::Frame;

use super::FrameSource;

/// Source producing a fixed number of generated frames
pub struct SyntheticSource {
    descriptor: String,
    total: u64,
    produced: u64,
    interval: Option<Duration>,
    fail_at: Option<u64>,
}

impl SyntheticSource {
    /// Produce `total` frames as fast as the consumer pulls them
    pub fn new(descriptor: &str, total: u64) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            total,
            produced: 0,
            interval: None,
            fail_at: None,
        }
    }

    /// Sleep between frames, emulating a paced live source
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Return a read error instead of the frame with the given 0-based index
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// A syntactically valid single-frame JPEG payload carrying `seq`
    fn payload(seq: u64) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(&seq.to_be_bytes());
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.produced >= self.total {
            return Ok(None);
        }
        if self.fail_at == Some(self.produced) {
            return Err(Error::SourceRead("synthetic read failure".to_string()));
        }
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }

        let frame = Frame::new(Self::payload(self.produced));
        self.produced += 1;
        Ok(Some(frame))
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    async fn close(&mut self) {
        self.produced = self.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_produces_exact_count() {
        let mut source = SyntheticSource::new("synthetic", 3);
        let mut frames = 0;
        while let Some(frame) = source.next_frame().await.unwrap() {
            assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
            frames += 1;
        }
        assert_eq!(frames, 3);
    }

    #[tokio::test]
    async fn test_failing_at() {
        let mut source = SyntheticSource::new("synthetic", 5).failing_at(2);
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(matches!(
            source.next_frame().await,
            Err(Error::SourceRead(_))
        ));
    }

    #[tokio::test]
    async fn test_close_exhausts() {
        let mut source = SyntheticSource::new("synthetic", 5);
        source.close().await;
        assert!(source.next_frame().await.unwrap().is_none());
    }
}

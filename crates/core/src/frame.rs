//! Frame and detection data types
//!
//! Every source emits JPEG-encoded frames; the detector consumes and
//! returns JPEG. Keeping encoded bytes end to end means the engine never
//! touches pixel formats.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded-and-reencoded frame from a source
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG-encoded image bytes
    pub jpeg: Bytes,

    /// When the frame was captured (read off the decoder)
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(jpeg: impl Into<Bytes>) -> Self {
        Self {
            jpeg: jpeg.into(),
            captured_at: Utc::now(),
        }
    }
}

/// An axis-aligned detection box in pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,

    /// Detector confidence for this box
    pub conf: f32,
}

/// Result of running the detection primitive over one frame
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Number of people found in the frame
    pub count: u32,

    /// Per-person boxes, when the detector reports them
    pub boxes: Vec<BoundingBox>,

    /// Annotated JPEG with boxes burned in, when the detector produces one
    pub annotated_jpeg: Option<Bytes>,
}

impl Detection {
    /// A detection with a bare count and no annotation
    pub fn with_count(count: u32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }
}

//! Core abstractions for the headcount occupancy counting service
//!
//! This crate is transport-agnostic: it defines the data types flowing
//! through a counting job (JPEG frames, detections), the seam to the
//! external detection primitive, and the frame source abstraction over
//! files, live streams and still images. Job orchestration lives in
//! `headcount-job-runner`; the HTTP surface in `headcount-server`.

pub mod detector;
pub mod error;
pub mod frame;
pub mod probe;
pub mod source;

// Re-export main types
pub use detector::{Detection, Detector, HttpDetector, StaticDetector};
pub use error::{Error, Result};
pub use frame::{BoundingBox, Frame};
pub use source::{FfmpegSource, FrameSource, SourceMode, StillImageSource, SyntheticSource};

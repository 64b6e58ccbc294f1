//! Detection primitive seam
//!
//! The counting model itself is an external collaborator: given a JPEG
//! frame it returns an occupancy count, optionally with boxes and an
//! annotated frame. The engine only sees this trait.

mod fake;
mod http;

pub use fake::StaticDetector;
pub use http::HttpDetector;

use async_trait::async_trait;

use crate::error::Result;
pub use crate::frame::Detection;

/// External capability mapping a frame to an occupancy count
///
/// Implementations must be safe to share across job loops; a single
/// instance is typically wrapped in an `Arc` and handed to every job.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Run detection over one JPEG frame
    ///
    /// `conf` is the confidence threshold in `[0, 1]`. Errors are
    /// unrecoverable from the caller's perspective and terminate the job.
    async fn detect(&self, jpeg: &[u8], conf: f32) -> Result<Detection>;
}

//! Scripted detector for tests and detector-less demos

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::frame::Detection;

use super::Detector;

/// Detector that replays a fixed script of counts
///
/// Each call yields the next count in the script; once exhausted it
/// repeats the last entry. `fail_after` makes the Nth call (0-based)
/// return a `Detection` error, for exercising failure paths.
pub struct StaticDetector {
    counts: Vec<u32>,
    calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl StaticDetector {
    /// Always report the same count
    pub fn constant(count: u32) -> Self {
        Self::scripted(vec![count])
    }

    /// Replay the given counts in order, repeating the last one
    pub fn scripted(counts: Vec<u32>) -> Self {
        assert!(!counts.is_empty(), "script must contain at least one count");
        Self {
            counts,
            calls: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    /// Fail on the call with the given 0-based index
    pub fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Number of detect calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Detector for StaticDetector {
    async fn detect(&self, _jpeg: &[u8], _conf: f32) -> Result<Detection> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(fail_at) = self.fail_after {
            if call >= fail_at {
                return Err(Error::Detection("scripted failure".to_string()));
            }
        }

        let count = *self
            .counts
            .get(call)
            .unwrap_or_else(|| self.counts.last().expect("script is non-empty"));

        Ok(Detection::with_count(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_constant_detector() {
        let d = StaticDetector::constant(4);
        for _ in 0..3 {
            let det = d.detect(&[], 0.25).await.unwrap();
            assert_eq!(det.count, 4);
        }
        assert_eq!(d.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_detector_repeats_last() {
        let d = StaticDetector::scripted(vec![1, 2, 3]);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(d.detect(&[], 0.25).await.unwrap().count);
        }
        assert_eq!(seen, vec![1, 2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_failing_detector() {
        let d = StaticDetector::constant(1).failing_after(2);
        assert!(d.detect(&[], 0.25).await.is_ok());
        assert!(d.detect(&[], 0.25).await.is_ok());
        let err = d.detect(&[], 0.25).await.unwrap_err();
        assert!(matches!(err, Error::Detection(_)));
    }
}

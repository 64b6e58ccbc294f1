//! HTTP detector client
//!
//! Talks to an external inference service over HTTP. The service takes a
//! raw JPEG body and returns `{count, boxes, image_b64}`.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::frame::{BoundingBox, Detection};

use super::Detector;

/// Default per-frame inference timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire response of the inference service
#[derive(Debug, Deserialize)]
struct DetectResponse {
    count: u32,

    #[serde(default)]
    boxes: Vec<BoundingBox>,

    /// Base64 JPEG with boxes drawn in, if the service annotates
    #[serde(default)]
    image_b64: Option<String>,
}

/// Detector backed by an external HTTP inference service
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDetector {
    /// Create a client for the service at `base_url` (e.g. `http://detector:9090`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Detection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
        })
    }

    /// Override the per-frame timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Detection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, jpeg: &[u8], conf: f32) -> Result<Detection> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("conf", conf)])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg.to_vec())
            .send()
            .await
            .map_err(|e| Error::Detection(format!("inference request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Detection(format!(
                "inference service returned {}",
                response.status()
            )));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| Error::Detection(format!("invalid inference response: {}", e)))?;

        let annotated_jpeg = match body.image_b64 {
            Some(b64) if !b64.is_empty() => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .map_err(|e| Error::Detection(format!("invalid annotated frame: {}", e)))?
                    .into(),
            ),
            _ => None,
        };

        Ok(Detection {
            count: body.count,
            boxes: body.boxes,
            annotated_jpeg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        let d = HttpDetector::new("http://localhost:9090/").unwrap();
        assert_eq!(d.endpoint, "http://localhost:9090/detect");

        let d = HttpDetector::new("http://localhost:9090").unwrap();
        assert_eq!(d.endpoint, "http://localhost:9090/detect");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"count": 2, "boxes": [{"x1": 0.0, "y1": 0.0, "x2": 10.0, "y2": 10.0, "conf": 0.8}]}"#;
        let parsed: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.count, 2);
        assert_eq!(parsed.boxes.len(), 1);
        assert!(parsed.image_b64.is_none());
    }
}

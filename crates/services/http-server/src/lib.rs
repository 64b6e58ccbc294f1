//! HTTP/WS surface of the headcount service
//!
//! Thin transport glue over `headcount-job-runner`: request intake for
//! images, uploaded videos and live streams, per-job WebSocket event
//! streams, MJPEG preview streams, and history/metrics endpoints.

pub mod api;
pub mod config;
pub mod upload;

pub use api::AppState;
pub use config::Config;

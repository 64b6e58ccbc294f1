//! ffmpeg-backed frame source
//!
//! Spawns an `ffmpeg` child decoding the input to an MJPEG pipe at the
//! target frame rate, and splits the pipe into individual JPEG frames.
//! File mode backpressures the decoder through a small bounded channel so
//! every paced frame is delivered; live mode keeps a single latest-frame
//! slot so a slow consumer only ever sees the most recent capture.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::frame::Frame;

use super::{FrameSource, SourceMode};

/// How long to wait for the decoder to produce its first frame
const OPEN_TIMEOUT: Duration = Duration::from_secs(15);

/// File-mode channel depth; the decoder pipe stalls once it is full
const FILE_CHANNEL_DEPTH: usize = 4;

/// Hand-off from the reader task to the consumer
enum FrameRx {
    Sequential(mpsc::Receiver<Frame>),
    Latest(watch::Receiver<Option<Frame>>),
}

enum FrameTx {
    Sequential(mpsc::Sender<Frame>),
    Latest(watch::Sender<Option<Frame>>),
}

/// Frame source decoding through an ffmpeg child process
pub struct FfmpegSource {
    descriptor: String,
    child: Option<Child>,
    rx: FrameRx,

    /// First frame, held back from the open handshake
    pending: Option<Frame>,
}

impl FfmpegSource {
    /// Open a video file, delivering every frame paced to `fps`
    pub async fn open_file(path: &str, fps: f32) -> Result<Self> {
        Self::open(path, SourceMode::File, fps, OPEN_TIMEOUT).await
    }

    /// Open a live stream URL, keeping only the latest frame
    pub async fn open_stream(url: &str, fps: f32) -> Result<Self> {
        Self::open(url, SourceMode::Live, fps, OPEN_TIMEOUT).await
    }

    /// Open with an explicit first-frame timeout
    pub async fn open(
        descriptor: &str,
        mode: SourceMode,
        fps: f32,
        open_timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        if mode == SourceMode::Live {
            if descriptor.starts_with("rtsp://") {
                cmd.arg("-rtsp_transport").arg("tcp");
            }
            cmd.arg("-fflags").arg("nobuffer").arg("-flags").arg("low_delay");
        }

        cmd.arg("-i")
            .arg(descriptor)
            .arg("-an")
            .arg("-vf")
            .arg(format!("fps={}", fps))
            .arg("-f")
            .arg("image2pipe")
            .arg("-c:v")
            .arg("mjpeg")
            .arg("-q:v")
            .arg("4")
            .arg("-");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::SourceOpen {
            source_desc: descriptor.to_string(),
            reason: format!("failed to spawn ffmpeg: {}", e),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::SourceOpen {
            source_desc: descriptor.to_string(),
            reason: "failed to capture decoder stdout".to_string(),
        })?;

        // Drain stderr in the background, remembering the last line for
        // open-failure diagnostics.
        let last_stderr = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let last_stderr = last_stderr.clone();
            let desc = descriptor.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(source = %desc, "ffmpeg: {}", line);
                    *last_stderr.lock().expect("stderr mutex poisoned") = line;
                }
            });
        }

        let (tx, mut rx) = match mode {
            SourceMode::File => {
                let (tx, rx) = mpsc::channel(FILE_CHANNEL_DEPTH);
                (FrameTx::Sequential(tx), FrameRx::Sequential(rx))
            }
            SourceMode::Live => {
                let (tx, rx) = watch::channel(None);
                (FrameTx::Latest(tx), FrameRx::Latest(rx))
            }
        };

        tokio::spawn(read_frames(stdout, tx));

        // First-frame handshake: an unreachable stream or unreadable file
        // must fail here, before a job loop ever runs.
        let first = tokio::time::timeout(open_timeout, recv_frame(&mut rx)).await;
        let pending = match first {
            Ok(Some(frame)) => Some(frame),
            Ok(None) | Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let reason = {
                    let line = last_stderr.lock().expect("stderr mutex poisoned");
                    if line.is_empty() {
                        "decoder produced no frames".to_string()
                    } else {
                        line.clone()
                    }
                };
                return Err(Error::SourceOpen {
                    source_desc: descriptor.to_string(),
                    reason,
                });
            }
        };

        Ok(Self {
            descriptor: descriptor.to_string(),
            child: Some(child),
            rx,
            pending,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        Ok(recv_frame(&mut self.rx).await)
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Receive the next frame, `None` on decoder EOF
async fn recv_frame(rx: &mut FrameRx) -> Option<Frame> {
    match rx {
        FrameRx::Sequential(rx) => rx.recv().await,
        FrameRx::Latest(rx) => loop {
            // A closed sender means the decoder reached EOF or died.
            rx.changed().await.ok()?;
            if let Some(frame) = rx.borrow_and_update().clone() {
                return Some(frame);
            }
        },
    }
}

/// Read the MJPEG pipe and dispatch complete JPEG frames
async fn read_frames(stdout: tokio::process::ChildStdout, tx: FrameTx) {
    let mut stdout = stdout;
    let mut buf: Vec<u8> = Vec::with_capacity(256 * 1024);
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("decoder pipe read failed: {}", e);
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some(jpeg) = take_next_jpeg(&mut buf) {
            let frame = Frame::new(jpeg);
            match &tx {
                FrameTx::Sequential(tx) => {
                    // Blocks when the consumer is behind; the pipe (and the
                    // decoder) stall with us. Send fails once the source is
                    // dropped.
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                FrameTx::Latest(tx) => {
                    tx.send_replace(Some(frame));
                    if tx.is_closed() {
                        return;
                    }
                }
            }
        }
    }
}

/// Extract the next complete JPEG (SOI..EOI) from `buf`, draining it
fn take_next_jpeg(buf: &mut Vec<u8>) -> Option<Bytes> {
    let soi = find_marker(buf, 0xD8, 0)?;
    let eoi = find_marker(buf, 0xD9, soi + 2)?;

    let frame = Bytes::copy_from_slice(&buf[soi..eoi + 2]);
    buf.drain(..eoi + 2);
    Some(frame)
}

/// Find a `0xFF <code>` marker at or after `from`
fn find_marker(buf: &[u8], code: u8, from: usize) -> Option<usize> {
    if buf.len() < 2 {
        return None;
    }
    (from..buf.len() - 1).find(|&i| buf[i] == 0xFF && buf[i + 1] == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(payload);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn test_take_next_jpeg_single() {
        let mut buf = fake_jpeg(b"abc");
        let frame = take_next_jpeg(&mut buf).unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame[frame.len() - 2..], &[0xFF, 0xD9]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_next_jpeg_incomplete() {
        let mut buf = vec![0xFF, 0xD8, 0x01, 0x02];
        assert!(take_next_jpeg(&mut buf).is_none());
        // Nothing consumed while the frame is incomplete
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_take_next_jpeg_concatenated() {
        let mut buf = fake_jpeg(b"one");
        buf.extend_from_slice(&fake_jpeg(b"two"));

        let first = take_next_jpeg(&mut buf).unwrap();
        assert_eq!(&first[2..5], b"one");
        let second = take_next_jpeg(&mut buf).unwrap();
        assert_eq!(&second[2..5], b"two");
        assert!(take_next_jpeg(&mut buf).is_none());
    }

    #[test]
    fn test_take_next_jpeg_skips_leading_garbage() {
        let mut buf = vec![0x00, 0x11, 0x22];
        buf.extend_from_slice(&fake_jpeg(b"x"));
        let frame = take_next_jpeg(&mut buf).unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_open_failure_on_missing_file() {
        // A nonexistent input must surface as SourceOpen, not a hang.
        let result = FfmpegSource::open(
            "/nonexistent/headcount-test.mp4",
            SourceMode::File,
            5.0,
            Duration::from_secs(5),
        )
        .await;

        match result {
            Err(Error::SourceOpen { source_desc, .. }) => {
                assert!(source_desc.contains("headcount-test"));
            }
            Err(other) => panic!("expected SourceOpen, got {:?}", other),
            Ok(_) => panic!("expected open to fail"),
        }
    }
}

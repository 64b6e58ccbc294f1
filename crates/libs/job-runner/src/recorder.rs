//! Annotated output recording
//!
//! Pipes annotated JPEG frames into an ffmpeg child encoding an MP4, so a
//! finished upload job can offer its processed video for download.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// Muxes annotated frames into an MP4 file
pub struct OutputRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
}

impl OutputRecorder {
    /// Start an encoder writing to `path` at the given frame rate
    pub async fn create(path: &Path, fps: f32) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("image2pipe")
            .arg("-framerate")
            .arg(format!("{}", fps))
            .arg("-c:v")
            .arg("mjpeg")
            .arg("-i")
            .arg("-")
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-movflags")
            .arg("+faststart")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            path: path.to_path_buf(),
        })
    }

    /// Append one JPEG frame
    ///
    /// An error means the encoder died; the caller should stop recording
    /// but keep the job running.
    pub async fn write_frame(&mut self, jpeg: &[u8]) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(jpeg).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder stdin closed",
            )),
        }
    }

    /// Close the pipe, wait for the encoder and return the output path on
    /// success
    pub async fn finish(mut self) -> Option<PathBuf> {
        // Dropping stdin signals EOF so the encoder can finalize the file.
        drop(self.stdin.take());

        match self.child.wait().await {
            Ok(status) if status.success() => Some(self.path),
            Ok(status) => {
                tracing::warn!(path = %self.path.display(), "Output encoder exited with {}", status);
                None
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Output encoder wait failed: {}", e);
                None
            }
        }
    }

    /// Abort recording, discarding the partial file
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

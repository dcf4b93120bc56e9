use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::frame::FrameRGB;

/// Options for [`FfmpegSink`] output.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FfmpegSinkOpts {
    /// Output media file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// x264 preset.
    pub preset: String,
    /// Audio bitrate passed to `-b:a`.
    pub audio_bitrate: String,
    /// Output audio channel count.
    pub audio_channels: u16,
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            out_path: PathBuf::from("output.mp4"),
            overwrite: true,
            preset: "slow".to_string(),
            audio_bitrate: "320k".to_string(),
            audio_channels: 2,
        }
    }
}

impl FfmpegSinkOpts {
    /// Create options for writing to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            ..Self::default()
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw `rgb24` frames to its stdin.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    next_idx: usize,
}

impl FfmpegSink {
    /// Create a new sink that streams into `ffmpeg`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            next_idx: 0,
        }
    }

    /// Close stdin, wait for exit and collect stderr.
    fn finalize(&mut self) -> RenderResult<(ExitStatus, Vec<u8>)> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| RenderError::encoder("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .map_err(|e| RenderError::encoder(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RenderError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| RenderError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        self.cfg = None;
        Ok((status, stderr_bytes))
    }

    /// A write to stdin failed: reap the process and report why it went away.
    fn encoder_died(&mut self, write_err: std::io::Error) -> RenderError {
        match self.finalize() {
            Ok((status, stderr_bytes)) if !status.success() => exit_error(status, &stderr_bytes),
            Ok(_) => RenderError::encoder(format!(
                "failed to write frame {} to ffmpeg stdin: {write_err}",
                self.next_idx
            )),
            Err(e) => e,
        }
    }
}

/// Error for a non-zero `ffmpeg` exit, carrying what it printed.
fn exit_error(status: ExitStatus, stderr: &[u8]) -> RenderError {
    let stderr = String::from_utf8_lossy(stderr);
    RenderError::encoder(format!(
        "ffmpeg exited with status {status}: {}",
        stderr.trim()
    ))
}

/// Build the full `ffmpeg` argument list for `cfg`.
pub fn ffmpeg_args(opts: &FfmpegSinkOpts, cfg: &SinkConfig) -> Vec<OsString> {
    let fps = cfg.fps.to_string();
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

    push(&["-hide_banner", "-loglevel", "warning"]);
    push(&[if opts.overwrite { "-y" } else { "-n" }]);

    // Input 0: raw rgb24 frames on stdin.
    push(&[
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-framerate",
        &fps,
        "-s",
        cfg.size.as_str(),
        "-i",
        "pipe:0",
    ]);

    // Input 1: the audio file, trimmed to the rendered window.
    if let Some(audio) = cfg.audio.as_ref() {
        push(&[
            "-ss",
            &audio.offset.to_string(),
            "-to",
            &audio.end().to_string(),
            "-guess_layout_max",
            "0",
            "-i",
        ]);
        args.push(audio.path.clone().into_os_string());
    }

    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));
    push(&[
        "-r",
        &fps,
        "-c:v",
        "libx264",
        "-preset",
        &opts.preset,
        "-pix_fmt",
        "yuv420p",
    ]);
    if cfg.audio.is_some() {
        push(&[
            "-c:a",
            "aac",
            "-b:a",
            &opts.audio_bitrate,
            "-ac",
            &opts.audio_channels.to_string(),
            "-shortest",
        ]);
    } else {
        push(&["-an"]);
    }
    args.push(opts.out_path.clone().into_os_string());
    args
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> RenderResult<()> {
        if !cfg.fps.is_finite() || cfg.fps <= 0.0 {
            return Err(RenderError::validation("fps must be finite and > 0"));
        }
        if cfg.frame_count == 0 {
            return Err(RenderError::validation("ffmpeg sink needs at least one frame"));
        }
        if let Some(audio) = cfg.audio.as_ref() {
            if !audio.path.exists() {
                return Err(RenderError::validation(format!(
                    "audio file '{}' does not exist",
                    audio.path.display()
                )));
            }
            if audio.duration <= 0.0 || audio.offset < 0.0 {
                return Err(RenderError::validation(
                    "audio trim window must have offset >= 0 and duration > 0",
                ));
            }
        }
        if self.child.is_some() {
            return Err(RenderError::encoder("ffmpeg sink already started"));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(RenderError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(RenderError::encoder(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(ffmpeg_args(&self.opts, &cfg));

        let mut child = cmd.spawn().map_err(|e| {
            RenderError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::encoder("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::encoder("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::info!(
            out = %self.opts.out_path.display(),
            size = %cfg.size,
            fps = cfg.fps,
            audio = cfg.audio.is_some(),
            "started ffmpeg"
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.next_idx = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: usize, frame: &FrameRGB) -> RenderResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| RenderError::encoder("ffmpeg sink not started"))?;
        if idx != self.next_idx {
            return Err(RenderError::encoder(format!(
                "ffmpeg sink received frame {idx}, expected {}",
                self.next_idx
            )));
        }

        let (width, height) = cfg.size.dimensions();
        if frame.width != width || frame.height != height {
            return Err(RenderError::config_mismatch(format!(
                "frame size mismatch: got {}x{}, expected {width}x{height}",
                frame.width, frame.height
            )));
        }
        if frame.data.len() != cfg.size.frame_bytes() {
            return Err(RenderError::validation(
                "frame.data size mismatch with width*height*3",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::encoder("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        if let Err(e) = stdin.write_all(&frame.data) {
            return Err(self.encoder_died(e));
        }
        self.next_idx += 1;
        Ok(())
    }

    fn end(&mut self) -> RenderResult<()> {
        let (status, stderr_bytes) = self.finalize()?;
        if !status.success() {
            return Err(exit_error(status, &stderr_bytes));
        }
        tracing::info!(out = %self.opts.out_path.display(), frames = self.next_idx, "ffmpeg finished");
        Ok(())
    }

    fn abort(&mut self) {
        if self.child.is_none() {
            return;
        }
        match self.finalize() {
            Ok((status, _)) => tracing::warn!(
                out = %self.opts.out_path.display(),
                frames = self.next_idx,
                %status,
                "render aborted; closed partial output"
            ),
            Err(e) => tracing::warn!(error = %e, "render aborted; ffmpeg did not shut down cleanly"),
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Never leave an encoder running behind an abandoned sink.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;

//! `video-screenshot`: extract a single frame from a video as a JPEG.
//!
//! ```toml
//! [variants.poster]
//! screenshot = { percentage = 10, timeout_seconds = 30 }
//! ```
//!
//! Frame extraction shells out to `ffmpeg` (and `ffprobe` when the position
//! is a percentage of the duration). Both binaries are looked up on `PATH`
//! unless configured. Each invocation can carry a deadline; a tool that
//! overruns it is killed and the strategy fails.
//!
//! The result is a new working copy: `clip.mp4` becomes `clip.jpg` with mime
//! type `image/jpeg`, so later steps in the chain (resize, watermark) treat
//! it as an image.

use super::{OptionsError, Strategy, StrategyError, StrategyOptions, is_video};
use crate::file::WorkingCopy;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    seconds: Option<f64>,
    percentage: Option<f64>,
    #[serde(default = "default_ffmpeg")]
    ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    ffprobe: PathBuf,
    timeout_seconds: Option<f64>,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Where in the video the frame is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePosition {
    Seconds(f64),
    /// Percentage of the probed duration, 0-100.
    Percentage(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotStrategy {
    position: FramePosition,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Option<Duration>,
}

impl ScreenshotStrategy {
    pub fn new(position: FramePosition) -> Self {
        Self {
            position,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            timeout: None,
        }
    }

    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_options(options: &StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> {
        let opts: Options = options.parse()?;

        // A percentage wins over a fixed offset.
        let position = match (opts.percentage, opts.seconds) {
            (Some(p), _) if !(0.0..=100.0).contains(&p) => {
                return Err(OptionsError::Value {
                    key: "percentage",
                    reason: format!("{p} is outside 0-100"),
                });
            }
            (Some(p), _) => FramePosition::Percentage(p),
            (None, Some(s)) if s < 0.0 || !s.is_finite() => {
                return Err(OptionsError::Value {
                    key: "seconds",
                    reason: format!("{s} is not a valid offset"),
                });
            }
            (None, Some(s)) => FramePosition::Seconds(s),
            (None, None) => FramePosition::Seconds(0.0),
        };

        let mut strategy = Self::new(position).with_binaries(opts.ffmpeg, opts.ffprobe);
        if let Some(t) = opts.timeout_seconds {
            if t <= 0.0 || !t.is_finite() {
                return Err(OptionsError::Value {
                    key: "timeout_seconds",
                    reason: format!("{t} is not a positive duration"),
                });
            }
            strategy = strategy.with_timeout(Duration::from_secs_f64(t));
        }
        Ok(Box::new(strategy))
    }

    fn offset_seconds(&self, input: &Path) -> Result<f64, StrategyError> {
        match self.position {
            FramePosition::Seconds(s) => Ok(s),
            FramePosition::Percentage(p) => Ok(p / 100.0 * self.probe_duration(input)?),
        }
    }

    fn probe_duration(&self, input: &Path) -> Result<f64, StrategyError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input);
        let stdout = run_command(cmd, self.timeout)?;
        let text = String::from_utf8_lossy(&stdout);
        text.trim().parse::<f64>().map_err(|_| {
            StrategyError::Command(format!("ffprobe reported no duration: '{}'", text.trim()))
        })
    }
}

impl Strategy for ScreenshotStrategy {
    fn applies_to(&self, file: &WorkingCopy) -> bool {
        is_video(file)
    }

    fn perform(&self, file: WorkingCopy) -> Result<WorkingCopy, StrategyError> {
        let input = file.path().to_path_buf();
        let seconds = self.offset_seconds(&input)?;
        let frame = frame_path(&input);

        log::debug!(
            "extracting frame at {seconds:.3}s from {} to {}",
            input.display(),
            frame.display()
        );
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-y")
            .arg("-ss")
            .arg(format!("{seconds:.3}"))
            .arg("-i")
            .arg(&input)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(&frame);
        if let Err(err) = run_command(cmd, self.timeout) {
            remove_partial_frame(&frame);
            return Err(err);
        }

        let stem = file
            .name()
            .map(|n| Path::new(n))
            .and_then(Path::file_stem)
            .or_else(|| input.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());

        match file.with_data(frame.clone()) {
            Ok(copy) => Ok(copy
                .with_name(format!("{stem}.jpg"))
                .with_mime_type("image/jpeg")),
            Err(err) => {
                remove_partial_frame(&frame);
                Err(err.into())
            }
        }
    }
}

/// A failed step yields no working copy, so nothing would record the frame
/// for cleanup.
fn remove_partial_frame(frame: &Path) {
    match std::fs::remove_file(frame) {
        Ok(()) => log::debug!("removed partial frame {}", frame.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove partial frame {}: {e}", frame.display()),
    }
}

/// `clip.mp4` → `clip.jpg` next to the input, never the input itself.
fn frame_path(input: &Path) -> PathBuf {
    let candidate = input.with_extension("jpg");
    if candidate != input {
        return candidate;
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}-frame.jpg"))
}

/// Run an external tool, returning its stdout.
///
/// Fails when the tool can't be started, exits non-zero, or is still running
/// when `timeout` elapses (it is killed then).
fn run_command(mut cmd: Command, timeout: Option<Duration>) -> Result<Vec<u8>, StrategyError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StrategyError::Command(format!("failed to start {program}: {e}")))?;

    // Drain both pipes so a chatty tool never blocks on a full buffer.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::error!("{program} timed out after {:.1}s", limit.as_secs_f64());
                    return Err(StrategyError::Command(format!(
                        "{program} timed out after {:.1}s",
                        limit.as_secs_f64()
                    )));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    if !status.success() {
        let message = String::from_utf8_lossy(&stderr);
        log::error!("{program} failed: {}", message.trim());
        return Err(StrategyError::Command(format!(
            "{program} exited with {status}: {}",
            message.trim()
        )));
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

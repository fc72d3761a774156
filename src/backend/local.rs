//! Local strategy: run FFmpeg on this machine.
//!
//! The FFmpeg binary is acquired lazily on the first conversion through a
//! [`RuntimeProvider`] and then held by the [`LocalBackend`] for the rest of
//! its life, so a second conversion never fetches it again. Acquisition is
//! blocking (network + disk) and runs on tokio's blocking pool.
//!
//! Each conversion gets a private scratch directory (dropped on return) that
//! plays the role of the runtime's filesystem: the input is written in,
//! FFmpeg encodes `out.mp3` next to it, and the bytes are read back.

use crate::backend::ConversionBackend;
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::progress::{checkpoints, scale_into, ProgressTracker};
use crate::request::{ConversionRequest, ConvertedAudio};
use ffmpeg_auto::{versioned_cache_dir, FfmpegFetcher};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Lines of encoder stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Supplies the path of an FFmpeg binary.
///
/// Called at most once per [`LocalBackend`], on the blocking pool.
pub trait RuntimeProvider: Send + Sync {
    /// `on_progress` receives `(bytes_downloaded, total_bytes_option)` if a
    /// download happens.
    fn acquire(&self, on_progress: &dyn Fn(u64, Option<u64>)) -> Result<PathBuf, ConvertError>;
}

/// Download FFmpeg on first use and cache it on disk (see `ffmpeg-auto`).
#[derive(Debug, Clone, Default)]
pub struct AutoDownload {
    fetcher: FfmpegFetcher,
}

impl AutoDownload {
    pub fn new(fetcher: FfmpegFetcher) -> Self {
        Self { fetcher }
    }
}

impl RuntimeProvider for AutoDownload {
    fn acquire(&self, on_progress: &dyn Fn(u64, Option<u64>)) -> Result<PathBuf, ConvertError> {
        Ok(self.fetcher.ensure(Some(on_progress))?)
    }
}

/// Use a binary the caller already has, e.g. `/usr/bin/ffmpeg` or plain
/// `ffmpeg` resolved through `PATH`.
#[derive(Debug, Clone)]
pub struct ExplicitBinary(pub PathBuf);

impl RuntimeProvider for ExplicitBinary {
    fn acquire(&self, _on_progress: &dyn Fn(u64, Option<u64>)) -> Result<PathBuf, ConvertError> {
        let bare_name = self.0.components().count() == 1;
        if bare_name || self.0.exists() {
            Ok(self.0.clone())
        } else {
            Err(ConvertError::RuntimeUnavailable(format!(
                "ffmpeg binary not found at '{}'",
                self.0.display()
            )))
        }
    }
}

/// The acquired runtime.
#[derive(Debug, Clone)]
struct FfmpegRuntime {
    program: PathBuf,
}

/// Converts with a locally run FFmpeg.
pub struct LocalBackend {
    provider: Arc<dyn RuntimeProvider>,
    runtime: OnceCell<FfmpegRuntime>,
}

impl fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBackend")
            .field("runtime", &self.runtime.get())
            .finish()
    }
}

impl LocalBackend {
    pub fn new(provider: Arc<dyn RuntimeProvider>) -> Self {
        Self {
            provider,
            runtime: OnceCell::new(),
        }
    }

    /// Explicit `ffmpeg_path` wins; otherwise auto-download with the
    /// configured cache dir and mirror.
    pub fn from_config(config: &ConversionConfig) -> Self {
        if let Some(ref path) = config.ffmpeg_path {
            return Self::new(Arc::new(ExplicitBinary(path.clone())));
        }
        Self::new(Arc::new(AutoDownload::new(fetcher_for(config))))
    }

    /// Whether the runtime has been acquired in this session.
    pub fn is_loaded(&self) -> bool {
        self.runtime.initialized()
    }

    /// Path of the acquired binary, once loaded.
    pub fn runtime_path(&self) -> Option<&Path> {
        self.runtime.get().map(|r| r.program.as_path())
    }

    async fn runtime(&self, progress: &Arc<ProgressTracker>) -> Result<&FfmpegRuntime, ConvertError> {
        self.runtime
            .get_or_try_init(|| async {
                progress.advance(checkpoints::RUNTIME_LOADING, "Loading FFmpeg runtime…");
                let provider = Arc::clone(&self.provider);
                let tracker = Arc::clone(progress);
                let program = tokio::task::spawn_blocking(move || {
                    provider.acquire(&|downloaded: u64, total: Option<u64>| {
                        if let Some(t) = total.filter(|t| *t > 0) {
                            let fraction = downloaded as f64 / t as f64;
                            tracker.advance(
                                scale_into(
                                    fraction,
                                    checkpoints::RUNTIME_LOADING,
                                    checkpoints::RUNTIME_READY,
                                ),
                                format!(
                                    "Downloading FFmpeg runtime… {}%",
                                    (fraction * 100.0).clamp(0.0, 100.0).round()
                                ),
                            );
                        }
                    })
                })
                .await
                .map_err(|e| ConvertError::Internal(format!("runtime loader panicked: {e}")))??;

                info!("FFmpeg runtime ready: {}", program.display());
                progress.advance(checkpoints::RUNTIME_READY, "FFmpeg ready");
                Ok::<_, ConvertError>(FfmpegRuntime { program })
            })
            .await
    }
}

impl ConversionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &Arc<ProgressTracker>,
    ) -> Result<ConvertedAudio, ConvertError> {
        let runtime = self.runtime(progress).await?;

        progress.advance(checkpoints::INPUT_STAGED, "Preparing file…");
        let scratch = tempfile::tempdir()
            .map_err(|e| ConvertError::Internal(format!("scratch dir: {e}")))?;
        let input = scratch.path().join("input");
        let output = scratch.path().join("out.mp3");
        tokio::fs::write(&input, request.file.bytes())
            .await
            .map_err(|e| ConvertError::Internal(format!("staging input: {e}")))?;

        let bitrate = request.quality.bitrate();
        let status = format!("Converting to MP3 ({bitrate})…");
        progress.advance(checkpoints::INPUT_STAGED, status.as_str());

        run_encoder(&runtime.program, &input, &output, bitrate, progress, &status).await?;

        progress.advance(checkpoints::ENCODE_END, "Preparing download…");
        let data = tokio::fs::read(&output)
            .await
            .map_err(|e| ConvertError::EncoderFailed {
                detail: format!("no output produced: {e}"),
            })?;
        debug!("Encoded {} bytes for '{}'", data.len(), request.file.name());

        Ok(ConvertedAudio {
            data,
            suggested_filename: None,
        })
    }
}

/// The fetcher described by `config`; `runtime_cache_dir` is a base dir.
fn fetcher_for(config: &ConversionConfig) -> FfmpegFetcher {
    let mut fetcher = FfmpegFetcher::new();
    if let Some(ref dir) = config.runtime_cache_dir {
        fetcher = fetcher.with_cache_dir(versioned_cache_dir(dir));
    }
    if let Some(ref url) = config.runtime_base_url {
        fetcher = fetcher.with_base_url(url);
    }
    fetcher
}

/// FFmpeg argument list: input, no video, MP3 at `bitrate`, machine-readable
/// progress on stdout.
pub fn encoder_args(input: &Path, output: &Path, bitrate: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(16);
    for a in ["-hide_banner", "-nostdin", "-y", "-i"] {
        args.push(a.into());
    }
    args.push(input.as_os_str().to_owned());
    for a in [
        "-vn",
        "-codec:a",
        "libmp3lame",
        "-b:a",
        bitrate,
        "-progress",
        "pipe:1",
        "-nostats",
    ] {
        args.push(a.into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

async fn run_encoder(
    program: &Path,
    input: &Path,
    output: &Path,
    bitrate: &str,
    progress: &Arc<ProgressTracker>,
    status: &str,
) -> Result<(), ConvertError> {
    let mut child = Command::new(program)
        .args(encoder_args(input, output, bitrate))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ConvertError::RuntimeUnavailable(format!("failed to start {}: {e}", program.display()))
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ConvertError::Internal("encoder stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ConvertError::Internal("encoder stderr not captured".into()))?;

    // The input duration only appears on stderr, so it is read concurrently
    // and published for the stdout progress loop.
    let (duration_tx, duration_rx) = tokio::sync::watch::channel(None::<Duration>);
    // FFmpeg echoes container metadata verbatim, so stderr is not always
    // UTF-8. The pipe must be drained to EOF or the encoder dies on SIGPIPE.
    let stderr_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut have_duration = false;
        loop {
            let line = match next_lossy_line(&mut reader, &mut buf).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!("encoder stderr unreadable, draining: {e}");
                    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                    break;
                }
            };
            if !have_duration {
                if let Some(d) = parse_duration_line(&line) {
                    have_duration = true;
                    let _ = duration_tx.send(Some(d));
                }
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>()
    });

    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    while let Some(line) = next_lossy_line(&mut reader, &mut buf)
        .await
        .map_err(|e| ConvertError::Internal(format!("reading encoder output: {e}")))?
    {
        match parse_progress_line(&line) {
            Some(ProgressLine::OutTime(elapsed)) => {
                let total = *duration_rx.borrow();
                if let Some(total) = total.filter(|t| !t.is_zero()) {
                    let fraction = elapsed.as_secs_f64() / total.as_secs_f64();
                    progress.advance(
                        scale_into(fraction, checkpoints::INPUT_STAGED, checkpoints::ENCODE_END),
                        status,
                    );
                }
            }
            Some(ProgressLine::End) => {
                progress.advance(checkpoints::ENCODE_END, status);
            }
            None => {}
        }
    }

    let exit = child
        .wait()
        .await
        .map_err(|e| ConvertError::Internal(format!("waiting for encoder: {e}")))?;
    let tail = stderr_task.await.unwrap_or_default();

    if !exit.success() {
        let last = tail
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown error".to_string());
        debug!("ffmpeg stderr tail:\n{}", tail.join("\n"));
        return Err(ConvertError::EncoderFailed {
            detail: format!("ffmpeg exited with {exit}: {last}"),
        });
    }
    Ok(())
}

/// Read one `\n`-terminated line, decoding invalid UTF-8 lossily.
///
/// Returns `Ok(None)` at EOF.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// One meaningful line of `-progress` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLine {
    /// Output timestamp reached so far.
    OutTime(Duration),
    /// `progress=end`.
    End,
}

/// Parse a `key=value` line from FFmpeg's `-progress` stream.
///
/// `out_time_ms` is in microseconds despite its name, same as `out_time_us`.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value
            .trim()
            .parse::<u64>()
            .ok()
            .map(|us| ProgressLine::OutTime(Duration::from_micros(us))),
        "progress" if value.trim() == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Parse `  Duration: 00:03:25.07, start: …` from FFmpeg's banner.
pub fn parse_duration_line(line: &str) -> Option<Duration> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    parse_timestamp(stamp)
}

fn parse_timestamp(stamp: &str) -> Option<Duration> {
    let mut parts = stamp.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !s.is_finite() || s < 0.0 {
        return None;
    }
    Some(Duration::from_secs(h * 3600 + m * 60) + Duration::from_secs_f64(s))
}

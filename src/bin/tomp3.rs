//! CLI binary for tomp3.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints where the MP3 was saved.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tomp3::{
    ConversionConfig, ConversionProgressCallback, ConverterWidget, ProgressCallback, QualityTier,
    SelectedFile, Strategy,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders the widget's percentage and status line as a terminal bar.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, file_name: &str, size: u64) {
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(&format!("Converting {file_name}")),
            dim(&format!("({size} bytes)"))
        ));
    }

    fn on_progress(&self, percent: u8, status: &str) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(status.to_string());
    }

    fn on_conversion_complete(&self, filename: &str, bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}  {}  {}",
            green("✔"),
            bold(filename),
            dim(&format!("{bytes} bytes")),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        );
    }

    fn on_conversion_error(&self, message: &str) {
        self.bar.abandon_with_message(red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert with the local FFmpeg runtime (downloaded on first use)
  tomp3 lecture.mp4

  # Pick the output name and quality
  tomp3 interview.mov -o interview-final -Q high

  # Send the file to a conversion server instead
  tomp3 --strategy remote --server http://media-box:5000 clip.avi

  # Use an FFmpeg that is already installed
  tomp3 --ffmpeg /usr/bin/ffmpeg song.flac --out-dir ~/Music

QUALITY TIERS:
  low      96k
  medium   192k (default; also used for unknown values)
  high     320k

ENVIRONMENT VARIABLES:
  TOMP3_STRATEGY          local | remote
  TOMP3_SERVER            Conversion server base URL
  TOMP3_QUALITY           low | medium | high
  TOMP3_OUT_DIR           Where the MP3 is saved
  TOMP3_FFMPEG            Path to an existing ffmpeg binary
  FFMPEG_AUTO_PATH        Existing ffmpeg binary for the auto-download layer
  FFMPEG_AUTO_CACHE_DIR   Override the FFmpeg cache directory

SETUP:
  No setup is required for the local strategy. FFmpeg (~30 MB) is
  downloaded on first run and cached in ~/.cache/tomp3/ffmpeg-b6.0/.
"#;

/// Convert audio and video files to MP3.
#[derive(Parser, Debug)]
#[command(
    name = "tomp3",
    version,
    about = "Convert audio and video files to MP3",
    long_about = "Convert any audio or video file to MP3, either with a locally run FFmpeg \
(fetched and cached automatically) or by uploading it to a conversion server.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Media file to convert.
    input: PathBuf,

    /// Output base name; `.mp3` is appended. Proposed from INPUT if omitted.
    #[arg(short, long, env = "TOMP3_OUTPUT")]
    output: Option<String>,

    /// Quality tier: low (96k), medium (192k), high (320k).
    #[arg(short = 'Q', long, env = "TOMP3_QUALITY", default_value = "medium")]
    quality: String,

    /// Conversion strategy.
    #[arg(long, env = "TOMP3_STRATEGY", value_enum, default_value = "local")]
    strategy: StrategyArg,

    /// Conversion server base URL (remote strategy).
    #[arg(long, env = "TOMP3_SERVER", default_value = tomp3::config::DEFAULT_SERVER_URL)]
    server: String,

    /// Directory to save the MP3 in.
    #[arg(long, env = "TOMP3_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Use this ffmpeg binary instead of downloading one.
    #[arg(long, env = "TOMP3_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Request timeout in seconds for the remote strategy (none by default).
    #[arg(long, env = "TOMP3_TIMEOUT")]
    timeout: Option<u64>,

    /// Disable progress bar.
    #[arg(long, env = "TOMP3_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TOMP3_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TOMP3_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Local,
    Remote,
}

impl From<StrategyArg> for Strategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Local => Strategy::Local,
            StrategyArg::Remote => Strategy::Remote,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar carries the feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let strategy: Strategy = cli.strategy.into();

    // ── Ensure the FFmpeg runtime is available ───────────────────────────
    // First run downloads it with a byte-level bar; afterwards this is a
    // path check. The widget would fetch it anyway, but only with a coarse
    // 5 → 10% band.
    if strategy == Strategy::Local && cli.ffmpeg.is_none() && !ffmpeg_auto::is_ffmpeg_cached() {
        if show_progress {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("FFmpeg");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                ffmpeg_auto::ensure_ffmpeg(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download FFmpeg")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| ffmpeg_auto::ensure_ffmpeg(None))
                .context("Failed to download FFmpeg")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, strategy, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let file = SelectedFile::from_path(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let mut widget = ConverterWidget::from_config(&config).context("Invalid configuration")?;
    widget.select_file(file);
    if let Some(ref name) = cli.output {
        widget.set_output_name(name.as_str());
    }

    let delivery = widget.convert().await.context("Conversion failed")?;

    if !cli.quiet && !show_progress {
        eprintln!(
            "Saved {} ({} bytes, {})",
            delivery.filename,
            delivery.bytes,
            config.quality.bitrate()
        );
    }
    println!("{}", delivery.path.display());

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    strategy: Strategy,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .strategy(strategy)
        .server_url(cli.server.clone())
        .quality(QualityTier::parse_lenient(&cli.quality))
        .output_dir(cli.out_dir.clone());

    if let Some(ref path) = cli.ffmpeg {
        builder = builder.ffmpeg_path(path.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

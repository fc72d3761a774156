//! # tomp3
//!
//! Turn any audio or video file into an MP3.
//!
//! The crate models a small upload-and-convert widget: pick or drop a file,
//! adjust the proposed output name and the quality tier, press convert,
//! watch a progress bar, and get the MP3 saved where you asked. Two
//! interchangeable strategies do the actual encoding:
//!
//! | Strategy | How | Needs |
//! |----------|-----|-------|
//! | `local`  | runs FFmpeg in-process via a child process | nothing; FFmpeg is fetched and cached on first use |
//! | `remote` | multipart `POST /convert` to a conversion server | a reachable server |
//!
//! ## Flow
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Intake    pick / drop; output name proposed from the file name
//!  ├─ 2. Request   file + sanitised name + quality tier (96k/192k/320k)
//!  ├─ 3. Backend   local FFmpeg  or  remote POST /convert
//!  ├─ 4. Progress  0 → 100 through fixed checkpoints, observer notified
//!  └─ 5. Deliver   atomic write into the output directory
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tomp3::{convert_file, ConversionConfig, QualityTier, Strategy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .strategy(Strategy::Local)
//!         .quality(QualityTier::High)
//!         .output_dir("out")
//!         .build()?;
//!     let saved = convert_file("lecture.mp4", None, &config).await?;
//!     eprintln!("saved {} ({} bytes)", saved.path.display(), saved.bytes);
//!     Ok(())
//! }
//! ```
//!
//! For interactive hosts, drive a [`ConverterWidget`] directly: feed it
//! [`IntakeEvent`]s, read [`ConverterWidget::can_convert`] to enable the
//! trigger, and show [`ConverterWidget::progress`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tomp3` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tomp3 = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod deliver;
pub mod error;
pub mod naming;
pub mod progress;
pub mod request;
pub mod widget;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Backend, ConversionBackend, LocalBackend, RemoteBackend, RuntimeProvider};
pub use config::{ConversionConfig, ConversionConfigBuilder, QualityTier, Strategy};
pub use convert::{convert_file, convert_from_bytes, convert_sync};
pub use deliver::Delivery;
pub use error::ConvertError;
pub use progress::{
    ConversionProgressCallback, NoopProgressCallback, ProgressCallback, ProgressState,
    ProgressTracker,
};
pub use request::{ConversionRequest, ConvertedAudio, SelectedFile};
pub use widget::{ConverterWidget, IntakeEvent, IntakeOutcome, WidgetState};

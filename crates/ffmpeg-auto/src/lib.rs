//! # ffmpeg-auto
//!
//! Auto-download and cache a static [FFmpeg](https://ffmpeg.org/) binary at
//! runtime, so that users of the `tomp3` local strategy do not need FFmpeg
//! installed on their `PATH`.
//!
//! ## How it works
//!
//! On a call to [`FfmpegFetcher::ensure`] (or [`ensure_ffmpeg`]):
//!
//! 1. Honours `FFMPEG_AUTO_PATH` when it points at an existing binary.
//! 2. Checks `~/.cache/tomp3/ffmpeg-{VERSION}/` for the platform binary.
//! 3. If absent, downloads the gzipped binary from
//!    [eugeneware/ffmpeg-static](https://github.com/eugeneware/ffmpeg-static).
//! 4. Decompresses it into the cache dir and marks it executable.
//!
//! Subsequent calls skip the network entirely — the binary is already cached.
//!
//! This crate keeps no process-wide state. Callers that want "load once per
//! session" semantics hold on to the returned path themselves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ffmpeg_auto::{ensure_ffmpeg, FfmpegFetcher};
//!
//! // Option A: default location, silent
//! let ffmpeg = ensure_ffmpeg(None).expect("FFmpeg unavailable");
//!
//! // Option B: custom cache dir, with download progress
//! let fetcher = FfmpegFetcher::new().with_cache_dir("/tmp/ffmpeg-cache");
//! let path = fetcher.ensure(Some(&|downloaded, total| {
//!     if let Some(t) = total {
//!         eprint!("\rDownloading FFmpeg: {}/{} bytes", downloaded, t);
//!     }
//! })).expect("download failed");
//! # let _ = (ffmpeg, path);
//! ```
//!
//! ## Platform support
//!
//! | OS      | Arch    | Asset                      |
//! |---------|---------|----------------------------|
//! | macOS   | arm64   | `ffmpeg-darwin-arm64.gz`   |
//! | macOS   | x86_64  | `ffmpeg-darwin-x64.gz`     |
//! | Linux   | x86_64  | `ffmpeg-linux-x64.gz`      |
//! | Linux   | aarch64 | `ffmpeg-linux-arm64.gz`    |
//! | Windows | x86_64  | `ffmpeg-win32-x64.gz`      |
//!
//! ## Environment variable overrides
//!
//! - `FFMPEG_AUTO_PATH` — path to an existing ffmpeg binary; skips download.
//! - `FFMPEG_AUTO_CACHE_DIR` — override the default cache directory.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// The ffmpeg-static release tag used for downloads.
pub const FFMPEG_VERSION: &str = "b6.0";

/// GitHub release base URL.
pub const DEFAULT_BASE_URL: &str = "https://github.com/eugeneware/ffmpeg-static/releases/download";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by ffmpeg-auto operations.
#[derive(Error, Debug)]
pub enum FfmpegAutoError {
    /// The current OS/architecture combination is not supported.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create or navigate the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip decompression or writing the binary failed.
    #[error("Extraction failed: {0}")]
    Extract(String),
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Asset filename in the GitHub release, e.g. `ffmpeg-linux-x64.gz`.
    archive_name: &'static str,
    /// Filename to write on disk, e.g. `ffmpeg` or `ffmpeg.exe`.
    binary_name: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, FfmpegAutoError> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    match (os, arch) {
        ("macos", "aarch64") => Ok(PlatformInfo {
            archive_name: "ffmpeg-darwin-arm64.gz",
            binary_name: "ffmpeg",
        }),
        ("macos", "x86_64") => Ok(PlatformInfo {
            archive_name: "ffmpeg-darwin-x64.gz",
            binary_name: "ffmpeg",
        }),
        ("linux", "x86_64") => Ok(PlatformInfo {
            archive_name: "ffmpeg-linux-x64.gz",
            binary_name: "ffmpeg",
        }),
        ("linux", "aarch64") => Ok(PlatformInfo {
            archive_name: "ffmpeg-linux-arm64.gz",
            binary_name: "ffmpeg",
        }),
        ("windows", "x86_64") => Ok(PlatformInfo {
            archive_name: "ffmpeg-win32-x64.gz",
            binary_name: "ffmpeg.exe",
        }),
        (os, arch) => Err(FfmpegAutoError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the per-version cache directory for the FFmpeg binary.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/tomp3/ffmpeg-{VERSION}/`
/// - **Linux**: `~/.cache/tomp3/ffmpeg-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\tomp3\ffmpeg-{VERSION}\`
///
/// Override by setting `FFMPEG_AUTO_CACHE_DIR`.
pub fn ffmpeg_cache_dir() -> PathBuf {
    cache_dir_with(std::env::var_os("FFMPEG_AUTO_CACHE_DIR").map(PathBuf::from))
}

/// The per-version subdirectory of `base`: `{base}/ffmpeg-{VERSION}`.
///
/// Both `FFMPEG_AUTO_CACHE_DIR` and a caller-chosen base directory go
/// through this, so different FFmpeg versions never share a cache slot.
pub fn versioned_cache_dir(base: impl AsRef<Path>) -> PathBuf {
    base.as_ref().join(format!("ffmpeg-{FFMPEG_VERSION}"))
}

fn cache_dir_with(override_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = override_dir {
        return versioned_cache_dir(dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    versioned_cache_dir(base.join("tomp3"))
}

// ── Fetcher ──────────────────────────────────────────────────────────────────

/// Locates, downloads, and caches the FFmpeg binary.
///
/// The defaults match [`ensure_ffmpeg`]; tests and air-gapped mirrors swap
/// the base URL or cache dir.
#[derive(Debug, Clone)]
pub struct FfmpegFetcher {
    base_url: String,
    cache_dir: PathBuf,
}

impl Default for FfmpegFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegFetcher {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: ffmpeg_cache_dir(),
        }
    }

    /// Download from a mirror laid out as `{base}/{VERSION}/{asset}`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use `dir` exactly as the binary's directory; no version suffix is
    /// added. Wrap a base directory in [`versioned_cache_dir`] first to get
    /// the same layout as the default cache.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The URL the binary is downloaded from on this platform.
    pub fn download_url(&self) -> Result<String, FfmpegAutoError> {
        let info = detect_platform()?;
        Ok(format!(
            "{}/{}/{}",
            self.base_url, FFMPEG_VERSION, info.archive_name
        ))
    }

    /// Returns the on-disk path to the FFmpeg binary, or `None` if not cached.
    ///
    /// `FFMPEG_AUTO_PATH` wins when it points to an existing file.
    pub fn cached_path(&self) -> Option<PathBuf> {
        if let Ok(p) = std::env::var("FFMPEG_AUTO_PATH") {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Some(pb);
            }
        }
        let info = detect_platform().ok()?;
        let p = self.cache_dir.join(info.binary_name);
        p.exists().then_some(p)
    }

    /// Returns `true` if no network access is needed on the next
    /// [`ensure`](Self::ensure).
    pub fn is_cached(&self) -> bool {
        self.cached_path().is_some()
    }

    /// Ensures the FFmpeg binary is present and returns its path.
    ///
    /// `on_progress` receives `(bytes_downloaded, total_size_option)` during
    /// the download. Pass `None` to suppress progress callbacks.
    pub fn ensure(
        &self,
        on_progress: Option<&dyn Fn(u64, Option<u64>)>,
    ) -> Result<PathBuf, FfmpegAutoError> {
        if let Ok(env_path) = std::env::var("FFMPEG_AUTO_PATH") {
            let p = PathBuf::from(env_path);
            if p.exists() {
                return Ok(p);
            }
            eprintln!(
                "ffmpeg-auto: FFMPEG_AUTO_PATH '{}' not found; downloading …",
                p.display()
            );
        }

        let info = detect_platform()?;
        let bin_path = self.cache_dir.join(info.binary_name);

        if bin_path.exists() {
            return Ok(bin_path);
        }

        let url = self.download_url()?;
        std::fs::create_dir_all(&self.cache_dir).map_err(FfmpegAutoError::CacheDir)?;

        let archive_bytes = download_bytes(&url, on_progress)?;
        decompress_binary(&archive_bytes, &bin_path)?;

        Ok(bin_path)
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if FFmpeg is already available in the default location.
pub fn is_ffmpeg_cached() -> bool {
    FfmpegFetcher::new().is_cached()
}

/// Ensures FFmpeg is present in the default cache, downloading if needed.
pub fn ensure_ffmpeg(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, FfmpegAutoError> {
    FfmpegFetcher::new().ensure(on_progress)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Streams a URL into a `Vec<u8>`, calling `on_progress` every 64 KiB.
fn download_bytes(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, FfmpegAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("ffmpeg-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| FfmpegAutoError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| FfmpegAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(FfmpegAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let capacity = total.unwrap_or(32 * 1024 * 1024) as usize;
    let mut buf = Vec::with_capacity(capacity);

    let mut stream = response;
    let mut chunk = vec![0u8; 64 * 1024]; // 64 KiB
    let mut downloaded: u64 = 0;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FfmpegAutoError::Download(format!("Read error: {e}")));
            }
        }
    }

    Ok(buf)
}

/// Gunzips `archive_bytes` into an executable file at `dest_path`.
///
/// Writes to a sibling `.part` file first so a crash never leaves a truncated
/// binary where [`FfmpegFetcher::cached_path`] would find it.
fn decompress_binary(archive_bytes: &[u8], dest_path: &Path) -> Result<(), FfmpegAutoError> {
    use flate2::read::GzDecoder;

    let mut decoded = Vec::new();
    GzDecoder::new(archive_bytes)
        .read_to_end(&mut decoded)
        .map_err(|e| FfmpegAutoError::Extract(format!("gunzip: {e}")))?;

    if decoded.is_empty() {
        return Err(FfmpegAutoError::Extract("archive is empty".to_string()));
    }

    let part = dest_path.with_extension("part");
    std::fs::write(&part, &decoded)
        .map_err(|e| FfmpegAutoError::Extract(format!("write {}: {e}", part.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&part, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| FfmpegAutoError::Extract(format!("chmod: {e}")))?;
    }

    std::fs::rename(&part, dest_path)
        .map_err(|e| FfmpegAutoError::Extract(format!("rename: {e}")))?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

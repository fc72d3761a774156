//! Local strategy with a stand-in FFmpeg.
//!
//! The stand-in is a small shell script that records its arguments, prints
//! a `Duration:` banner on stderr and `-progress` lines on stdout, and
//! writes a fake MP3 to its last argument. Unix only.
//!
//! `test_e2e_real_ffmpeg` downloads the real FFmpeg build and is gated
//! behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 cargo test --test local -- --nocapture
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tomp3::backend::LocalBackend;
use tomp3::{
    ConversionConfig, ConversionProgressCallback, ConvertError, ConverterWidget, ProgressCallback,
    QualityTier, RuntimeProvider, SelectedFile, Strategy, WidgetState,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

const FAKE_FFMPEG: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
for last; do :; done
echo "  Duration: 00:00:02.00, start: 0.000000, bitrate: 1411 kb/s" >&2
sleep 0.2
printf 'ID3fake' > "$last"
echo "out_time_us=1000000"
echo "progress=continue"
echo "out_time_us=2000000"
echo "progress=end"
"#;

const BROKEN_FFMPEG: &str = r#"#!/bin/sh
echo "ffmpeg version 6.0" >&2
echo "input: Invalid data found when processing input" >&2
exit 1
"#;

/// Echoes raw Latin-1 metadata on stderr, keeps writing warnings, and
/// still succeeds.
const NON_UTF8_STDERR_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
echo "  Duration: 00:00:02.00, start: 0.000000, bitrate: 1411 kb/s" >&2
printf '    title           : \377\376caf\351\n' >&2
sleep 0.2
i=0
while [ $i -lt 50 ]; do
  echo "[mp3 @ 0x0] warning $i" >&2
  i=$((i + 1))
done
printf 'ID3fake' > "$last"
echo "progress=end"
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Hands out a fixed binary and counts how often it is asked.
struct CountingProvider {
    program: PathBuf,
    calls: Arc<AtomicUsize>,
}

impl RuntimeProvider for CountingProvider {
    fn acquire(&self, on_progress: &dyn Fn(u64, Option<u64>)) -> Result<PathBuf, ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        on_progress(50, Some(100));
        on_progress(100, Some(100));
        Ok(self.program.clone())
    }
}

/// Records every percentage the widget reports.
#[derive(Default)]
struct PercentLog(Mutex<Vec<u8>>);

impl ConversionProgressCallback for PercentLog {
    fn on_progress(&self, percent: u8, _status: &str) {
        self.0.lock().unwrap().push(percent);
    }
}

fn local_widget(script: &str) -> (ConverterWidget<LocalBackend>, Arc<AtomicUsize>, tempfile::TempDir) {
    local_widget_observed(script, None)
}

fn local_widget_observed(
    script: &str,
    observer: Option<ProgressCallback>,
) -> (ConverterWidget<LocalBackend>, Arc<AtomicUsize>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let program = write_script(dir.path(), script);
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = LocalBackend::new(Arc::new(CountingProvider {
        program,
        calls: Arc::clone(&calls),
    }));
    let widget = ConverterWidget::new(backend, dir.path().join("out"), observer);
    (widget, calls, dir)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_runtime_acquired_once_across_conversions() {
    let (mut w, calls, _dir) = local_widget(FAKE_FFMPEG);
    assert!(!w.backend().is_loaded());

    w.select_file(SelectedFile::from_bytes("one.wav", b"RIFF".to_vec()));
    w.convert().await.unwrap();
    assert!(w.backend().is_loaded());

    w.select_file(SelectedFile::from_bytes("two.wav", b"RIFF".to_vec()));
    w.convert().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_encoder_arguments_and_output() {
    let (mut w, _, dir) = local_widget(FAKE_FFMPEG);
    w.select_file(SelectedFile::from_bytes("Band - Live.mkv", b"matroska".to_vec()));
    w.set_quality(QualityTier::High);

    let d = w.convert().await.unwrap();

    assert_eq!(d.filename, "Band_-_Live.mp3");
    assert_eq!(d.path, dir.path().join("out").join("Band_-_Live.mp3"));
    assert_eq!(std::fs::read(&d.path).unwrap(), b"ID3fake");
    assert_eq!(w.state(), WidgetState::Succeeded);
    assert_eq!(w.progress().percent, 100);

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args.contains(&"-vn"));
    let b = args.iter().position(|a| *a == "-b:a").unwrap();
    assert_eq!(args[b + 1], "320k");
}

#[tokio::test]
async fn test_progress_walks_local_checkpoints() {
    let log = Arc::new(PercentLog::default());
    let (mut w, _, _dir) = local_widget_observed(FAKE_FFMPEG, Some(log.clone()));
    w.select_file(SelectedFile::from_bytes("talk.wav", b"RIFF".to_vec()));

    w.convert().await.unwrap();

    let seen = log.0.lock().unwrap();
    assert!(seen.windows(2).all(|p| p[0] <= p[1]), "progress went backwards: {seen:?}");
    for checkpoint in [5u8, 10, 15, 95, 100] {
        assert!(seen.contains(&checkpoint), "missing {checkpoint}: {seen:?}");
    }
    assert!(
        seen.iter().any(|p| *p > 15 && *p < 95),
        "encoder progress never scaled into the band: {seen:?}"
    );
}

#[tokio::test]
async fn test_non_utf8_stderr_does_not_break_encoder() {
    let (mut w, _, _dir) = local_widget(NON_UTF8_STDERR_FFMPEG);
    w.select_file(SelectedFile::from_bytes("café.m4a", b"m4a".to_vec()));

    let d = w.convert().await.unwrap();

    assert_eq!(std::fs::read(&d.path).unwrap(), b"ID3fake");
    assert_eq!(w.state(), WidgetState::Succeeded);
}

#[tokio::test]
async fn test_encoder_failure_reports_stderr() {
    let (mut w, _, _dir) = local_widget(BROKEN_FFMPEG);
    w.select_file(SelectedFile::from_bytes("notes.txt", b"hello".to_vec()));

    let err = w.convert().await.unwrap_err();

    assert!(matches!(err, ConvertError::EncoderFailed { .. }), "got {err:?}");
    assert!(w.status().starts_with("Error: "));
    assert!(w.status().contains("Invalid data found"));
    assert_eq!(w.progress().percent, 0);
    assert!(w.can_convert());
}

#[tokio::test]
async fn test_missing_explicit_binary() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .strategy(Strategy::Local)
        .ffmpeg_path(dir.path().join("no-such-ffmpeg"))
        .output_dir(dir.path())
        .build()
        .unwrap();
    let mut w = ConverterWidget::from_config(&config).unwrap();
    w.select_file(SelectedFile::from_bytes("a.wav", b"RIFF".to_vec()));

    let err = w.convert().await.unwrap_err();
    assert!(matches!(err, ConvertError::RuntimeUnavailable(_)));
    assert_eq!(w.state(), WidgetState::Failed);
}

#[tokio::test]
async fn test_convert_file_with_explicit_binary() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_script(dir.path(), FAKE_FFMPEG);
    let input = dir.path().join("lecture 01.mp4");
    std::fs::write(&input, b"mp4").unwrap();

    let config = ConversionConfig::builder()
        .ffmpeg_path(program)
        .output_dir(dir.path().join("mp3"))
        .quality(QualityTier::Low)
        .build()
        .unwrap();
    let d = tomp3::convert_file(&input, Some("week1"), &config).await.unwrap();

    assert_eq!(d.filename, "week1.mp3");
    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.lines().any(|a| a == "96k"));
}

// ── Real FFmpeg ──────────────────────────────────────────────────────────────

/// One second of 8 kHz mono 16-bit silence.
fn silent_wav() -> Vec<u8> {
    let samples = 8000u32;
    let data_len = samples * 2;
    let mut v = Vec::with_capacity(44 + data_len as usize);
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&(36 + data_len).to_le_bytes());
    v.extend_from_slice(b"WAVEfmt ");
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes()); // PCM
    v.extend_from_slice(&1u16.to_le_bytes()); // mono
    v.extend_from_slice(&8000u32.to_le_bytes());
    v.extend_from_slice(&16000u32.to_le_bytes());
    v.extend_from_slice(&2u16.to_le_bytes());
    v.extend_from_slice(&16u16.to_le_bytes());
    v.extend_from_slice(b"data");
    v.extend_from_slice(&data_len.to_le_bytes());
    v.resize(44 + data_len as usize, 0);
    v
}

#[tokio::test(flavor = "multi_thread")]
async fn test_e2e_real_ffmpeg() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .output_dir(dir.path())
        .build()
        .unwrap();

    let d = tomp3::convert_from_bytes("silence.wav", silent_wav(), &config)
        .await
        .unwrap();

    let mp3 = std::fs::read(&d.path).unwrap();
    assert_eq!(d.filename, "silence.mp3");
    assert!(
        mp3.starts_with(b"ID3") || (mp3.len() > 1 && mp3[0] == 0xFF && mp3[1] & 0xE0 == 0xE0),
        "not an MP3 header"
    );
}

//! Remote strategy against an in-process stand-in for `POST /convert`.
//!
//! The stand-in records every multipart request it receives and answers
//! according to a fixed [`Reply`], so these tests need no network access.
//!
//! Run with:
//!   cargo test --test remote -- --nocapture

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tomp3::{
    ConversionConfig, ConversionProgressCallback, ConvertError, ConverterWidget, IntakeEvent,
    QualityTier, SelectedFile, Strategy, WidgetState,
};

// ── Stand-in server ──────────────────────────────────────────────────────────

const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mp3-frames";

#[derive(Clone, Copy)]
enum Reply {
    /// 200 audio/mpeg, optionally with a Content-Disposition filename.
    Mp3(Option<&'static str>),
    /// 400 application/json `{ "error": <msg> }`.
    JsonError(&'static str),
    /// 502 text/plain, like a proxy in front of a dead server.
    BadGateway,
}

#[derive(Default)]
struct Recorded {
    /// One map per request: field name → bytes.
    requests: Mutex<Vec<HashMap<String, Vec<u8>>>>,
}

struct ServerState {
    reply: Reply,
    recorded: Arc<Recorded>,
}

async fn convert_handler(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("unknown").to_string();
        let data = field.bytes().await.unwrap_or_default();
        fields.insert(name, data.to_vec());
    }
    state.recorded.requests.lock().unwrap().push(fields);

    match state.reply {
        Reply::Mp3(Some(name)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "audio/mpeg".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{name}\""),
                ),
            ],
            FAKE_MP3,
        )
            .into_response(),
        Reply::Mp3(None) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], FAKE_MP3).into_response()
        }
        Reply::JsonError(msg) => (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": msg, "details": "Invalid data found" }).to_string(),
        )
            .into_response(),
        Reply::BadGateway => {
            (StatusCode::BAD_GATEWAY, [(header::CONTENT_TYPE, "text/plain")], "upstream down")
                .into_response()
        }
    }
}

async fn spawn_server(reply: Reply) -> (SocketAddr, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let state = Arc::new(ServerState {
        reply,
        recorded: Arc::clone(&recorded),
    });
    let app = Router::new()
        .route("/convert", post(convert_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorded)
}

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Records every percentage the widget reports.
#[derive(Default)]
struct PercentLog(Mutex<Vec<u8>>);

impl ConversionProgressCallback for PercentLog {
    fn on_progress(&self, percent: u8, _status: &str) {
        self.0.lock().unwrap().push(percent);
    }
}

fn remote_widget(
    addr: SocketAddr,
    out_dir: &std::path::Path,
    log: Option<Arc<PercentLog>>,
) -> ConverterWidget {
    let mut builder = ConversionConfig::builder()
        .strategy(Strategy::Remote)
        .server_url(format!("http://{addr}"))
        .output_dir(out_dir);
    if let Some(log) = log {
        builder = builder.progress_callback(log);
    }
    ConverterWidget::from_config(&builder.build().unwrap()).unwrap()
}

fn media(name: &str) -> SelectedFile {
    SelectedFile::from_bytes(name, vec![7u8; 200 * 1024])
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_happy_path_posts_once_and_uses_server_filename() {
    let (addr, recorded) = spawn_server(Reply::Mp3(Some("server-name.mp3"))).await;
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(PercentLog::default());
    let mut w = remote_widget(addr, dir.path(), Some(Arc::clone(&log)));

    w.dispatch(IntakeEvent::Picked(vec![media("My Clip (final).mov")]));
    w.set_quality(QualityTier::High);
    let d = w.convert().await.unwrap();

    assert_eq!(d.filename, "server-name.mp3");
    assert_eq!(std::fs::read(&d.path).unwrap(), FAKE_MP3);
    assert_eq!(w.state(), WidgetState::Succeeded);
    assert_eq!(w.progress().percent, 100);

    let requests = recorded.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "exactly one POST");
    let fields = &requests[0];
    assert_eq!(fields["quality"], b"high");
    assert_eq!(fields["output_name"], b"My_Clip_final_");
    assert_eq!(fields["file"].len(), 200 * 1024);

    let seen = log.0.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert!(seen.contains(&60), "upload never reached 60: {seen:?}");
    assert!(seen.iter().all(|p| *p <= 100));
}

#[tokio::test]
async fn test_without_disposition_saves_output_name() {
    let (addr, _) = spawn_server(Reply::Mp3(None)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut w = remote_widget(addr, dir.path(), None);

    w.select_file(media("podcast.wav"));
    w.set_output_name("episode 12");
    let d = w.convert().await.unwrap();

    assert_eq!(d.filename, "episode_12.mp3");
    assert!(dir.path().join("episode_12.mp3").exists());
}

#[tokio::test]
async fn test_json_error_is_shown_verbatim() {
    let (addr, recorded) = spawn_server(Reply::JsonError("bad format")).await;
    let dir = tempfile::tempdir().unwrap();
    let mut w = remote_widget(addr, dir.path(), None);

    w.select_file(media("notes.txt"));
    let err = w.convert().await.unwrap_err();

    assert!(matches!(err, ConvertError::ServerReported { .. }));
    assert_eq!(w.status(), "bad format");
    assert_eq!(w.progress().percent, 0);
    assert!(w.can_convert());
    assert_eq!(recorded.requests.lock().unwrap().len(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_non_json_error_status() {
    let (addr, _) = spawn_server(Reply::BadGateway).await;
    let dir = tempfile::tempdir().unwrap();
    let mut w = remote_widget(addr, dir.path(), None);

    w.select_file(media("a.mp4"));
    let err = w.convert().await.unwrap_err();

    assert!(matches!(err, ConvertError::HttpStatus { status: 502, .. }));
    assert!(w.status().starts_with("Error: "));
    assert_eq!(w.progress().percent, 0);
}

#[tokio::test]
async fn test_unreachable_server() {
    // Grab a free port, then close it.
    let addr = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut w = remote_widget(addr, dir.path(), None);

    w.select_file(media("a.mp4"));
    let err = w.convert().await.unwrap_err();

    assert!(matches!(err, ConvertError::Network { .. }), "got {err:?}");
    assert_eq!(w.state(), WidgetState::Failed);
    assert!(w.can_convert());
}

#[tokio::test]
async fn test_convert_from_bytes_remote() {
    let (addr, recorded) = spawn_server(Reply::Mp3(None)).await;
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .strategy(Strategy::Remote)
        .server_url(format!("http://{addr}/"))
        .output_dir(dir.path())
        .build()
        .unwrap();

    let d = tomp3::convert_from_bytes("Voice Memo.m4a", b"m4a".to_vec(), &config)
        .await
        .unwrap();

    assert_eq!(d.filename, "Voice_Memo.mp3");
    assert_eq!(recorded.requests.lock().unwrap()[0]["quality"], b"medium");
}

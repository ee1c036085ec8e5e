//! HTTP/WebSocket服务层
//! Service surface: upload → MJPEG stream → live WebSocket counts → final stats
//!
//! 会话取代策略: 新的推流请求使纪元+1, 旧流水线在下一帧边界
//! 观察到纪元变化后自行结束并释放帧源。

use crate::broadcast::BroadcastHub;
use crate::counting::SessionState;
use crate::detector::{NullDetector, VehicleDetector};
use crate::pipeline::{self, FramePipeline, PipelineConfig, SessionGate};
use crate::source::{self, FrameSource};
use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

// ========== 共享状态 ==========

pub type DetectorFactory = Arc<dyn Fn() -> Box<dyn VehicleDetector> + Send + Sync>;
pub type SourceFactory = Arc<dyn Fn(&Path) -> Result<Box<dyn FrameSource>> + Send + Sync>;

pub struct AppState {
    pub session: Arc<Mutex<SessionState>>,
    pub hub: Arc<BroadcastHub>,
    pub pipeline_config: PipelineConfig,
    pub upload_dir: PathBuf,
    detector_factory: DetectorFactory,
    source_factory: SourceFactory,
    /// 会话纪元: 新推流请求+1, 旧会话据此自我终止 (共享给流水线的通行证)
    epoch: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        pipeline_config: PipelineConfig,
        upload_dir: PathBuf,
        detector_factory: DetectorFactory,
        source_factory: SourceFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(SessionState::new())),
            hub: Arc::new(BroadcastHub::new()),
            pipeline_config,
            upload_dir,
            detector_factory,
            source_factory,
            epoch: Arc::new(AtomicU64::new(0)),
        })
    }

    /// 默认装配: 空检测器 + 目录帧源
    pub fn with_defaults(pipeline_config: PipelineConfig, upload_dir: PathBuf) -> Arc<Self> {
        Self::new(
            pipeline_config,
            upload_dir,
            Arc::new(|| Box::new(NullDetector) as Box<dyn VehicleDetector>),
            Arc::new(|path| source::open_source(path)),
        )
    }

    fn begin_session(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn session_current(&self, token: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == token
    }
}

// ========== 错误类型 ==========

/// HTTP错误: 状态码 + 原因
pub struct AppError(StatusCode, String);

impl AppError {
    fn bad_request(reason: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, reason.into())
    }

    fn internal(reason: impl Into<String>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, reason.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

// ========== 路由 ==========

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload-video", post(upload_video))
        .route("/stream-video", get(stream_video))
        .route("/final-stats", get(final_stats))
        .route("/ws", get(ws_handler))
        // 视频文件远超axum默认2MB请求体上限
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

// ========== 上传 ==========

const ALLOWED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// 上传请求体上限
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// 校验上传文件名后缀, 通过则返回规范化小写后缀
fn allowed_upload_extension(filename: &str) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(&format!(".{ext}")))
        .copied()
}

async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
    {
        if field.name() != Some("video") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let Some(ext) = allowed_upload_extension(&filename) else {
            return Err(AppError::bad_request(
                "Invalid file format. Please upload MP4, AVI, or MOV files.",
            ));
        };

        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("upload read failed: {err}")))?;

        let path = state
            .upload_dir
            .join(format!("upload_{}.{}", crate::gen_time_string(""), ext));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|err| AppError::internal(format!("failed to persist upload: {err}")))?;

        info!(video = %path.display(), bytes = data.len(), "video uploaded");
        return Ok(Json(json!({ "video_url": path.to_string_lossy() })));
    }

    Err(AppError::bad_request("missing multipart field 'video'"))
}

// ========== 推流 ==========

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub video_url: String,
}

async fn stream_video(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    let path = PathBuf::from(&query.video_url);
    if !path.exists() {
        return Err(AppError::bad_request("Video file not found."));
    }

    // 输入错误在会话状态被触碰之前全部拦截
    let source = (state.source_factory)(&path)
        .map_err(|err| AppError::internal(format!("Cannot open video source: {err:#}")))?;
    let detector = (state.detector_factory)();

    let token = state.begin_session();
    let pipeline = FramePipeline::new(
        source,
        detector,
        state.session.clone(),
        state.pipeline_config,
        SessionGate::new(state.epoch.clone(), token),
    );
    info!(session = token, video = %path.display(), "stream session started");

    let stream_state = state.clone();
    let stream = async_stream::stream! {
        let mut pipeline = pipeline;
        let mut frames = 0u64;
        loop {
            // 被新会话取代: 在帧边界干净退出, 随流水线释放帧源
            if !stream_state.session_current(token) {
                info!(session = token, "session superseded by a newer stream");
                break;
            }

            // 检测+编码是同步CPU密集步骤, 放到阻塞线程执行
            let step = tokio::task::spawn_blocking(move || {
                let result = pipeline.step();
                (pipeline, result)
            })
            .await;

            let (returned, result) = match step {
                Ok(pair) => pair,
                Err(err) => {
                    error!(session = token, error = %err, "frame task aborted");
                    break;
                }
            };
            pipeline = returned;
            frames = pipeline.frame_count();

            match result {
                Ok(Some(output)) => {
                    pipeline::publish_if_changed(&stream_state.hub, &output);
                    yield Ok::<Bytes, Infallible>(frame_chunk(&output.jpeg));
                }
                Ok(None) => break,
                Err(err) => {
                    // 源级错误终止会话, 计数保持最后提交值
                    error!(session = token, error = %err, "fatal frame source error");
                    break;
                }
            }
        }
        info!(session = token, frames, "stream session ended");
    };

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|err| AppError::internal(err.to_string()))
}

/// 替换式multipart分块: --frame头 + JPEG + CRLF
fn frame_chunk(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

// ========== 实时订阅 ==========

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut snapshots) = state.hub.subscribe();
    debug!(subscriber = id, "websocket subscriber connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                let Some(snapshot) = snapshot else { break };
                let json = match serde_json::to_string(&snapshot) {
                    Ok(json) => json,
                    Err(err) => {
                        error!(error = %err, "snapshot serialization failed");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    // 客户端可以什么都不发, 也可以发任意保活消息
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unsubscribe(id);
    debug!(subscriber = id, "websocket subscriber disconnected");
}

// ========== 统计查询 ==========

async fn final_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state
        .session
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .snapshot();
    Json(json!({ "stats": snapshot }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_upload_extensions() {
        assert_eq!(allowed_upload_extension("traffic.mp4"), Some("mp4"));
        assert_eq!(allowed_upload_extension("TRAFFIC.MOV"), Some("mov"));
        assert_eq!(allowed_upload_extension("clip.AVI"), Some("avi"));
        assert_eq!(allowed_upload_extension("clip.mkv"), None);
        assert_eq!(allowed_upload_extension("mp4"), None);
        assert_eq!(allowed_upload_extension(""), None);
    }

    #[test]
    fn test_frame_chunk_framing() {
        let chunk = frame_chunk(&[0xFF, 0xD8, 0xFF]);
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
    }

    #[test]
    fn test_session_epoch_supersedes() {
        let state = AppState::with_defaults(PipelineConfig::default(), PathBuf::from("."));
        let first = state.begin_session();
        assert!(state.session_current(first));
        let second = state.begin_session();
        assert!(!state.session_current(first));
        assert!(state.session_current(second));
    }
}

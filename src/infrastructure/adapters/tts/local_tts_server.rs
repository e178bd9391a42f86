//! 测试用本地 TTS 服务
//!
//! `/api/tts/stream` 读完整个请求体后才返回 NDJSON，
//! `/stall/api/tts/stream` 只发送采样率声明，之后不再输出。

use axum::body::Body;
use axum::routing::post;
use axum::Router;
use base64::Engine as _;
use futures_util::stream::{self, StreamExt};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

pub(crate) const SAMPLE_RATE: u32 = 24_000;
/// 每个字符对应的帧数（1.0x 语速下每秒 15 个字符）
pub(crate) const FRAMES_PER_CHAR: usize = 1_600;

/// 整个请求体合成为一块
async fn buffered_stream(body: String) -> String {
    let text = body.trim();
    let frames = text.chars().count() * FRAMES_PER_CHAR;
    let audio = base64::engine::general_purpose::STANDARD.encode(vec![0u8; frames * 2]);

    let mut lines = vec![serde_json::json!({ "sample_rate": SAMPLE_RATE }).to_string()];
    if !text.is_empty() {
        lines.push(serde_json::json!({ "text": text, "audio": audio }).to_string());
    }
    lines.push(serde_json::json!({ "end": true }).to_string());
    lines.join("\n") + "\n"
}

async fn stalled_stream() -> Body {
    let header = format!("{}\n", serde_json::json!({ "sample_rate": SAMPLE_RATE }));
    let lines = stream::once(async move { Ok::<_, std::io::Error>(header) }).chain(stream::pending());
    Body::from_stream(lines)
}

/// 在随机端口启动服务，返回基础 URL
pub(crate) async fn spawn() -> (String, JoinHandle<()>) {
    let app = Router::new()
        .route("/api/tts/stream", post(buffered_stream))
        .route("/stall/api/tts/stream", post(stalled_stream));

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

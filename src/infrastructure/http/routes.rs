//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                 GET   健康检查
//! - /api/playback/speak       POST  朗读（按准入规则开始、排队或打断）
//! - /api/playback/enqueue     POST  追加到队尾
//! - /api/playback/stop        POST  停止当前朗读并推进队列
//! - /api/playback/pause       POST  暂停
//! - /api/playback/resume      POST  继续
//! - /api/playback/state       GET   播放状态、进度与队列
//! - /api/queue/remove         POST  移除排队项
//! - /api/settings             GET   读取设置
//! - /api/settings             POST  部分更新设置
//! - /ws/events                WS    播放事件推送

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/events", get(handlers::events_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/playback", playback_routes())
        .route("/queue/remove", post(handlers::remove_queued))
        .route(
            "/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
}

/// Playback 路由
fn playback_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/speak", post(handlers::speak))
        .route("/enqueue", post(handlers::enqueue))
        .route("/stop", post(handlers::stop))
        .route("/pause", post(handlers::pause))
        .route("/resume", post(handlers::resume))
        .route("/state", get(handlers::playback_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use crate::infrastructure::http::state::test_state;

    struct TestApp {
        router: Router,
        _dir: TempDir,
    }

    fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());
        TestApp {
            router: create_routes().with_state(Arc::new(state)),
            _dir: dir,
        }
    }

    async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> Value {
        let builder = HttpRequest::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let app = test_app();
        let json = send(&app, "GET", "/api/ping", None).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "speakline");
    }

    #[tokio::test]
    async fn test_speak_starts_playback() {
        let app = test_app();
        let json = send(
            &app,
            "POST",
            "/api/playback/speak",
            Some(json!({ "text": "Hello there." })),
        )
        .await;

        assert_eq!(json["errno"], 0);
        assert_eq!(json["data"]["admission"]["outcome"], "started");
        assert_eq!(json["data"]["voice"], "af_sarah");
        assert_eq!(json["data"]["speed"], 1.0);

        let state = send(&app, "GET", "/api/playback/state", None).await;
        assert_eq!(state["errno"], 0);
        assert_ne!(state["data"]["state"], "idle");
        assert_eq!(state["data"]["current"]["text"], "Hello there.");
    }

    #[tokio::test]
    async fn test_speak_with_invalid_input_is_bad_request() {
        let app = test_app();
        let json = send(
            &app,
            "POST",
            "/api/playback/speak",
            Some(json!({ "text": "   " })),
        )
        .await;
        assert_eq!(json["errno"], 400);

        let json = send(
            &app,
            "POST",
            "/api/playback/speak",
            Some(json!({ "text": "Hi", "speed": -1.0 })),
        )
        .await;
        assert_eq!(json["errno"], 400);
    }

    #[tokio::test]
    async fn test_remove_from_empty_queue_is_not_found() {
        let app = test_app();
        let json = send(&app, "POST", "/api/queue/remove", Some(json!({ "index": 0 }))).await;
        assert_eq!(json["errno"], 404);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_enables_queue() {
        let app = test_app();

        let json = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(json["data"]["queue_enabled"], false);

        let json = send(
            &app,
            "POST",
            "/api/settings",
            Some(json!({ "queue_enabled": true, "speed": 1.25 })),
        )
        .await;
        assert_eq!(json["errno"], 0);
        assert_eq!(json["data"]["speed"], 1.25);
        assert_eq!(json["data"]["voice"], "af_sarah");

        let state = send(&app, "GET", "/api/playback/state", None).await;
        assert_eq!(state["data"]["queue_enabled"], true);

        send(&app, "POST", "/api/playback/speak", Some(json!({ "text": "First." }))).await;
        let second = send(
            &app,
            "POST",
            "/api/playback/speak",
            Some(json!({ "text": "Second." })),
        )
        .await;
        assert_eq!(second["data"]["admission"]["outcome"], "enqueued");
        assert_eq!(second["data"]["speed"], 1.25);
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let app = test_app();
        let json = send(&app, "POST", "/api/playback/stop", None).await;
        assert_eq!(json["errno"], 0);
        assert!(json["data"]["next"].is_null());
    }
}

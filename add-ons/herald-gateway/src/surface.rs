//! The mute/unmute control surface.
//!
//! Two semantic operations, always acknowledged: `mute` (optionally timed)
//! and `unmute`. A malformed or missing duration means "mute indefinitely",
//! never an error, so the body is parsed leniently instead of through a
//! rejecting extractor. `/api/shutup` is the legacy spelling of `/api/mute`.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use herald_voice::{MuteController, MuteSource};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub mute: MuteController,
}

pub fn router(mute: MuteController) -> Router {
    Router::new()
        .route("/api/mute", post(mute_handler))
        .route("/api/shutup", post(mute_handler))
        .route("/api/unmute", post(unmute_handler))
        .with_state(ApiState { mute })
}

async fn mute_handler(State(state): State<ApiState>, body: Bytes) -> Json<Value> {
    let duration = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("duration").and_then(Value::as_u64));

    match duration {
        Some(secs) if secs > 0 => {
            info!(secs, "control surface: timed mute");
            state
                .mute
                .mute_for(Duration::from_secs(secs), MuteSource::Api);
        }
        _ => {
            info!("control surface: mute indefinitely");
            state.mute.mute_indefinite(MuteSource::Api);
        }
    }
    Json(json!({ "status": "ok" }))
}

async fn unmute_handler(State(state): State<ApiState>) -> Json<Value> {
    info!("control surface: unmute");
    state.mute.unmute(MuteSource::Api);
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn mute_with_duration_schedules_timed_mute() {
        let mute = MuteController::new();
        let app = router(mute.clone());
        let res = app
            .oneshot(request("/api/mute", r#"{"duration": 5}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(mute.is_muted());
    }

    #[tokio::test]
    async fn malformed_duration_means_indefinite_not_error() {
        let mute = MuteController::new();
        let app = router(mute.clone());
        let res = app
            .oneshot(request("/api/mute", r#"{"duration": "soon-ish"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(mute.is_muted());
    }

    #[tokio::test]
    async fn zero_duration_means_indefinite() {
        let mute = MuteController::new();
        let app = router(mute.clone());
        let res = app
            .oneshot(request("/api/shutup", r#"{"duration": 0}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(mute.is_muted());
    }

    #[tokio::test]
    async fn unmute_is_always_acknowledged() {
        let mute = MuteController::new();
        mute.mute_indefinite(MuteSource::Command);
        let app = router(mute.clone());
        let res = app.oneshot(request("/api/unmute", "")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!mute.is_muted());
    }
}

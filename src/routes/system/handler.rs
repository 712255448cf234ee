use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// 只暴露非敏感配置，绝不返回密钥本身
pub async fn debug_env(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "model": state.generator.model(),
        "port": state.config.server_port,
        "hasApiKey": !state.config.openai_api_key.is_empty(),
    }))
}

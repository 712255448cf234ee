use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::{RateLimitGuard, log_errors, rate_limit},
    routes,
};

// 创建主路由
pub fn create_router(state: AppState) -> Router {
    let global = Arc::new(RateLimitGuard::new(
        state.global_limiter.clone(),
        state.config.trust_proxy_headers,
    ));

    let router = Router::new()
        .route("/api/generate", post(routes::generate::generate))
        .route("/health", get(routes::system::health))
        .route("/debug/env", get(routes::system::debug_env));

    // 添加全局限流和日志中间件
    let router = router
        .layer(axum::middleware::from_fn_with_state(global, rate_limit))
        .layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}

use std::net::SocketAddr;

use axum::{
    Json,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub ok: bool,
    pub error: String,
}

pub fn error_to_api_response(error: String) -> Json<ApiError> {
    Json(ApiError { ok: false, error })
}

pub const RATE_LIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "ratelimit-reset";

/// 写入 RateLimit-* 响应头
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset: u64) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset));
}

/// 限流键：默认取对端地址，开启 trust_proxy 时优先使用代理头
pub fn client_key(req: &Request<Body>, trust_proxy: bool) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let forwarded = if trust_proxy {
        req.headers()
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                req.headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
            })
            .map(str::to_string)
    } else {
        None
    };

    forwarded
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

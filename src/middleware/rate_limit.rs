use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    limiter::{RateLimitDecision, RateLimiter},
    utils::{RATE_LIMIT_LIMIT, client_key, insert_rate_limit_headers},
};

/// 请求方的限流键，由全局限流中间件写入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

/// Spend one token for `key`, turning a rejection into [`AppError::RateLimited`].
pub async fn admit(limiter: &RateLimiter, key: &str) -> Result<RateLimitDecision, AppError> {
    let decision = limiter.check(key).await?;
    if !decision.allowed {
        tracing::warn!(
            limiter = limiter.name(),
            key = %key,
            retry_after = decision.retry_after.unwrap_or_default(),
            "Rate limit exceeded"
        );
        return Err(AppError::rate_limited(&decision));
    }
    Ok(decision)
}

/// 一个限流器实例加上取键策略，作为中间件状态
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    trust_proxy: bool,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, trust_proxy: bool) -> Self {
        Self {
            limiter,
            trust_proxy,
        }
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        mut req: Request<Body>,
        next: Next,
    ) -> Result<Response, AppError> {
        let key = client_key(&req, self.trust_proxy);
        let decision = admit(&self.limiter, &key).await?;
        req.extensions_mut().insert(ClientKey(key));

        let mut response = next.run(req).await;

        // 内层（更严格）的限流器已经写过头就不覆盖
        let headers = response.headers_mut();
        if !headers.contains_key(RATE_LIMIT_LIMIT) {
            insert_rate_limit_headers(
                headers,
                decision.limit,
                decision.remaining,
                decision.reset_after_secs,
            );
        }

        Ok(response)
    }
}

pub async fn rate_limit(
    State(guard): State<Arc<RateLimitGuard>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    guard.check_rate_limit(req, next).await
}

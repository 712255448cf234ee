use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::coerce::CoerceError;
use crate::config::ConfigError;
use crate::generation::GenerationError;
use crate::limiter::{LimiterError, RateLimitDecision};
use crate::normalize::ValidationError;
use crate::utils::{error_to_api_response, insert_rate_limit_headers};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("too many requests, retry after {retry_after}s")]
    RateLimited {
        retry_after: u64,
        limit: u32,
        reset: u64,
    },
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("model did not return a button")]
    NoButton,
    #[error("generation timed out")]
    UpstreamTimeout,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Upstream(_) | AppError::NoButton => {
                StatusCode::BAD_REQUEST
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的简短信息，详细原因只写日志
    pub fn client_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::RateLimited { .. } => "Too many requests, please try again later".into(),
            AppError::Upstream(_) => "Generation failed".into(),
            AppError::NoButton => "Model did not return a button".into(),
            AppError::UpstreamTimeout => "Generation timed out".into(),
            AppError::Config(_) => "Server misconfigured".into(),
        }
    }

    pub fn rate_limited(decision: &RateLimitDecision) -> Self {
        AppError::RateLimited {
            retry_after: decision.retry_after.unwrap_or(1).max(1),
            limit: decision.limit,
            reset: decision.reset_after_secs,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, error_to_api_response(self.client_message())).into_response();

        if let AppError::RateLimited {
            retry_after,
            limit,
            reset,
        } = self
        {
            let headers = response.headers_mut();
            insert_rate_limit_headers(headers, limit, 0, reset);
            headers.insert("retry-after", HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<CoerceError> for AppError {
    fn from(e: CoerceError) -> Self {
        match e {
            CoerceError::NoButton => AppError::NoButton,
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout => AppError::UpstreamTimeout,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<LimiterError> for AppError {
    fn from(e: LimiterError) -> Self {
        match e {
            LimiterError::TableFull { retry_after, limit } => AppError::RateLimited {
                retry_after,
                limit,
                reset: retry_after,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NoButton.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Upstream("boom".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UpstreamTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::RateLimited {
                retry_after: 3,
                limit: 20,
                reset: 3
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn backend_timeout_maps_to_gateway_timeout() {
        let err = AppError::from(GenerationError::Timeout);
        assert!(matches!(err, AppError::UpstreamTimeout));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);

        let err = AppError::from(GenerationError::EmptyResponse);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_detail_is_not_leaked() {
        let err = AppError::Upstream("401 Unauthorized: invalid key sk-abc".into());
        assert_eq!(err.client_message(), "Generation failed");
    }

    #[test]
    fn rate_limited_response_carries_headers() {
        let response = AppError::RateLimited {
            retry_after: 4,
            limit: 60,
            reset: 9,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "4");
        assert_eq!(response.headers()["ratelimit-limit"], "60");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
    }
}

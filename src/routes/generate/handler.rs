use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::model::{GenerateResponse, RawGenerateRequest};
use crate::{
    AppState,
    coerce::coerce,
    error::AppError,
    middleware::{ClientKey, admit},
    normalize::{GenerationRequest, normalize},
    utils::insert_rate_limit_headers,
};

/// 校验 -> 限流 -> 生成 -> 清洗
#[axum::debug_handler]
pub async fn generate(
    State(state): State<AppState>,
    Extension(ClientKey(key)): Extension<ClientKey>,
    payload: Result<Json<RawGenerateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(raw)) => match normalize(&raw) {
            Ok(request) => request,
            Err(e) => return AppError::from(e).into_response(),
        },
        Err(rejection) => {
            tracing::warn!("Invalid generate payload: {}", rejection.body_text());
            return AppError::Validation("Invalid JSON body".into()).into_response();
        }
    };

    let decision = match admit(&state.generate_limiter, &key).await {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    let request_id = Uuid::new_v4();
    let mut response = match produce(&state, &request).await {
        Ok(body) => {
            tracing::info!(
                %request_id,
                key = %key,
                tokens = body.usage.as_ref().map(|u| u.total_tokens).unwrap_or_default(),
                "Generated button"
            );
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(%request_id, key = %key, "Failed to generate button: {}", e);
            e.into_response()
        }
    };

    insert_rate_limit_headers(
        response.headers_mut(),
        decision.limit,
        decision.remaining,
        decision.reset_after_secs,
    );
    response
}

async fn produce(state: &AppState, request: &GenerationRequest) -> Result<GenerateResponse, AppError> {
    let generation = tokio::time::timeout(
        state.config.generation_timeout(),
        state.generator.generate(request),
    )
    .await
    .map_err(|_| AppError::UpstreamTimeout)??;

    tracing::debug!(reasoning = %generation.output.reasoning, "Model reasoning");

    let button = coerce(
        &generation.output.html,
        &request.text,
        &state.config.affordance(),
    )?;

    Ok(GenerateResponse::new(button.to_html(), generation.usage))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    middlewares::auth::JwtClaims,
    models::{attempt::SubmitAnswerRequest, question::QuestionView},
    services::{
        question_registry::QuestionRegistry, settlement_service::SettlementService, AppState,
    },
};

/// POST /api/v1/questions/{id}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(question_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Submitting answer: question={}, user={}",
        question_id,
        claims.sub
    );

    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let service = SettlementService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.http.clone(),
        state.config.clone(),
    );

    match service.submit_answer(&question_id, &claims.sub, &req).await {
        Ok(result) => Ok((StatusCode::OK, Json(result))),
        Err(e) => {
            tracing::warn!("Submission rejected: question={}: {}", question_id, e);
            Err((e.status_code(), e.to_string()))
        }
    }
}

/// GET /api/v1/questions/{id}
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let registry = QuestionRegistry::new(state.mongo.clone());

    match registry.find(&question_id).await {
        Ok(Some(question)) => Ok((StatusCode::OK, Json(QuestionView::from(question)))),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Question not found".to_string())),
        Err(e) => {
            tracing::error!("Failed to load question {}: {:#}", question_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::judgment::JudgmentService;
use super::questions::{QuestionId, QuestionSetProvider};
use super::report::ReportSink;
use super::service::{
    CreateSessionRequest, ManualReviewDecision, ScreeningError, ScreeningService, SubmitAnswer,
};
use super::session::SessionToken;
use super::store::SessionStore;

/// Router builder exposing the candidate-facing and reviewer-facing endpoints.
pub fn screening_router<Q, S, J, N>(service: Arc<ScreeningService<Q, S, J, N>>) -> Router
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    Router::new()
        .route("/api/v1/screening/sessions", post(create_handler::<Q, S, J, N>))
        .route(
            "/api/v1/screening/sessions/:token",
            get(status_handler::<Q, S, J, N>),
        )
        .route(
            "/api/v1/screening/sessions/:token/begin",
            post(begin_handler::<Q, S, J, N>),
        )
        .route(
            "/api/v1/screening/sessions/:token/answers",
            post(answer_handler::<Q, S, J, N>),
        )
        .route(
            "/api/v1/screening/sessions/:token/questions/:question_id/review",
            post(review_handler::<Q, S, J, N>),
        )
        .with_state(service)
}

fn error_response(error: ScreeningError) -> Response {
    let status = error.status_code();
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler<Q, S, J, N>(
    State(service): State<Arc<ScreeningService<Q, S, J, N>>>,
    axum::Json(request): axum::Json<CreateSessionRequest>,
) -> Response
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    match service.create_session(request) {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<Q, S, J, N>(
    State(service): State<Arc<ScreeningService<Q, S, J, N>>>,
    Path(token): Path<String>,
) -> Response
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    match service.session_status(&SessionToken(token)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn begin_handler<Q, S, J, N>(
    State(service): State<Arc<ScreeningService<Q, S, J, N>>>,
    Path(token): Path<String>,
) -> Response
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    match service.begin(&SessionToken(token)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn answer_handler<Q, S, J, N>(
    State(service): State<Arc<ScreeningService<Q, S, J, N>>>,
    Path(token): Path<String>,
    axum::Json(submission): axum::Json<SubmitAnswer>,
) -> Response
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    match service.submit_answer(&SessionToken(token), submission).await {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler<Q, S, J, N>(
    State(service): State<Arc<ScreeningService<Q, S, J, N>>>,
    Path((token, question_id)): Path<(String, String)>,
    axum::Json(decision): axum::Json<ManualReviewDecision>,
) -> Response
where
    Q: QuestionSetProvider + 'static,
    S: SessionStore + 'static,
    J: JudgmentService + 'static,
    N: ReportSink + 'static,
{
    match service.resolve_manual_review(
        &SessionToken(token),
        &QuestionId(question_id),
        decision,
    ) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

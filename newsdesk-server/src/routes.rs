//! Route handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use newsdesk_jobs::{NewsletterPayload, SimilaritySearchPayload, TaskPayload, UserJobPayload};
use newsdesk_queue::{JobId, JobState, JobStatus, Queue};
use serde::Deserialize;
use serde_json::{Value, json};

type Accepted = (StatusCode, Json<Value>);

fn accepted(body: Value) -> Accepted {
    (StatusCode::ACCEPTED, Json(body))
}

async fn status_of(queue: &Queue, job_id: &str) -> ApiResult<JobStatus> {
    let id: JobId = job_id.parse()?;
    Ok(queue.get_status(id).await?)
}

/// Body of the searching/newsletter status endpoints.
fn progress_view(status: &JobStatus, pending: &str) -> Value {
    match status.state {
        JobState::Completed => json!({
            "state": status.state,
            "results": status
                .result
                .as_ref()
                .and_then(|r| r.get("results").or_else(|| r.get("items")))
                .cloned()
                .unwrap_or(Value::Array(Vec::new())),
        }),
        JobState::Failed => json!({
            "state": status.state,
            "error": status.failed_reason,
        }),
        JobState::Waiting | JobState::Active => json!({
            "state": status.state,
            "progress": status.progress,
            "message": pending,
        }),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "Server is running" }))
}

pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Accepted> {
    // A bare POST carries no content type; anything that claims JSON must parse.
    let data = match body {
        Ok(Json(value)) => value,
        Err(JsonRejection::MissingJsonContentType(_)) => json!({}),
        Err(rejection) => return Err(rejection.into()),
    };
    let id = state.tasks.enqueue(&TaskPayload::new(data)).await?;

    Ok(accepted(json!({
        "success": true,
        "message": "Task added to queue",
        "jobId": id,
    })))
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let status = status_of(&state.tasks, &job_id).await?;

    let mut body = json!({
        "jobId": status.job_id,
        "state": status.state,
        "progress": status.progress,
        "data": status.data,
        "result": status.result,
    });
    if let Some(reason) = &status.failed_reason {
        body["failedReason"] = json!(reason);
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    #[serde(default)]
    username: Option<String>,
}

pub async fn create_embedding(
    State(state): State<AppState>,
    body: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> ApiResult<Accepted> {
    let Json(request) = body?;
    let payload = UserJobPayload::new(request.username.unwrap_or_default())?;
    let id = state.embeddings.enqueue(&payload).await?;

    Ok(accepted(json!({
        "success": true,
        "message": "Embedding added to queue",
        "jobId": id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SimilaritySearchRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn create_similarity_search(
    State(state): State<AppState>,
    body: Result<Json<SimilaritySearchRequest>, JsonRejection>,
) -> ApiResult<Accepted> {
    let Json(request) = body?;
    let payload = SimilaritySearchPayload::new(
        request.username.unwrap_or_default(),
        request.query,
        request.limit,
    )?;
    let id = state.similarity.enqueue(&payload).await?;

    Ok(accepted(json!({ "success": true, "jobId": id })))
}

pub async fn similarity_search_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let status = status_of(&state.similarity, &job_id).await?;
    Ok(Json(progress_view(&status, "Search in progress")))
}

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

pub async fn create_newsletter(
    State(state): State<AppState>,
    body: Result<Json<NewsletterRequest>, JsonRejection>,
) -> ApiResult<Accepted> {
    let Json(request) = body?;
    let payload = NewsletterPayload::new(
        request.username.unwrap_or_default(),
        request.prompt.unwrap_or_default(),
        request.model,
    )?;
    let id = state.newsletter.enqueue(&payload).await?;

    Ok(accepted(json!({ "success": true, "jobId": id })))
}

pub async fn newsletter_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let status = status_of(&state.newsletter, &job_id).await?;
    Ok(Json(progress_view(&status, "Newsletter generation in progress")))
}


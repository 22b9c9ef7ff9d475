//! Route tests against the in-memory broker.

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use newsdesk_queue::{Broker, JobCounts, JobId, MemoryBroker, Queue, QueueName};
use newsdesk_server::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn setup() -> (MemoryBroker, axum::Router) {
    let broker = MemoryBroker::new();
    let app = router(AppState::new(Arc::new(broker.clone())));
    (broker, app)
}

async fn send(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn job_id(body: &Value) -> JobId {
    body["jobId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_, app) = setup();
    let (status, body) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "Server is running"}));
}

#[tokio::test]
async fn test_create_task_and_query_status() {
    let (_, app) = setup();

    let (status, body) = send(&app, Method::POST, "/api/task", Some(json!({"n": 1}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Task added to queue");
    assert_eq!(body["jobId"], "1");

    let (status, body) = send(&app, Method::GET, "/api/task/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobId"], "1");
    assert_eq!(body["state"], "waiting");
    assert_eq!(body["progress"], 0);
    assert_eq!(body["data"]["data"], json!({"n": 1}));
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn test_create_task_without_body() {
    let (broker, app) = setup();
    let (status, _) = send(&app, Method::POST, "/api/task", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(broker.counts("tasks").await.unwrap().waiting, 1);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (_, app) = setup();
    for uri in ["/api/task/42", "/api/task/abc", "/api/newsletter/7"] {
        let (status, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({"error": "Job not found"}));
    }
}

#[tokio::test]
async fn test_missing_username_is_rejected_before_enqueue() {
    let (broker, app) = setup();

    for (uri, queue) in [
        ("/api/embedding", QueueName::Embeddings),
        ("/api/similarity-search", QueueName::SimilaritySearch),
        ("/api/newsletter", QueueName::Newsletter),
    ] {
        for request in [json!({"username": "  "}), json!({}), json!({"query": "rust"})] {
            let (status, body) = send(&app, Method::POST, uri, Some(request.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {request}");
            assert!(body["error"].is_string());
            assert_eq!(broker.counts(queue.as_str()).await.unwrap(), JobCounts::default());
        }
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (broker, app) = setup();
    for (uri, queue) in [
        ("/api/task", QueueName::Tasks),
        ("/api/newsletter", QueueName::Newsletter),
    ] {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(broker.counts(queue.as_str()).await.unwrap().waiting, 0);
    }
}

#[tokio::test]
async fn test_closed_broker_is_service_unavailable() {
    let (broker, app) = setup();
    broker.close().await.unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/newsletter",
        Some(json!({"username": "ann", "prompt": "rust"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"error": "Queue unavailable"}));
}

#[tokio::test]
async fn test_newsletter_status_shapes() {
    let (broker, app) = setup();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/newsletter",
        Some(json!({"username": "ann", "prompt": "rust"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = job_id(&body);
    let uri = format!("/api/newsletter/{id}");

    let (_, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(body["state"], "waiting");
    assert_eq!(body["message"], "Newsletter generation in progress");

    let claimed = broker.claim("newsletter").await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    broker.update_progress("newsletter", id, 42).await.unwrap();
    let (_, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(body["state"], "active");
    assert_eq!(body["progress"], 42);

    let items = json!([{"headline": "one"}]);
    broker
        .complete("newsletter", id, json!({"username": "ann", "count": 1, "items": items}))
        .await
        .unwrap();
    let (_, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(body, json!({"state": "completed", "results": items}));
}

#[tokio::test]
async fn test_similarity_search_failed_status() {
    let (broker, app) = setup();
    let queue = Queue::named(QueueName::SimilaritySearch, Arc::new(broker.clone()));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/similarity-search",
        Some(json!({"username": "ann", "query": "rust", "limit": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = job_id(&body);
    let job = queue.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.name, "similarity-search");
    assert_eq!(job.data["limit"], 3);

    broker.claim("similarity-search").await.unwrap();
    broker
        .fail("similarity-search", id, "No embeddings stored for user: ann")
        .await
        .unwrap();

    let (_, body) = send(&app, Method::GET, &format!("/api/similarity-search/{id}"), None).await;
    assert_eq!(
        body,
        json!({"state": "failed", "error": "No embeddings stored for user: ann"})
    );
}

//! # Newsdesk Server
//!
//! Thin HTTP layer over the producers and status queries. Handlers never
//! run jobs; they validate, enqueue, and report.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/` | `{"status": "Server is running"}` |
//! | POST | `/api/task` | 202 `{success, message, jobId}` |
//! | GET | `/api/task/:jobId` | `{jobId, state, progress, data, result}` |
//! | POST | `/api/embedding` | 202 `{success, message, jobId}` |
//! | POST | `/api/similarity-search` | 202 `{success, jobId}` |
//! | GET | `/api/similarity-search/:jobId` | `{state, results}` / `{state, error}` / `{state, progress, message}` |
//! | POST | `/api/newsletter` | 202 `{success, jobId}` |
//! | GET | `/api/newsletter/:jobId` | as for similarity search |

mod error;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health))
        .route("/api/task", post(routes::create_task))
        .route("/api/task/:jobId", get(routes::task_status))
        .route("/api/embedding", post(routes::create_embedding))
        .route(
            "/api/similarity-search",
            post(routes::create_similarity_search),
        )
        .route(
            "/api/similarity-search/:jobId",
            get(routes::similarity_search_status),
        )
        .route("/api/newsletter", post(routes::create_newsletter))
        .route("/api/newsletter/:jobId", get(routes::newsletter_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then finish in-flight requests.
pub async fn serve<S>(listener: TcpListener, state: AppState, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Server running");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

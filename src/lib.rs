// Newsdesk - Redis-backed job queue with newsletter, embedding and search workers
//
// This crate re-exports the workspace crates under one name. The `newsdesk`
// binary runs either the HTTP server or the worker processes.

pub use newsdesk_config as config;
pub use newsdesk_generation as generation;
pub use newsdesk_jobs as jobs;
pub use newsdesk_log as log;
pub use newsdesk_queue as queue;
pub use newsdesk_redis as redis;
pub use newsdesk_server as server;
pub use newsdesk_store as store;

/// Commonly used types.
pub mod prelude {
    pub use newsdesk_config::AppConfig;
    pub use newsdesk_jobs::{
        JobContext, NewsletterPayload, SimilaritySearchPayload, TaskPayload, UserJobPayload,
        build_workers,
    };
    pub use newsdesk_queue::prelude::*;
    pub use newsdesk_server::AppState;
    pub use newsdesk_store::UserStore;
}

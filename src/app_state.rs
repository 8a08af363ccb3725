use sqlx::PgPool;
use std::sync::Arc;

use crate::config::PollSettings;
use crate::services::{
    bitstudio::BitstudioClient, media::MediaClient, queue::TaskQueue, storage::StorageClient,
};

/// Shared application state passed to route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<StorageClient>,
    pub queue: Arc<TaskQueue>,
    pub bitstudio: Arc<BitstudioClient>,
    pub media: Arc<MediaClient>,
    /// Plain client for fetching vendor-hosted result assets.
    pub http: reqwest::Client,
    pub polling: PollSettings,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: StorageClient,
        queue: TaskQueue,
        bitstudio: BitstudioClient,
        media: MediaClient,
        polling: PollSettings,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            bitstudio: Arc::new(bitstudio),
            media: Arc::new(media),
            http: reqwest::Client::new(),
            polling,
        }
    }
}

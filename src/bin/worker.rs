use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use vto_fitting::app_state::AppState;
use vto_fitting::config::AppConfig;
use vto_fitting::db::{self, queries};
use vto_fitting::models::task::TaskEnvelope;
use vto_fitting::services::{
    bitstudio::BitstudioClient, media::MediaClient, queue::TaskQueue, storage::StorageClient,
    tasks,
};

/// Transient-failure re-enqueues per envelope.
const MAX_TASK_ATTEMPTS: i32 = 3;
/// Fixed delay before a transient retry is re-enqueued.
const RETRY_DELAY_SECS: u64 = 5;
/// Idle sleep when the queue is empty.
const IDLE_POLL_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting fitting worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = StorageClient::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
        &config.cdn_domain,
    )
    .expect("Failed to initialize storage client");

    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    let bitstudio = BitstudioClient::new(&config.bitstudio_base_url, &config.bitstudio_api_key)
        .expect("Failed to initialize Bitstudio client");

    let media = MediaClient::new(&config.media_base_url, &config.media_api_key)
        .expect("Failed to initialize media client");

    let polling = config.poll_settings();
    let state = AppState::new(db_pool, storage, queue, bitstudio, media, polling);

    tracing::info!("Worker ready, starting task processing loop");

    // Main processing loop. Poll sleeps inside tasks occupy this worker for
    // their duration; concurrency is worker-process count, not in-process.
    loop {
        match process_next_task(&state).await {
            Ok(true) => {
                tracing::debug!("Task processed, checking for next task");
            }
            Ok(false) => {
                tracing::trace!("No tasks available, sleeping");
                sleep(Duration::from_millis(IDLE_POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing task, will retry");
                sleep(Duration::from_millis(IDLE_POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next task envelope from the queue.
/// Returns Ok(true) if an envelope was processed, Ok(false) if none available.
async fn process_next_task(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let envelope = match state.queue.dequeue().await? {
        Some(e) => e,
        None => return Ok(false),
    };

    metrics::counter!("fitting_tasks_total").increment(1);
    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("fitting_queue_depth").set(depth as f64);
    }

    tracing::info!(
        task_id = %envelope.task_id,
        user_id = %envelope.user_id,
        attempt = envelope.attempt,
        step = ?envelope.step,
        "Processing task"
    );

    match tasks::execute_step(state, &envelope).await {
        Ok(output) => {
            tracing::info!(
                task_id = %envelope.task_id,
                produced = output.is_some(),
                "Task completed"
            );
            if output.is_none() {
                metrics::counter!("fitting_tasks_failed").increment(1);
            }
            finish_task(state, &envelope, output).await?;
            state.queue.complete(&envelope).await?;
            Ok(true)
        }
        Err(e) if e.is_transient() && envelope.attempt + 1 < MAX_TASK_ATTEMPTS => {
            tracing::warn!(
                task_id = %envelope.task_id,
                attempt = envelope.attempt,
                error = %e,
                "Transient task failure, re-enqueueing"
            );
            sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
            state.queue.enqueue(&envelope.retried()).await?;
            state.queue.complete(&envelope).await?;
            Ok(true)
        }
        Err(e) => {
            // Retries exhausted or permanent failure: the step resolves to
            // the sentinel and the chain continues, short-circuiting through
            // its remaining steps.
            tracing::error!(
                task_id = %envelope.task_id,
                attempt = envelope.attempt,
                error = %e,
                "Task failed, propagating failure sentinel"
            );
            metrics::counter!("fitting_tasks_failed").increment(1);
            tasks::abandon_step(state, &envelope).await?;
            finish_task(state, &envelope, None).await?;
            state.queue.complete(&envelope).await?;
            Ok(true)
        }
    }
}

/// Route a finished step's output: enqueue the chain's successor, or perform
/// terminal bookkeeping (chord result slot, fan-out group countdown).
async fn finish_task(
    state: &AppState,
    envelope: &TaskEnvelope,
    output: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(next) = envelope.advance(output.clone()) {
        state.queue.enqueue(&next).await?;
        return Ok(());
    }

    if let Some(slot) = envelope.chord {
        state
            .queue
            .store_chord_result(slot.chord_id, slot.index, &output)
            .await?;
    }

    if let Some(group_id) = envelope.group_id {
        let remaining = state.queue.finish_group_chain(group_id).await?;
        tracing::debug!(
            group_id = %group_id,
            remaining,
            "fan-out chain finished"
        );
        if remaining <= 0 {
            // Last chain of the group: release the per-user guard.
            queries::clear_fitting_flag(&state.db, envelope.user_id).await?;
            tracing::info!(
                group_id = %group_id,
                user_id = %envelope.user_id,
                "catalog fan-out complete, guard flag cleared"
            );
        }
    }

    Ok(())
}

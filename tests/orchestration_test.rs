use uuid::Uuid;

use vto_fitting::app_state::AppState;
use vto_fitting::config::{AppConfig, PollSettings};
use vto_fitting::db::{self, queries};
use vto_fitting::models::fitting::FittingStatus;
use vto_fitting::models::task::{ChordSlot, TaskEnvelope, TaskStep};
use vto_fitting::services::bitstudio::BitstudioClient;
use vto_fitting::services::media::MediaClient;
use vto_fitting::services::queue::TaskQueue;
use vto_fitting::services::storage::StorageClient;
use vto_fitting::services::tasks;

/// Integration tests for the orchestration substrate.
///
/// These require a running PostgreSQL and Redis instance configured via
/// environment variables (same variables as the binaries).
/// Run with: cargo test --test orchestration_test -- --ignored

async fn test_pool() -> sqlx::PgPool {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

async fn seed_user(pool: &sqlx::PgPool) -> Uuid {
    let row: (Uuid,) = sqlx::query_as("INSERT INTO user_account DEFAULT VALUES RETURNING id")
        .fetch_one(pool)
        .await
        .expect("Failed to seed user");
    row.0
}

async fn seed_product(pool: &sqlx::PgPool, name: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO product (name, image_url) VALUES ($1, 'https://cdn.test/p.jpg') RETURNING id",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("Failed to seed product");
    row.0
}

#[tokio::test]
#[ignore]
async fn test_result_sink_upsert_is_idempotent() {
    let pool = test_pool().await;
    let user_id = seed_user(&pool).await;
    let product_id = seed_product(&pool, "upsert-product").await;

    // Two deliveries of the sink for the same (user, product) with different
    // assets must leave exactly one row holding the second URL.
    let first = queries::upsert_fitting_image(&pool, user_id, product_id, "https://cdn.test/a.jpg")
        .await
        .expect("first upsert failed");
    let second =
        queries::upsert_fitting_image(&pool, user_id, product_id, "https://cdn.test/b.jpg")
            .await
            .expect("second upsert failed");

    assert_eq!(first.id, second.id);
    assert_eq!(second.image_url.as_deref(), Some("https://cdn.test/b.jpg"));
    assert_eq!(second.status, FittingStatus::Completed);

    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM fitting_result WHERE user_id = $1 AND product_id = $2 AND NOT is_deleted",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(&pool)
    .await
    .expect("count failed");
    assert_eq!(count.0, 1);
}

#[tokio::test]
#[ignore]
async fn test_guard_flag_rejects_second_fanout() {
    let pool = test_pool().await;
    let user_id = seed_user(&pool).await;

    assert!(queries::try_begin_fitting(&pool, user_id).await.unwrap());
    // Second claim must lose the compare-and-set.
    assert!(!queries::try_begin_fitting(&pool, user_id).await.unwrap());

    queries::clear_fitting_flag(&pool, user_id).await.unwrap();
    assert!(queries::try_begin_fitting(&pool, user_id).await.unwrap());
    queries::clear_fitting_flag(&pool, user_id).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_queue_round_trip_preserves_envelope() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let envelope = TaskEnvelope::new(
        Uuid::new_v4(),
        TaskStep::GenerateByUrl {
            person_url: "https://cdn.test/person.jpg".into(),
            outfit_url: "https://cdn.test/outfit.jpg".into(),
            prompt: "studio shot".into(),
        },
        vec![TaskStep::Persist { product_id: 42 }],
    );

    queue.enqueue(&envelope).await.expect("enqueue failed");

    // Drain until our envelope comes back; other tests may share the queue.
    let mut found = None;
    for _ in 0..100 {
        match queue.dequeue().await.expect("dequeue failed") {
            Some(e) if e.task_id == envelope.task_id => {
                found = Some(e);
                break;
            }
            Some(other) => queue.complete(&other).await.expect("complete failed"),
            None => break,
        }
    }

    let dequeued = found.expect("enqueued envelope not found");
    assert_eq!(dequeued, envelope);
    queue.complete(&dequeued).await.expect("complete failed");
}

#[tokio::test]
#[ignore]
async fn test_chord_results_collect_in_submission_order() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");
    let chord_id = Uuid::new_v4();

    // Report out of completion order.
    queue
        .store_chord_result(chord_id, 1, &None)
        .await
        .expect("store failed");
    queue
        .store_chord_result(chord_id, 0, &Some("url_a".into()))
        .await
        .expect("store failed");

    assert_eq!(queue.chord_size(chord_id).await.unwrap(), 2);
    let results = queue.read_chord_results(chord_id).await.unwrap();
    assert_eq!(results.get(&0), Some(&Some("url_a".to_string())));
    assert_eq!(results.get(&1), Some(&None));
}

#[tokio::test]
#[ignore]
async fn test_group_counter_counts_down_to_zero() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");
    let group_id = Uuid::new_v4();

    queue.init_group(group_id, 3).await.expect("init failed");
    assert_eq!(queue.finish_group_chain(group_id).await.unwrap(), 2);
    assert_eq!(queue.finish_group_chain(group_id).await.unwrap(), 1);
    assert_eq!(queue.finish_group_chain(group_id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_fanout_partial_failure_leaves_other_rows_intact() {
    let pool = test_pool().await;
    let user_id = seed_user(&pool).await;
    let p1 = seed_product(&pool, "fanout-1").await;
    let p2 = seed_product(&pool, "fanout-2").await;
    let p3 = seed_product(&pool, "fanout-3").await;

    // Chains 1 and 3 reach their sink; chain 2's generation exhausted its
    // retries, so its sink short-circuited and wrote nothing.
    queries::upsert_fitting_image(&pool, user_id, p1, "https://cdn.test/1.jpg")
        .await
        .expect("sink 1 failed");
    queries::upsert_fitting_image(&pool, user_id, p3, "https://cdn.test/3.jpg")
        .await
        .expect("sink 3 failed");

    let r1 = queries::get_fitting_result(&pool, user_id, p1).await.unwrap();
    let r2 = queries::get_fitting_result(&pool, user_id, p2).await.unwrap();
    let r3 = queries::get_fitting_result(&pool, user_id, p3).await.unwrap();

    assert!(r1.is_some_and(|r| r.image_url.is_some()));
    assert!(r2.is_none());
    assert!(r3.is_some_and(|r| r.image_url.is_some()));
}

/// Real database, unreachable vendors: enough state for steps whose
/// bookkeeping only touches PostgreSQL.
fn offline_state(pool: sqlx::PgPool) -> AppState {
    let storage = StorageClient::new(
        "bucket",
        "auto",
        "http://127.0.0.1:1",
        "key",
        "secret",
        "https://cdn.test",
    )
    .expect("Failed to build storage client");
    let queue = TaskQueue::new("redis://127.0.0.1:1/").expect("Failed to build queue");
    let bitstudio =
        BitstudioClient::new("http://127.0.0.1:1", "key").expect("Failed to build client");
    let media = MediaClient::new("http://127.0.0.1:1", "key").expect("Failed to build client");
    AppState::new(
        pool,
        storage,
        queue,
        bitstudio,
        media,
        PollSettings {
            tryon_interval_secs: 0,
            tryon_attempts: 1,
            fanout_attempts: 1,
            video_interval_secs: 0,
            video_attempts: 1,
            chord_collect_timeout_secs: 1,
        },
    )
}

#[tokio::test]
#[ignore]
async fn test_abandoned_video_poll_fails_the_row() {
    let pool = test_pool().await;
    let user_id = seed_user(&pool).await;
    let product_id = seed_product(&pool, "video-abandon").await;

    queries::upsert_fitting_image(&pool, user_id, product_id, "https://cdn.test/va.jpg")
        .await
        .expect("sink failed");
    assert!(
        queries::mark_video_processing(&pool, user_id, product_id, "vid_token_dead")
            .await
            .unwrap()
    );

    // A video poll whose retries are exhausted must still terminate the row;
    // `processing` would otherwise block every re-trigger.
    let state = offline_state(pool.clone());
    let envelope = TaskEnvelope::new(
        user_id,
        TaskStep::VideoPoll {
            product_id,
            job_handle: "vid_token_dead".into(),
        },
        vec![],
    );
    tasks::abandon_step(&state, &envelope).await.unwrap();

    let row = queries::get_fitting_result(&pool, user_id, product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, FittingStatus::Failed);

    // The leg is re-triggerable again.
    assert!(
        queries::mark_video_processing(&pool, user_id, product_id, "vid_token_retry")
            .await
            .unwrap()
    );
}

#[tokio::test]
#[ignore]
async fn test_video_leg_state_machine() {
    let pool = test_pool().await;
    let user_id = seed_user(&pool).await;
    let product_id = seed_product(&pool, "video-product").await;

    queries::upsert_fitting_image(&pool, user_id, product_id, "https://cdn.test/v.jpg")
        .await
        .expect("sink failed");

    assert!(
        queries::mark_video_processing(&pool, user_id, product_id, "vid_token_1")
            .await
            .unwrap()
    );
    let row = queries::get_fitting_result(&pool, user_id, product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, FittingStatus::Processing);
    assert_eq!(row.video_job_id.as_deref(), Some("vid_token_1"));

    queries::complete_video(&pool, user_id, product_id, "https://cdn.test/v.mp4")
        .await
        .unwrap();
    let row = queries::get_fitting_result(&pool, user_id, product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, FittingStatus::Completed);
    assert_eq!(row.video_url.as_deref(), Some("https://cdn.test/v.mp4"));
}

#[test]
fn test_envelope_chord_slot_serializes_for_queue() {
    // The queue's lrem-based completion depends on stable serialization.
    let envelope = TaskEnvelope::new(
        Uuid::new_v4(),
        TaskStep::GenerateById {
            person_image_id: "p".into(),
            outfit_image_id: "o".into(),
            prompt: "x".into(),
        },
        vec![],
    )
    .with_chord(ChordSlot {
        chord_id: Uuid::new_v4(),
        index: 3,
    });

    let a = serde_json::to_string(&envelope).unwrap();
    let b = serde_json::to_string(&envelope).unwrap();
    assert_eq!(a, b);
}

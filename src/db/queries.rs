use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::fitting::{FittingResult, FittingStatus, ProductRef};

fn row_to_fitting(row: &sqlx::postgres::PgRow) -> Result<FittingResult, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = FittingStatus::from_str(&status_str).unwrap_or(FittingStatus::Pending);

    Ok(FittingResult {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        image_url: row.try_get("image_url")?,
        video_url: row.try_get("video_url")?,
        status,
        video_job_id: row.try_get("video_job_id")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Upsert the image result for a (user, product) pair. An existing live row's
/// image field is overwritten, never duplicated; safe under at-least-once
/// task delivery.
pub async fn upsert_fitting_image(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
    image_url: &str,
) -> Result<FittingResult, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO fitting_result (user_id, product_id, image_url, status)
        VALUES ($1, $2, $3, 'completed')
        ON CONFLICT (user_id, product_id) WHERE NOT is_deleted
        DO UPDATE SET image_url = EXCLUDED.image_url,
                      status = 'completed',
                      updated_at = NOW()
        RETURNING id, user_id, product_id, image_url, video_url, status,
                  video_job_id, is_deleted, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(image_url)
    .fetch_one(pool)
    .await?;

    row_to_fitting(&row)
}

/// Read the live fitting row for a (user, product) pair.
pub async fn get_fitting_result(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
) -> Result<Option<FittingResult>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, product_id, image_url, video_url, status,
               video_job_id, is_deleted, created_at, updated_at
        FROM fitting_result
        WHERE user_id = $1 AND product_id = $2 AND NOT is_deleted
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_fitting).transpose()
}

/// Move a fitting row to `processing` when the vendor accepts its video job.
pub async fn mark_video_processing(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
    video_job_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE fitting_result
        SET status = 'processing', video_job_id = $3, updated_at = NOW()
        WHERE user_id = $1 AND product_id = $2 AND NOT is_deleted
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(video_job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Terminal video-leg transition: persist the URL and complete the row.
pub async fn complete_video(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
    video_url: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE fitting_result
        SET status = 'completed', video_url = $3, updated_at = NOW()
        WHERE user_id = $1 AND product_id = $2 AND NOT is_deleted
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(video_url)
    .execute(pool)
    .await?;

    Ok(())
}

/// Terminal video-leg transition: mark failed. No automatic retry; the user
/// re-triggers.
pub async fn fail_video(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE fitting_result
        SET status = 'failed', updated_at = NOW()
        WHERE user_id = $1 AND product_id = $2 AND NOT is_deleted
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically claim the per-user fan-out guard. Returns false when the flag
/// was already set (a fan-out is in progress) — the compare-and-set is the
/// UPDATE's WHERE clause, no application lock involved.
pub async fn try_begin_fitting(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE user_account
        SET fitting_in_progress = TRUE, updated_at = NOW()
        WHERE id = $1 AND NOT fitting_in_progress
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear the per-user fan-out guard (last chain of a group finished).
pub async fn clear_fitting_flag(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE user_account
        SET fitting_in_progress = FALSE, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn user_exists(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM user_account WHERE id = $1) AS present")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    row.try_get("present")
}

/// Record an uploaded source photo.
pub async fn insert_user_image(
    pool: &PgPool,
    user_id: Uuid,
    image_url: &str,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO user_image (user_id, image_url)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(image_url)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Most recent uploaded photo for a user — the person input of catalog
/// fan-out chains.
pub async fn latest_user_image(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT image_url
        FROM user_image
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_get("image_url")).transpose()
}

/// Every live product, in id order — one fan-out chain per row.
pub async fn list_active_products(pool: &PgPool) -> Result<Vec<ProductRef>, sqlx::Error> {
    sqlx::query_as::<_, ProductRef>(
        r#"
        SELECT id, image_url
        FROM product
        WHERE NOT is_deleted
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a fitting result. Only the video leg moves a row through
/// `processing`; image-only results go straight to `completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FittingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One durable try-on output per (user, product) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittingResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: i64,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub status: FittingStatus,
    pub video_job_id: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a catalog product the fan-out composer needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRef {
    pub id: i64,
    pub image_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(FittingStatus::Processing.to_string(), "processing");
        assert_eq!(
            FittingStatus::from_str("completed").unwrap(),
            FittingStatus::Completed
        );
        assert!(FittingStatus::from_str("bogus").is_err());
    }
}

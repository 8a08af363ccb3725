use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata fields of the one-shot try-on request (multipart text parts).
#[derive(Debug, Deserialize, Validate)]
pub struct OneShotRequest {
    #[garde(skip)]
    pub user_id: Uuid,

    #[garde(length(min = 1, max = 20))]
    pub category: String,

    #[garde(length(min = 1, max = 20))]
    pub detail: String,

    #[garde(length(min = 1, max = 20))]
    pub fit: String,

    #[garde(length(min = 1, max = 20))]
    pub length: String,
}

/// One position of a chord result list.
#[derive(Debug, Serialize)]
pub struct VariantResult {
    pub index: usize,
    pub image_url: Option<String>,
}

/// Response of the interactive one-shot try-on.
#[derive(Debug, Serialize)]
pub struct OneShotResponse {
    pub success: bool,
    pub results: Vec<VariantResult>,
    pub failed_indices: Vec<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CatalogFanoutRequest {
    #[garde(skip)]
    pub user_id: Uuid,
}

/// Response of a fire-and-forget catalog fan-out submission.
#[derive(Debug, Serialize)]
pub struct CatalogFanoutResponse {
    pub group_id: Uuid,
    pub item_count: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BackgroundEditRequest {
    #[garde(length(min = 8, max = 500))]
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct BackgroundEditResponse {
    pub image_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VideoGenerateRequest {
    #[garde(skip)]
    pub user_id: Uuid,
}

/// Status read path for a (user, product) fitting.
#[derive(Debug, Serialize)]
pub struct FittingStatusResponse {
    pub product_id: i64,
    pub status: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Error body shared by all routes.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
        }
    }
}

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::services::bitstudio::VendorError;
use crate::services::poller::RawStatus;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct VideoStatusResponse {
    status: Option<String>,
    video_url: Option<String>,
}

/// Client for the media vendor: synchronous background removal and the
/// long-running video-synthesis leg.
pub struct MediaClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl MediaClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, VendorError> {
        let http = Client::builder().build().map_err(VendorError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Replace the background of a hosted image with a flat color. The vendor
    /// answers synchronously with the edited image bytes — no job handle.
    pub async fn remove_background(
        &self,
        image_url: &str,
        bg_color: &str,
    ) -> Result<Vec<u8>, VendorError> {
        let form = reqwest::multipart::Form::new()
            .text("image_url", image_url.to_string())
            .text("bg_color", bg_color.to_string());

        let response = self
            .http
            .post(format!("{}/remove-background", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        let bytes = response.bytes().await.map_err(VendorError::Http)?;
        if bytes.is_empty() {
            return Err(VendorError::Shape("empty background-removal body".into()));
        }
        Ok(bytes.to_vec())
    }

    /// Submit a video-synthesis job for a hosted image. The vendor answers
    /// with a bare job token; completion is observed via [`check_video`].
    ///
    /// [`check_video`]: MediaClient::check_video
    pub async fn start_video(&self, image_url: &str) -> Result<String, VendorError> {
        let form = reqwest::multipart::Form::new()
            .text("image_url", image_url.to_string())
            .text("mode", "turntable".to_string());

        let response = self
            .http
            .post(format!("{}/videos", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        let token = response.text().await.map_err(VendorError::Http)?;
        let token = token.trim().trim_matches('"').to_string();
        if token.is_empty() {
            return Err(VendorError::Shape("empty video job token".into()));
        }
        Ok(token)
    }

    /// Check a video job. Malformed bodies normalize to `Failed`.
    pub async fn check_video(&self, handle: &str) -> Result<RawStatus, VendorError> {
        let response = self
            .http
            .get(format!("{}/videos/{}", self.base_url, handle))
            .header("X-Api-Key", &self.api_key)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        match response.json::<VideoStatusResponse>().await {
            Ok(status) => Ok(normalize_video_status(&status)),
            Err(e) => {
                tracing::warn!(handle, error = %e, "unparseable video status, treating as failed");
                Ok(RawStatus::Failed)
            }
        }
    }
}

fn normalize_video_status(response: &VideoStatusResponse) -> RawStatus {
    match response.status.as_deref() {
        Some("completed") => match &response.video_url {
            Some(url) => RawStatus::Completed(url.clone()),
            None => RawStatus::Failed,
        },
        Some("failed") => RawStatus::Failed,
        Some(_) => RawStatus::Pending,
        None => RawStatus::Failed,
    }
}

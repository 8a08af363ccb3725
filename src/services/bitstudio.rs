use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::services::poller::RawStatus;

/// Request timeout for job-starting calls.
const START_TIMEOUT: Duration = Duration::from_secs(30);
/// Request timeout for status checks.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs for a try-on generation job. Interactive requests upload files to
/// the vendor first and pass ids; catalog fan-out passes hosted URLs directly.
#[derive(Debug, Clone)]
pub enum TryOnInputs {
    ById {
        person_image_id: String,
        outfit_image_id: String,
    },
    ByUrl {
        person_url: String,
        outfit_url: String,
    },
}

/// How a submitted edit's completion is observed. The vendor reports either
/// a `source_image_id` redirect (poll that image directly) or a versioned
/// sub-resource of the edit job.
#[derive(Debug, Clone, PartialEq)]
pub enum EditSubmission {
    Redirect { source_image_id: String },
    Version { edit_id: String, version_id: String },
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct StartedJob {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ImageStatusResponse {
    status: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    id: String,
    #[serde(default)]
    versions: Vec<EditVersion>,
}

#[derive(Debug, Deserialize)]
struct EditVersion {
    id: String,
    #[allow(dead_code)]
    version_type: Option<String>,
    source_image_id: Option<String>,
}

/// Client for the Bitstudio try-on and image-edit endpoints.
///
/// Stateless beyond the HTTP connection pool; every method is one outbound
/// call. Non-2xx start responses are hard errors here — retrying the whole
/// start+poll cycle is the task layer's job.
pub struct BitstudioClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl BitstudioClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, VendorError> {
        let http = Client::builder()
            .build()
            .map_err(VendorError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Upload raw image bytes to the vendor; returns the vendor image id.
    pub async fn upload_image(&self, bytes: Vec<u8>, kind: &str) -> Result<String, VendorError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name("upload.jpg");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("type", kind.to_string());

        let response = self
            .http
            .post(format!("{}/images", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(START_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        let uploaded: UploadResponse = response.json().await.map_err(VendorError::Http)?;
        Ok(uploaded.id)
    }

    /// Start a try-on generation job; returns the vendor job handle.
    pub async fn start_try_on(
        &self,
        inputs: &TryOnInputs,
        prompt: &str,
    ) -> Result<String, VendorError> {
        let mut body = serde_json::json!({
            "prompt": prompt,
            "resolution": "standard",
            "num_images": 1,
            "style": "studio",
        });
        match inputs {
            TryOnInputs::ById {
                person_image_id,
                outfit_image_id,
            } => {
                body["person_image_id"] = person_image_id.clone().into();
                body["outfit_image_id"] = outfit_image_id.clone().into();
            }
            TryOnInputs::ByUrl {
                person_url,
                outfit_url,
            } => {
                body["person_image_url"] = person_url.clone().into();
                body["outfit_image_url"] = outfit_url.clone().into();
            }
        }

        let response = self
            .http
            .post(format!("{}/images/virtual-try-on", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(START_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        let jobs: Vec<StartedJob> = response.json().await.map_err(VendorError::Http)?;
        jobs.into_iter()
            .next()
            .map(|j| j.id)
            .ok_or_else(|| VendorError::Shape("try-on response contained no job".into()))
    }

    /// Check a generation job. Malformed responses normalize to `Failed`.
    pub async fn check_image(&self, handle: &str) -> Result<RawStatus, VendorError> {
        let response = self
            .http
            .get(format!("{}/images/{}", self.base_url, handle))
            .bearer_auth(&self.api_key)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        match response.json::<ImageStatusResponse>().await {
            Ok(status) => Ok(normalize_image_status(&status)),
            Err(e) => {
                tracing::warn!(handle, error = %e, "unparseable status body, treating as failed");
                Ok(RawStatus::Failed)
            }
        }
    }

    /// Submit a background-edit of a hosted image; returns how its
    /// completion is observed (redirect or versioned sub-resource).
    pub async fn start_edit(
        &self,
        image_url: &str,
        prompt: &str,
    ) -> Result<EditSubmission, VendorError> {
        let response = self
            .http
            .post(format!("{}/images/edit", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "image_url": image_url,
                "prompt": prompt,
                "num_images": 1,
            }))
            .timeout(START_TIMEOUT)
            .send()
            .await
            .map_err(VendorError::Http)?
            .error_for_status()
            .map_err(VendorError::Http)?;

        let edit: EditResponse = response.json().await.map_err(VendorError::Http)?;
        resolve_edit_submission(edit)
    }

    /// Check an edit job, resolving the redirect indirection transparently.
    pub async fn check_edit(&self, submission: &EditSubmission) -> Result<RawStatus, VendorError> {
        match submission {
            EditSubmission::Redirect { source_image_id } => {
                self.check_image(source_image_id).await
            }
            EditSubmission::Version {
                edit_id,
                version_id,
            } => {
                let response = self
                    .http
                    .get(format!(
                        "{}/images/edits/{}/versions/{}",
                        self.base_url, edit_id, version_id
                    ))
                    .bearer_auth(&self.api_key)
                    .timeout(CHECK_TIMEOUT)
                    .send()
                    .await
                    .map_err(VendorError::Http)?
                    .error_for_status()
                    .map_err(VendorError::Http)?;

                match response.json::<ImageStatusResponse>().await {
                    Ok(status) => Ok(normalize_image_status(&status)),
                    Err(e) => {
                        tracing::warn!(version_id, error = %e, "unparseable version body, treating as failed");
                        Ok(RawStatus::Failed)
                    }
                }
            }
        }
    }
}

/// Normalize the vendor's `{status, path}` shape. A completed job without a
/// path is malformed and counts as failed; unknown in-flight statuses
/// (queued, processing, ...) count as pending.
fn normalize_image_status(response: &ImageStatusResponse) -> RawStatus {
    match response.status.as_deref() {
        Some("completed") => match &response.path {
            Some(path) => RawStatus::Completed(path.clone()),
            None => RawStatus::Failed,
        },
        Some("failed") => RawStatus::Failed,
        Some(_) => RawStatus::Pending,
        None => RawStatus::Failed,
    }
}

/// Pick the poll target out of an edit submission response. A version that
/// names a `source_image_id` redirects polling to that image; otherwise the
/// version itself is the poll target.
fn resolve_edit_submission(edit: EditResponse) -> Result<EditSubmission, VendorError> {
    let EditResponse { id: edit_id, versions } = edit;
    let first = versions
        .into_iter()
        .next()
        .ok_or_else(|| VendorError::Shape("edit response contained no versions".into()))?;

    Ok(match first.source_image_id {
        Some(source_image_id) => EditSubmission::Redirect { source_image_id },
        None => EditSubmission::Version {
            edit_id,
            version_id: first.id,
        },
    })
}

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected vendor response shape: {0}")]
    Shape(String),
}

impl VendorError {
    /// Network failures and vendor 5xx are worth retrying; everything else
    /// (4xx, bad shapes) will not get better on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            VendorError::Http(e) => match e.status() {
                Some(status) => status.is_server_error(),
                None => true,
            },
            VendorError::Shape(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: Option<&str>, path: Option<&str>) -> ImageStatusResponse {
        ImageStatusResponse {
            status: status.map(String::from),
            path: path.map(String::from),
        }
    }

    #[test]
    fn test_completed_with_path() {
        assert_eq!(
            normalize_image_status(&status(Some("completed"), Some("out/a.jpg"))),
            RawStatus::Completed("out/a.jpg".into())
        );
    }

    #[test]
    fn test_completed_without_path_is_failed() {
        assert_eq!(
            normalize_image_status(&status(Some("completed"), None)),
            RawStatus::Failed
        );
    }

    #[test]
    fn test_missing_status_is_failed() {
        assert_eq!(normalize_image_status(&status(None, None)), RawStatus::Failed);
    }

    #[test]
    fn test_in_flight_statuses_are_pending() {
        for s in ["pending", "queued", "processing"] {
            assert_eq!(
                normalize_image_status(&status(Some(s), None)),
                RawStatus::Pending
            );
        }
    }

    #[test]
    fn test_edit_redirect_resolution() {
        let edit: EditResponse = serde_json::from_str(
            r#"{"id": "e1", "versions": [{"id": "v1", "version_type": "edit", "source_image_id": "img_9"}]}"#,
        )
        .unwrap();
        assert_eq!(
            resolve_edit_submission(edit).unwrap(),
            EditSubmission::Redirect {
                source_image_id: "img_9".into()
            }
        );
    }

    #[test]
    fn test_edit_version_resolution() {
        let edit: EditResponse = serde_json::from_str(
            r#"{"id": "e2", "versions": [{"id": "v7", "version_type": "edit"}]}"#,
        )
        .unwrap();
        assert_eq!(
            resolve_edit_submission(edit).unwrap(),
            EditSubmission::Version {
                edit_id: "e2".into(),
                version_id: "v7".into()
            }
        );
    }

    #[test]
    fn test_edit_without_versions_is_shape_error() {
        let edit: EditResponse = serde_json::from_str(r#"{"id": "e3", "versions": []}"#).unwrap();
        assert!(matches!(
            resolve_edit_submission(edit),
            Err(VendorError::Shape(_))
        ));
    }

    #[test]
    fn test_shape_error_is_not_transient() {
        assert!(!VendorError::Shape("x".into()).is_transient());
    }
}

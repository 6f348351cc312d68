use crate::config::GeminiConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the hosted video-analysis service
#[derive(Debug, Error)]
pub enum GeminiError {
    /// The uploaded video never left the processing state within the poll budget
    #[error("remote processing timeout after {attempts} polls")]
    ProcessingTimeout { attempts: u32 },

    /// The service reported that it could not process the uploaded video
    #[error("remote processing failed for {name}")]
    ProcessingFailed { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Processing state of a file uploaded to the hosted service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// Handle to a video uploaded to the hosted service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub name: String,
    pub uri: String,
    pub state: FileState,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileHandle,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

/// Content part (file reference or text)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

/// Client for the hosted model's file and generation APIs
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a new client from configuration.
    ///
    /// Fails when no API key is configured or HTTP client creation fails.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("GEMINI_API_KEY not configured")?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Upload a local video and receive a handle to the remote file
    pub async fn upload_video(&self, path: &Path) -> Result<FileHandle> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read video at {}", path.display()))?;

        info!(size_bytes = bytes.len(), "uploading video for analysis");

        let response = self
            .http_client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await
            .context("failed to send file upload request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read file upload response")?;

        if !status.is_success() {
            anyhow::bail!("file upload failed with status {status}: {body}");
        }

        let upload: UploadResponse =
            serde_json::from_str(&body).context("failed to parse file upload response")?;

        debug!(name = %upload.file.name, state = ?upload.file.state, "video uploaded");

        Ok(upload.file)
    }

    /// Fetch the current state of an uploaded file
    pub async fn get_file(&self, name: &str) -> Result<FileHandle> {
        let response = self
            .http_client
            .get(format!("{}/v1beta/{}", self.base_url, name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("failed to send file status request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read file status response")?;

        if !status.is_success() {
            anyhow::bail!("file status request failed with status {status}: {body}");
        }

        serde_json::from_str(&body).context("failed to parse file status response")
    }

    /// Wait for an uploaded file to become ready for analysis.
    ///
    /// The wait is bounded: after `max_attempts` polls at `interval` the
    /// upload is considered stuck and a distinct timeout error is returned.
    pub async fn poll_until_active(
        &self,
        mut handle: FileHandle,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<FileHandle, GeminiError> {
        for attempt in 1..=max_attempts {
            match handle.state {
                FileState::Active => return Ok(handle),
                FileState::Failed => {
                    return Err(GeminiError::ProcessingFailed { name: handle.name })
                }
                _ => {}
            }

            debug!(
                name = %handle.name,
                state = ?handle.state,
                attempt,
                "waiting for remote file to become ready"
            );

            tokio::time::sleep(interval).await;
            handle = self.get_file(&handle.name).await?;
        }

        match handle.state {
            FileState::Active => Ok(handle),
            FileState::Failed => Err(GeminiError::ProcessingFailed { name: handle.name }),
            _ => Err(GeminiError::ProcessingTimeout {
                attempts: max_attempts,
            }),
        }
    }

    /// Ask the model one question about an uploaded video, returning its text answer
    pub async fn generate_video_query(&self, file_uri: &str, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        file_data: Some(FileData {
                            file_uri: file_uri.to_string(),
                            mime_type: "video/mp4".to_string(),
                        }),
                        text: None,
                    },
                    Part {
                        file_data: None,
                        text: Some(prompt.to_string()),
                    },
                ],
            }],
        };

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("failed to send generate request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read generate response")?;

        if !status.is_success() {
            anyhow::bail!("generate request failed with status {status}: {body}");
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).context("failed to parse generate response")?;

        first_text(parsed).context("model response has no text content")
    }

    /// Delete an uploaded file from the remote service
    pub async fn delete_file(&self, name: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(format!("{}/v1beta/{}", self.base_url, name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("failed to send file delete request")?;

        if !response.status().is_success() {
            anyhow::bail!("file delete failed with status {}", response.status());
        }

        debug!(name, "uploaded video deleted from remote service");

        Ok(())
    }
}

/// First text part of the first candidate, if any
fn first_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .find_map(|part| part.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GeminiClient {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            ..GeminiConfig::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    fn handle(state: FileState) -> FileHandle {
        FileHandle {
            name: "files/abc123".to_string(),
            uri: "https://generativelanguage.googleapis.com/v1beta/files/abc123".to_string(),
            state,
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        let result = GeminiClient::new(&GeminiConfig::default());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_trailing_slash_stripped_from_base_url() {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            base_url: "https://example.com/".to_string(),
            ..GeminiConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://example.com");
    }

    #[test]
    fn test_parse_upload_response() {
        let json = r#"{
            "file": {
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "state": "PROCESSING"
            }
        }"#;

        let upload: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(upload.file.name, "files/abc123");
        assert_eq!(upload.file.state, FileState::Processing);
    }

    #[test]
    fn test_parse_file_states() {
        for (raw, expected) in [
            ("\"ACTIVE\"", FileState::Active),
            ("\"FAILED\"", FileState::Failed),
            ("\"STATE_UNSPECIFIED\"", FileState::StateUnspecified),
        ] {
            let state: FileState = serde_json::from_str(raw).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_generate_request_wire_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        file_data: Some(FileData {
                            file_uri: "https://example.com/files/abc".to_string(),
                            mime_type: "video/mp4".to_string(),
                        }),
                        text: None,
                    },
                    Part {
                        file_data: None,
                        text: Some("find the moment".to_string()),
                    },
                ],
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["fileData"]["fileUri"], "https://example.com/files/abc");
        assert_eq!(parts[0]["fileData"]["mimeType"], "video/mp4");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], "find the moment");
        assert!(parts[1].get("fileData").is_none());
    }

    #[test]
    fn test_first_text_from_candidates() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"second\": 3.5}"}]}}
            ]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_text(response).as_deref(), Some("{\"second\": 3.5}"));
    }

    #[test]
    fn test_first_text_empty_candidates() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(first_text(response).is_none());
    }

    #[tokio::test]
    async fn test_poll_returns_immediately_when_active() {
        let client = test_client();
        let ready = client
            .poll_until_active(handle(FileState::Active), Duration::from_secs(0), 3)
            .await
            .unwrap();
        assert_eq!(ready.state, FileState::Active);
    }

    #[tokio::test]
    async fn test_poll_stops_on_failed_state() {
        let client = test_client();
        let err = client
            .poll_until_active(handle(FileState::Failed), Duration::from_secs(0), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::ProcessingFailed { .. }));
    }

    #[tokio::test]
    async fn test_poll_budget_of_zero_times_out() {
        let client = test_client();
        let err = client
            .poll_until_active(handle(FileState::Processing), Duration::from_secs(0), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::ProcessingTimeout { attempts: 0 }));
    }
}

use crate::frame;
use crate::gemini::{FileHandle, GeminiClient, GeminiError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

#[cfg(test)]
use mockall::automock;

/// The fixed instruction sent with every analysis request
const MOMENT_PROMPT: &str = r#"
Find the first moment where the kid is saying the number "67" with their hands/fingers.
Return ONLY JSON: {"second": <float>}
"#;

/// Result of analyzing one video
#[derive(Debug, Clone, PartialEq)]
pub enum MomentOutcome {
    /// The moment was found and the matching frame decoded
    Detected { second: f64, frame_png: Vec<u8> },
    /// No matching moment, or analysis failed somewhere along the way
    NotDetected,
}

/// Video analysis the request handler depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MomentAnalyzer: Send + Sync {
    /// Locate the target moment in the video at `path`.
    ///
    /// Never fails: analysis errors are reported as `NotDetected` so an
    /// AI-side hiccup does not turn into a hard request failure.
    async fn locate_moment(&self, path: &Path) -> MomentOutcome;
}

/// Locator that delegates video understanding to the hosted model
pub struct GeminiMomentLocator {
    client: GeminiClient,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl GeminiMomentLocator {
    pub fn new(client: GeminiClient, poll_interval: Duration, poll_max_attempts: u32) -> Self {
        Self {
            client,
            poll_interval,
            poll_max_attempts,
        }
    }

    async fn try_locate(&self, path: &Path) -> Result<MomentOutcome, GeminiError> {
        let handle = self.client.upload_video(path).await?;

        let result = self.analyze_uploaded(&handle, path).await;

        // The remote copy is scratch data; delete it on every path, but a
        // failed delete must not change the analysis outcome.
        if let Err(e) = self.client.delete_file(&handle.name).await {
            warn!(
                name = %handle.name,
                error = %e,
                "could not delete uploaded video from remote service"
            );
        }

        result
    }

    async fn analyze_uploaded(
        &self,
        handle: &FileHandle,
        path: &Path,
    ) -> Result<MomentOutcome, GeminiError> {
        let ready = self
            .client
            .poll_until_active(handle.clone(), self.poll_interval, self.poll_max_attempts)
            .await?;

        let answer = self
            .client
            .generate_video_query(&ready.uri, MOMENT_PROMPT)
            .await?;

        let Some(second) = parse_moment_second(&answer) else {
            info!("model reported no matching moment");
            return Ok(MomentOutcome::NotDetected);
        };

        info!(second, "moment detected, extracting frame");

        let fps = match frame::probe_fps(path).await {
            Ok(fps) => fps,
            Err(e) => {
                error!(error = %e, "could not probe video frame rate");
                return Ok(MomentOutcome::NotDetected);
            }
        };

        match frame::extract_frame_png(path, frame::frame_index(second, fps)).await {
            Ok(frame_png) => Ok(MomentOutcome::Detected { second, frame_png }),
            Err(e) => {
                error!(second, error = %e, "could not decode frame at detected moment");
                Ok(MomentOutcome::NotDetected)
            }
        }
    }
}

#[async_trait]
impl MomentAnalyzer for GeminiMomentLocator {
    async fn locate_moment(&self, path: &Path) -> MomentOutcome {
        match self.try_locate(path).await {
            Ok(outcome) => outcome,
            Err(e @ GeminiError::ProcessingTimeout { .. }) => {
                error!(error = %e, "remote processing timed out");
                metrics::counter!("capture.analysis.timeouts").increment(1);
                MomentOutcome::NotDetected
            }
            Err(e) => {
                error!(error = %e, "video analysis failed");
                metrics::counter!("capture.analysis.failures").increment(1);
                MomentOutcome::NotDetected
            }
        }
    }
}

/// Extract the detected second from the model's answer text.
///
/// The answer should be exactly `{"second": <float>}`, but models wrap JSON
/// in prose often enough that the substring between the first `{` and the
/// last `}` is tried as a fallback before giving up.
pub fn parse_moment_second(text: &str) -> Option<f64> {
    let text = text.trim();

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            if end < start {
                return None;
            }
            serde_json::from_str(&text[start..=end]).ok()?
        }
    };

    let second = value.get("second")?.as_f64()?;

    (second.is_finite() && second >= 0.0).then_some(second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_json() {
        assert_eq!(parse_moment_second(r#"{"second": 3.5}"#), Some(3.5));
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        assert_eq!(
            parse_moment_second(r#"here is your answer: {"second": 3.5} thanks"#),
            Some(3.5)
        );
    }

    #[test]
    fn test_parse_integer_second() {
        assert_eq!(parse_moment_second(r#"{"second": 3}"#), Some(3.0));
    }

    #[test]
    fn test_parse_with_surrounding_whitespace() {
        assert_eq!(parse_moment_second("  {\"second\": 0.0}\n"), Some(0.0));
    }

    #[test]
    fn test_unparsable_text_is_not_found() {
        assert_eq!(parse_moment_second("no moment here"), None);
        assert_eq!(parse_moment_second(""), None);
        assert_eq!(parse_moment_second("{broken json"), None);
    }

    #[test]
    fn test_missing_or_non_numeric_second_is_not_found() {
        assert_eq!(parse_moment_second(r#"{"minute": 1}"#), None);
        assert_eq!(parse_moment_second(r#"{"second": "soon"}"#), None);
        assert_eq!(parse_moment_second(r#"{"second": null}"#), None);
    }

    #[test]
    fn test_negative_second_is_not_found() {
        assert_eq!(parse_moment_second(r#"{"second": -1.0}"#), None);
    }

    #[test]
    fn test_prompt_demands_strict_json() {
        assert!(MOMENT_PROMPT.contains(r#"{"second": <float>}"#));
    }
}

//! Gemini-backed [`GradingClient`].
//!
//! Sends the rubric and the bundle's content parts to the Gemini
//! `generateContent` endpoint. Bundle items are serialized in ordinal order:
//! text items carry a `=== FILE: <path> ===` header so the model can tell
//! files apart, image items become `inline_data` parts. The rubric text is
//! passed through verbatim.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use common::config;
use scanner::{ContentPart, ContextBundle};

use crate::client::GradingClient;
use crate::error::{GradingError, RunError};

const SYSTEM_PROMPT: &str = "You are an expert grader. Grade the student's assignment according to \
    the grading criteria and instructions provided. Be thorough, concise, fair, and constructive. \
    Provide clear feedback and a grade/score if the instructions ask for one. When images are \
    included, consider them as part of the submission (e.g. diagrams, screenshots).";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Pause before the single retry granted to transient failures.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Request body for the Gemini API.
#[derive(Serialize)]
struct GeminiRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Response from the Gemini API.
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Grading client backed by the Gemini `generateContent` API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RunError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RunError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RunError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
        })
    }

    /// Build from the global config; fails fast when the API key is absent.
    pub fn from_config() -> Result<Self, RunError> {
        Self::new(
            config::gemini_api_key(),
            config::gemini_model(),
            Duration::from_secs(config::grading_timeout_secs()),
        )
    }

    fn request_body(rubric: &str, bundle: &ContextBundle) -> GeminiRequest {
        let mut parts = Vec::with_capacity(bundle.items.len() + 1);
        parts.push(Part::Text {
            text: format!(
                "## Grading Instructions\n\n{rubric}\n\n---\n\n## Student Submission (all files combined)\n"
            ),
        });

        for item in &bundle.items {
            match &item.part {
                ContentPart::Text { text } => parts.push(Part::Text {
                    text: format!("=== FILE: {} ===\n\n{}", item.relative_path, text),
                }),
                ContentPart::Image { data, mime } => {
                    parts.push(Part::Text {
                        text: format!("=== FILE: {} ===", item.relative_path),
                    });
                    parts.push(Part::Inline {
                        inline_data: InlineData {
                            mime_type: mime.clone(),
                            data: BASE64.encode(data),
                        },
                    });
                }
            }
        }

        GeminiRequest {
            system_instruction: Content {
                parts: vec![Part::Text {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
            contents: vec![Content { parts }],
            generation_config: GenerationConfig { temperature: 0.0 },
        }
    }

    async fn call_once(&self, body: &GeminiRequest) -> Result<String, GradingError> {
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => GradingError::rate_limited(message),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GradingError::auth(message),
                _ => GradingError::malformed(format!("unexpected status {status}: {message}")),
            });
        }

        let response_text = response.text().await.map_err(map_transport)?;
        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GradingError::malformed(format!("error decoding response body: {e}")))?;

        let feedback = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if feedback.trim().is_empty() {
            return Err(GradingError::malformed("model returned no feedback text"));
        }
        Ok(feedback)
    }
}

fn map_transport(err: reqwest::Error) -> GradingError {
    if err.is_timeout() {
        GradingError::timeout(err.to_string())
    } else {
        GradingError::malformed(err.to_string())
    }
}

#[async_trait]
impl GradingClient for GeminiClient {
    async fn grade(&self, rubric: &str, bundle: &ContextBundle) -> Result<String, GradingError> {
        let body = Self::request_body(rubric, bundle);
        match self.call_once(&body).await {
            Ok(feedback) => Ok(feedback),
            Err(err) if err.kind.is_transient() => {
                warn!(
                    "grading {} hit a transient failure ({err}); retrying once",
                    bundle.submission.name
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.call_once(&body).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner::{ContextItem, Submission};
    use std::path::PathBuf;

    fn bundle(items: Vec<ContextItem>) -> ContextBundle {
        ContextBundle {
            submission: Submission {
                name: "alice".to_string(),
                path: PathBuf::from("/data/alice"),
            },
            items,
            errors: Vec::new(),
        }
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = GeminiClient::new("", "gemini-2.5-flash", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RunError::MissingApiKey));
    }

    #[test]
    fn request_preserves_item_order_and_rubric_text() {
        let items = vec![
            ContextItem {
                relative_path: "a.py".to_string(),
                ordinal: 0,
                part: ContentPart::Text {
                    text: "print('a')".to_string(),
                },
            },
            ContextItem {
                relative_path: "plot.png".to_string(),
                ordinal: 1,
                part: ContentPart::Image {
                    data: vec![1, 2],
                    mime: "image/png".to_string(),
                },
            },
            ContextItem {
                relative_path: "z.txt".to_string(),
                ordinal: 2,
                part: ContentPart::Text {
                    text: "notes".to_string(),
                },
            },
        ];

        let body = GeminiClient::request_body("Grade out of 2.", &bundle(items));
        let json = serde_json::to_value(&body).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 5);
        let header = parts[0]["text"].as_str().unwrap();
        assert!(header.contains("Grade out of 2."));
        assert!(parts[1]["text"].as_str().unwrap().contains("=== FILE: a.py ==="));
        assert_eq!(
            parts[3]["inline_data"]["mime_type"].as_str().unwrap(),
            "image/png"
        );
        assert_eq!(
            parts[3]["inline_data"]["data"].as_str().unwrap(),
            BASE64.encode([1u8, 2])
        );
        assert!(parts[4]["text"].as_str().unwrap().contains("=== FILE: z.txt ==="));

        let system = json["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(system.contains("expert grader"));
    }

    #[test]
    fn empty_bundle_still_produces_a_well_formed_request() {
        let body = GeminiClient::request_body("rubric", &bundle(Vec::new()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeminiConfig;

/// Finish reasons for which the candidate text must not be read.
const BAD_FINISH_REASONS: &[&str] = &["RECITATION", "SAFETY", "LANGUAGE"];

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Error fetching from Gemini: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("Failed to parse Gemini response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Candidate was blocked due to {0}")]
    BadFinishReason(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockMediumAndAbove,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Medium-and-above blocking for every category we send.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::HarmCategoryHarassment,
        HarmCategory::HarmCategoryHateSpeech,
        HarmCategory::HarmCategorySexuallyExplicit,
        HarmCategory::HarmCategoryDangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content>,
    safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// What a generation produced, checked in the order the variants are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Blocked(String),
    Empty,
    Text(String),
}

impl GenerateContentResponse {
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }

    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.as_ref().and_then(|c| c.first())
    }

    /// Concatenated text of the first candidate. Fails when that candidate
    /// stopped for a reason that makes its text unusable.
    pub fn text(&self) -> Result<String, GeminiError> {
        let candidate = match self.first_candidate() {
            Some(c) => c,
            None => return Ok(String::new()),
        };

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BAD_FINISH_REASONS.contains(&reason) {
                return Err(GeminiError::BadFinishReason(reason.to_string()));
            }
        }

        Ok(candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default())
    }

    /// Classify the response. A block reason wins over everything else and
    /// the text is only read once a candidate with content is known to exist.
    pub fn interpret(&self) -> Result<Generation, GeminiError> {
        if let Some(reason) = self.block_reason() {
            return Ok(Generation::Blocked(reason.to_string()));
        }

        match self.first_candidate() {
            Some(candidate) if candidate.content.is_some() => Ok(Generation::Text(self.text()?)),
            _ => Ok(Generation::Empty),
        }
    }
}

/// Single-shot text generation from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerateContentResponse, GeminiError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    safety_settings: Vec<SafetySetting>,
}

impl GeminiClient {
    /// Returns `None` when no credential is configured.
    pub fn from_config(config: &GeminiConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(&config.base_url, &config.model, key))
    }

    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            safety_settings: default_safety_settings(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub async fn generate_content(
        &self,
        prompt: &str,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            safety_settings: &self.safety_settings,
        };

        let url = self.endpoint();
        debug!("Sending request to Gemini: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GeminiError::Api { status, message });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GenerateContentResponse, GeminiError> {
        self.generate_content(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_safety_settings_serialization() {
        let value = serde_json::to_value(default_safety_settings()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
            ])
        );
    }

    #[test]
    fn test_interpret_text() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(
            response.interpret().unwrap(),
            Generation::Text("Hello there".to_string())
        );
    }

    #[test]
    fn test_interpret_block_reason_wins() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"x"}]},"finishReason":"SAFETY"}],"promptFeedback":{"blockReason":"SAFETY"}}"#,
        );
        assert_eq!(
            response.interpret().unwrap(),
            Generation::Blocked("SAFETY".to_string())
        );
    }

    #[test]
    fn test_interpret_no_candidates() {
        assert_eq!(parse("{}").interpret().unwrap(), Generation::Empty);
        assert_eq!(
            parse(r#"{"candidates":[]}"#).interpret().unwrap(),
            Generation::Empty
        );
    }

    #[test]
    fn test_interpret_candidate_without_content() {
        let response = parse(r#"{"candidates":[{"finishReason":"OTHER"}]}"#);
        assert_eq!(response.interpret().unwrap(), Generation::Empty);
    }

    #[test]
    fn test_interpret_bad_finish_reason_is_error() {
        let response =
            parse(r#"{"candidates":[{"content":{"parts":[]},"finishReason":"RECITATION"}]}"#);
        let err = response.interpret().unwrap_err();
        assert_eq!(err.to_string(), "Candidate was blocked due to RECITATION");
    }

    #[test]
    fn test_text_ignores_parts_without_text() {
        let response = parse(r#"{"candidates":[{"content":{"parts":[{},{"text":"4"}]}}]}"#);
        assert_eq!(response.text().unwrap(), "4");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]},"safetyRatings":[]}],"usageMetadata":{"totalTokenCount":3},"modelVersion":"x"}"#,
        );
        assert_eq!(
            response.interpret().unwrap(),
            Generation::Text("ok".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_content_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "2+2?"}]}],
                "safetySettings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                    {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                    {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                    {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"4"}]},"finishReason":"STOP"}]}"#)
            .create_async()
            .await;

        let client = GeminiClient::new(&server.url(), "gemini-1.5-flash", "test-key");
        let response = client.generate_content("2+2?").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            response.interpret().unwrap(),
            Generation::Text("4".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_content_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let client = GeminiClient::new(&server.url(), "gemini-1.5-flash", "bad");
        let err = client.generate_content("hi").await.unwrap_err();

        match &err {
            GeminiError::Api { status, message } => {
                assert_eq!(status.as_u16(), 400);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("API key not valid."));
    }

    #[tokio::test]
    async fn test_generate_content_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let client = GeminiClient::new(&server.url(), "gemini-1.5-flash", "k");
        let err = client.generate_content("hi").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gemini API error (503 Service Unavailable): upstream unavailable"
        );
    }

    #[tokio::test]
    async fn test_generate_content_invalid_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = GeminiClient::new(&server.url(), "gemini-1.5-flash", "k");
        let err = client.generate_content("hi").await.unwrap_err();
        assert!(matches!(err, GeminiError::Decode(_)));
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = GeminiConfig {
            model: "gemini-1.5-flash".to_string(),
            base_url: "http://localhost".to_string(),
            api_key: None,
        };
        assert!(GeminiClient::from_config(&config).is_none());

        config.api_key = Some("k".to_string());
        let client = GeminiClient::from_config(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost/models/gemini-1.5-flash:generateContent"
        );
    }
}

//! Reading passages with yes/no comprehension questions, generated by Gemini.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ContentError, RemoteError};
use crate::logging::{OperationTimer, StudyEventType, StudyLogger};
use crate::models::{Answer, LessonPayload, QuestionItem};
use crate::retry::{RetryError, RetryingCaller};

pub const TEXT_SERVICE: &str = "Gemini";
pub const DEFAULT_TEXT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

pub const LESSON_INSTRUCTIONS: &str = "Generate a short reading passage for a focus test, and provide 3 comprehension questions.
Return your response strictly as JSON (a raw JSON object, no markdown) with these fields:
- \"generated_text\": the passage as a string,
- \"questions\": a list of exactly 3 objects, each with \"text\" (a yes/no question about the passage) and \"correct_response\" (\"Yes\" or \"No\").";

/// Produces raw model text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, RemoteError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// `generateContent` client for the Gemini API
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, RemoteError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(TEXT_SERVICE, &e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(TEXT_SERVICE, status.as_u16(), body));
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::from_reqwest(TEXT_SERVICE, &e, self.timeout))?;

        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RemoteError::malformed(TEXT_SERVICE, "response contained no text"));
        }
        Ok(text)
    }
}

/// Stand-in used when no API key is configured; every request fails with an
/// auth error so lessons degrade to the error state.
#[derive(Debug, Clone)]
pub struct MissingApiKey {
    reason: String,
}

impl MissingApiKey {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl TextGenerator for MissingApiKey {
    async fn generate_text(&self, _prompt: &str) -> Result<String, RemoteError> {
        Err(RemoteError::Auth {
            service: TEXT_SERVICE.to_string(),
            message: self.reason.clone(),
        })
    }
}

#[derive(Deserialize)]
struct RawLesson {
    generated_text: String,
    questions: Vec<RawQuestion>,
}

#[derive(Deserialize)]
struct RawQuestion {
    text: String,
    correct_response: String,
}

/// Parse and validate model output as a lesson
pub fn parse_lesson(raw: &str) -> Result<LessonPayload, ContentError> {
    validate_lesson(raw).map_err(ContentError::InvalidPayload)
}

fn validate_lesson(raw: &str) -> Result<LessonPayload, String> {
    let lesson: RawLesson =
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| format!("not a lesson object: {}", e))?;

    if lesson.generated_text.trim().is_empty() {
        return Err("passage is empty".to_string());
    }
    if lesson.questions.is_empty() {
        return Err("no questions".to_string());
    }

    let mut questions = Vec::with_capacity(lesson.questions.len());
    for (index, question) in lesson.questions.into_iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(format!("question {} has no text", index + 1));
        }
        let correct_response: Answer = question
            .correct_response
            .trim()
            .parse()
            .map_err(|e| format!("question {}: {}", index + 1, e))?;
        questions.push(QuestionItem {
            text: question.text.trim().to_string(),
            correct_response,
        });
    }

    Ok(LessonPayload {
        passage: lesson.generated_text.trim().to_string(),
        questions,
    })
}

/// Models sometimes wrap JSON in a markdown fence despite being told not to
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

impl From<RetryError<RemoteError>> for ContentError {
    fn from(err: RetryError<RemoteError>) -> Self {
        if let RetryError::RateLimited { attempts, .. } = err {
            return ContentError::RateLimited { attempts };
        }
        match err.into_inner() {
            RemoteError::MalformedResponse { message, .. } => ContentError::InvalidPayload(message),
            other => ContentError::Remote(other),
        }
    }
}

pub struct ContentGenerationService {
    generator: Arc<dyn TextGenerator>,
    caller: RetryingCaller,
    logger: StudyLogger,
}

impl ContentGenerationService {
    pub fn new(generator: Arc<dyn TextGenerator>, caller: RetryingCaller, logger: StudyLogger) -> Self {
        Self { generator, caller, logger }
    }

    /// Request and validate one lesson. Rate limits are retried; a malformed
    /// lesson is not.
    pub async fn generate(&self) -> Result<LessonPayload, ContentError> {
        let generator = self.generator.as_ref();
        self.caller
            .call("lesson generation", move || async move {
                let text = generator.generate_text(LESSON_INSTRUCTIONS).await?;
                validate_lesson(&text).map_err(|e| RemoteError::malformed(TEXT_SERVICE, e))
            })
            .await
            .map_err(ContentError::from)
    }

    /// Like [`generate`](Self::generate), but degrades to an error-state lesson
    pub async fn load_lesson(&self, section: &str) -> LessonPayload {
        self.logger
            .log_event(StudyEventType::LessonRequested, section.to_string(), None);
        let timer = OperationTimer::new(format!("lesson for {}", section));

        match self.generate().await {
            Ok(lesson) => {
                self.logger
                    .log_lesson_loaded(section, lesson.questions.len(), timer.finish());
                lesson
            }
            Err(err) => {
                self.logger.log_lesson_failed(section, &err.to_string());
                LessonPayload::error_state(matches!(err, ContentError::RateLimited { .. }))
            }
        }
    }
}

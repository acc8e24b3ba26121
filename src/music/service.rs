//! Background music from the Lyria `predict` endpoint.
//!
//! Generation never fails from the caller's point of view: any terminal error
//! is turned into a silent track, and the typed reason travels with it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::audio::{probe, silence, AudioFrameEncoder, PcmFormat};
use crate::auth::{TokenProvider, CLOUD_PLATFORM_SCOPE};
use crate::error::{MusicError, RemoteError};
use crate::logging::{OperationTimer, StudyEventType, StudyLogger};
use crate::models::{AudioAsset, MusicParams, PromptPair};
use crate::music::prompt::MusicPromptBuilder;
use crate::retry::{RetryError, RetryingCaller};

pub const MUSIC_SERVICE: &str = "Lyria";
pub const DEFAULT_MUSIC_MODEL: &str = "lyria-002";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SILENCE: Duration = Duration::from_secs(30);
pub const SILENCE_SAMPLE_RATE: u32 = 44_100;

/// One prompt in a predict request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictRequest {
    pub instances: Vec<PredictInstance>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl PredictRequest {
    /// A seeded request is deterministic; an unseeded one asks for one sample
    pub fn new(prompt: &PromptPair, seed: Option<u32>) -> Self {
        let seed = seed.filter(|s| *s > 0);
        let negative_prompt = Some(prompt.negative_prompt.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Self {
            instances: vec![PredictInstance {
                prompt: prompt.prompt.clone(),
                negative_prompt,
                seed,
                sample_count: if seed.is_some() { None } else { Some(1) },
            }],
            parameters: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Prediction {
    #[serde(rename = "bytesBase64Encoded", default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

/// Transport for predict calls
#[async_trait]
pub trait MusicModel: Send + Sync {
    async fn predict(&self, access_token: &str, request: &PredictRequest) -> Result<PredictResponse, RemoteError>;
}

/// Vertex AI client for the Lyria model
pub struct LyriaClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl LyriaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn for_project(project_id: &str, location: &str, model: &str, timeout: Duration) -> Self {
        Self::new(Self::endpoint_url(project_id, location, model), timeout)
    }

    pub fn endpoint_url(project_id: &str, location: &str, model: &str) -> String {
        format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:predict"
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MusicModel for LyriaClient {
    async fn predict(&self, access_token: &str, request: &PredictRequest) -> Result<PredictResponse, RemoteError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(MUSIC_SERVICE, &e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(MUSIC_SERVICE, status.as_u16(), body));
        }

        response
            .json::<PredictResponse>()
            .await
            .map_err(|e| RemoteError::from_reqwest(MUSIC_SERVICE, &e, self.timeout))
    }
}

/// Result of one music request
#[derive(Debug, Clone, PartialEq)]
pub enum MusicOutcome {
    Generated {
        wav: Vec<u8>,
        prompt: PromptPair,
        asset: Option<AudioAsset>,
    },
    Silence {
        wav: Vec<u8>,
        reason: MusicError,
    },
}

impl MusicOutcome {
    pub fn wav(&self) -> &[u8] {
        match self {
            MusicOutcome::Generated { wav, .. } | MusicOutcome::Silence { wav, .. } => wav,
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, MusicOutcome::Silence { .. })
    }

    pub fn fallback_reason(&self) -> Option<&MusicError> {
        match self {
            MusicOutcome::Silence { reason, .. } => Some(reason),
            MusicOutcome::Generated { .. } => None,
        }
    }

    pub fn prompt(&self) -> Option<&PromptPair> {
        match self {
            MusicOutcome::Generated { prompt, .. } => Some(prompt),
            MusicOutcome::Silence { .. } => None,
        }
    }
}

struct Backend {
    model: Arc<dyn MusicModel>,
    credentials: Arc<dyn TokenProvider>,
    caller: RetryingCaller,
}

pub struct MusicGenerationService {
    backend: Result<Backend, MusicError>,
    logger: StudyLogger,
    silence_duration: Duration,
}

impl MusicGenerationService {
    pub fn new(
        model: Arc<dyn MusicModel>,
        credentials: Arc<dyn TokenProvider>,
        caller: RetryingCaller,
        logger: StudyLogger,
    ) -> Self {
        Self {
            backend: Ok(Backend {
                model,
                credentials,
                caller,
            }),
            logger,
            silence_duration: DEFAULT_SILENCE,
        }
    }

    /// A service with no music backend; every request gets silence with `reason`
    pub fn unavailable(reason: MusicError, logger: StudyLogger) -> Self {
        Self {
            backend: Err(reason),
            logger,
            silence_duration: DEFAULT_SILENCE,
        }
    }

    pub fn with_silence_duration(mut self, duration: Duration) -> Self {
        self.silence_duration = duration;
        self
    }

    /// Generate a track, or fall back to silence
    pub async fn generate(&self, params: &MusicParams) -> MusicOutcome {
        let timer = OperationTimer::new("music generation");

        match self.try_generate(params).await {
            Ok((wav, prompt)) => {
                let asset = probe(&wav).ok();
                let details = match &asset {
                    Some(asset) => asset.format_description(),
                    None => format!("{} bytes", wav.len()),
                };
                self.logger
                    .log_event(StudyEventType::MusicGenerated, details, Some(timer.finish()));
                MusicOutcome::Generated { wav, prompt, asset }
            }
            Err(reason) => {
                self.logger.log_music_fallback(&reason.to_string());
                MusicOutcome::Silence {
                    wav: silence(self.silence_duration, SILENCE_SAMPLE_RATE),
                    reason,
                }
            }
        }
    }

    /// Generate a track, surfacing the failure instead of substituting silence
    pub async fn try_generate(&self, params: &MusicParams) -> Result<(Vec<u8>, PromptPair), MusicError> {
        let backend = self.backend.as_ref().map_err(MusicError::clone)?;
        let token = backend
            .credentials
            .access_token(CLOUD_PLATFORM_SCOPE)
            .await
            .map_err(MusicError::Auth)?;

        let prompt = MusicPromptBuilder::build(params);
        let request = PredictRequest::new(&prompt, params.effective_seed());
        debug!("Music prompt: {}", prompt.prompt);

        let model = backend.model.as_ref();
        let token = token.as_str();
        let request_ref = &request;
        let response = backend
            .caller
            .call("music generation", move || model.predict(token, request_ref))
            .await
            .map_err(music_error_from_retry)?;

        let prediction = response
            .predictions
            .into_iter()
            .next()
            .ok_or(MusicError::EmptyPredictions)?;
        let encoded = prediction
            .bytes_base64_encoded
            .ok_or_else(|| MusicError::MalformedResponse("prediction has no bytesBase64Encoded".to_string()))?;

        let audio = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| MusicError::InvalidAudio(e.to_string()))?;

        let wav = if is_wav_container(&audio) {
            info!("Music model returned a WAV container, keeping it as-is");
            audio
        } else {
            AudioFrameEncoder::new(PcmFormat::GENERATED_MUSIC)
                .encode(&audio)
                .map_err(MusicError::Encode)?
        };

        Ok((wav, prompt))
    }
}

fn is_wav_container(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn music_error_from_retry(err: RetryError<RemoteError>) -> MusicError {
    match err {
        RetryError::RateLimited { attempts, .. } => MusicError::RateLimited { attempts },
        RetryError::Exhausted { attempts, last } if last.is_timeout() => MusicError::TimedOut { attempts },
        RetryError::Exhausted { last, .. } => MusicError::Remote(last),
        RetryError::Terminal { attempt, error } => match error {
            RemoteError::Auth { .. } => MusicError::Auth(error),
            RemoteError::Timeout { .. } => MusicError::TimedOut { attempts: attempt },
            RemoteError::MalformedResponse { message, .. } => MusicError::MalformedResponse(message),
            other => MusicError::Remote(other),
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{audio_response, ScriptedMusicModel};
    use super::*;
    use crate::auth::testing::StaticTokenProvider;
    use crate::auth::MissingCredentials;
    use crate::retry::testing::RecordingSleeper;
    use crate::retry::RetryPolicy;

    fn make_service(model: Arc<ScriptedMusicModel>, credentials: Arc<dyn TokenProvider>) -> (MusicGenerationService, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let logger = StudyLogger::new();
        let caller = RetryingCaller::new(RetryPolicy::music_generation(), sleeper.clone(), logger.clone());
        let service = MusicGenerationService::new(model, credentials, caller, logger)
            .with_silence_duration(Duration::from_secs(1));
        (service, sleeper)
    }

    fn timeout() -> RemoteError {
        RemoteError::Timeout {
            service: MUSIC_SERVICE.to_string(),
            after: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    fn params() -> MusicParams {
        let mut params = MusicParams::new("Lo-fi", "Calm");
        params.instruments = vec!["Piano".to_string()];
        params
    }

    #[test]
    fn test_request_body_uses_seed_or_sample_count() {
        let pair = PromptPair {
            prompt: "Jazz music".to_string(),
            negative_prompt: "vocals".to_string(),
        };

        let seeded = serde_json::to_value(PredictRequest::new(&pair, Some(7))).unwrap();
        assert_eq!(
            seeded,
            serde_json::json!({
                "instances": [{"prompt": "Jazz music", "negative_prompt": "vocals", "seed": 7}],
                "parameters": {}
            })
        );

        let unseeded = PredictRequest::new(
            &PromptPair {
                prompt: "Jazz music".to_string(),
                negative_prompt: " ".to_string(),
            },
            None,
        );
        assert_eq!(
            serde_json::to_value(unseeded).unwrap(),
            serde_json::json!({
                "instances": [{"prompt": "Jazz music", "sample_count": 1}],
                "parameters": {}
            })
        );
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            LyriaClient::endpoint_url("my-project", "us-central1", "lyria-002"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/my-project/locations/us-central1/publishers/google/models/lyria-002:predict"
        );
    }

    #[tokio::test]
    async fn test_generated_audio_is_framed_as_stereo_wav() {
        let pcm: Vec<u8> = (0..960i16).flat_map(|s| s.to_le_bytes()).collect();
        let model = Arc::new(ScriptedMusicModel::new(vec![Ok(audio_response(&pcm))]));
        let tokens = Arc::new(StaticTokenProvider::new("token-1"));
        let (service, sleeper) = make_service(model.clone(), tokens.clone());

        let outcome = service.generate(&params()).await;

        match &outcome {
            MusicOutcome::Generated { prompt, asset, .. } => {
                assert!(prompt.prompt.contains("featuring piano"));
                let asset = asset.expect("probe succeeds");
                assert_eq!(asset.sample_rate, 48000);
                assert_eq!(asset.channel_count, 2);
                assert_eq!(asset.frame_count, 480);
            }
            other => panic!("Expected generated music, got {:?}", other),
        }
        assert!(sleeper.recorded().is_empty());
        assert_eq!(*tokens.scopes.lock().unwrap(), vec![CLOUD_PLATFORM_SCOPE.to_string()]);

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].0, "token-1");
        assert_eq!(requests[0].1["instances"][0]["sample_count"], 1);
    }

    #[tokio::test]
    async fn test_wav_payload_is_kept() {
        let wav = silence(Duration::from_millis(10), 48000);
        let model = Arc::new(ScriptedMusicModel::new(vec![Ok(audio_response(&wav))]));
        let (service, _) = make_service(model, Arc::new(StaticTokenProvider::new("t")));

        let (bytes, _) = service.try_generate(&params()).await.unwrap();
        assert_eq!(bytes, wav);
    }

    #[tokio::test]
    async fn test_auth_failure_falls_back_to_silence() {
        let model = Arc::new(ScriptedMusicModel::default());
        let (service, _) = make_service(model.clone(), Arc::new(MissingCredentials::new("no key")));

        let outcome = service.generate(&params()).await;

        assert!(outcome.is_silence());
        assert!(matches!(outcome.fallback_reason(), Some(MusicError::Auth(_))));
        assert_eq!(model.call_count(), 0);

        let asset = probe(outcome.wav()).unwrap();
        assert_eq!(asset.sample_rate, 44100);
        assert_eq!(asset.channel_count, 1);
        assert_eq!(asset.frame_count, 44100);
    }

    #[tokio::test]
    async fn test_unavailable_service_plays_silence() {
        let reason = MusicError::NotConfigured("music_generation.project_id".to_string());
        let service = MusicGenerationService::unavailable(reason.clone(), StudyLogger::new())
            .with_silence_duration(Duration::from_secs(1));

        let outcome = service.generate(&params()).await;

        assert_eq!(outcome.fallback_reason(), Some(&reason));
        assert_eq!(probe(outcome.wav()).unwrap().frame_count, 44100);
        assert_eq!(service.try_generate(&params()).await.unwrap_err(), reason);
    }

    #[tokio::test]
    async fn test_oversized_silence_falls_back_to_empty_track() {
        let reason = MusicError::NotConfigured("music_generation.enabled".to_string());
        let service = MusicGenerationService::unavailable(reason.clone(), StudyLogger::new())
            .with_silence_duration(Duration::from_secs(u64::MAX));

        let outcome = service.generate(&params()).await;

        assert_eq!(outcome.fallback_reason(), Some(&reason));
        assert!(outcome.wav().is_empty());
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_then_fall_back() {
        let model = Arc::new(ScriptedMusicModel::new(vec![Err(timeout()), Err(timeout()), Err(timeout())]));
        let (service, sleeper) = make_service(model.clone(), Arc::new(StaticTokenProvider::new("t")));

        let outcome = service.generate(&params()).await;

        assert_eq!(model.call_count(), 3);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(3); 2]);
        assert_eq!(outcome.fallback_reason(), Some(&MusicError::TimedOut { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let pcm = vec![0u8; 16];
        let model = Arc::new(ScriptedMusicModel::new(vec![Err(timeout()), Ok(audio_response(&pcm))]));
        let (service, sleeper) = make_service(model.clone(), Arc::new(StaticTokenProvider::new("t")));

        assert!(!service.generate(&params()).await.is_silence());
        assert_eq!(model.call_count(), 2);
        assert_eq!(sleeper.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let limited = || Err(RemoteError::RateLimited { service: MUSIC_SERVICE.to_string() });
        let model = Arc::new(ScriptedMusicModel::new(vec![limited(), limited(), limited()]));
        let (service, _) = make_service(model, Arc::new(StaticTokenProvider::new("t")));

        let outcome = service.generate(&params()).await;
        assert_eq!(outcome.fallback_reason(), Some(&MusicError::RateLimited { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_bad_payloads_fall_back() {
        let cases = vec![
            (Ok(PredictResponse::default()), MusicError::EmptyPredictions),
            (
                Ok(PredictResponse {
                    predictions: vec![Prediction::default()],
                }),
                MusicError::MalformedResponse("prediction has no bytesBase64Encoded".to_string()),
            ),
        ];

        for (response, expected) in cases {
            let model = Arc::new(ScriptedMusicModel::new(vec![response]));
            let (service, _) = make_service(model, Arc::new(StaticTokenProvider::new("t")));
            assert_eq!(service.generate(&params()).await.fallback_reason(), Some(&expected));
        }

        let model = Arc::new(ScriptedMusicModel::new(vec![Ok(PredictResponse {
            predictions: vec![Prediction {
                bytes_base64_encoded: Some("%%% not base64 %%%".to_string()),
                mime_type: None,
            }],
        })]));
        let (service, _) = make_service(model, Arc::new(StaticTokenProvider::new("t")));
        assert!(matches!(
            service.generate(&params()).await.fallback_reason(),
            Some(MusicError::InvalidAudio(_))
        ));
    }

    #[tokio::test]
    async fn test_http_errors_are_not_retried() {
        let model = Arc::new(ScriptedMusicModel::new(vec![Err(RemoteError::from_status(
            MUSIC_SERVICE,
            403,
            "permission denied".to_string(),
        ))]));
        let (service, sleeper) = make_service(model.clone(), Arc::new(StaticTokenProvider::new("t")));

        let outcome = service.generate(&params()).await;
        assert_eq!(model.call_count(), 1);
        assert!(sleeper.recorded().is_empty());
        assert!(matches!(outcome.fallback_reason(), Some(MusicError::Auth(_))));
    }

    #[test]
    fn test_retry_error_mapping() {
        let err = music_error_from_retry(RetryError::Exhausted {
            attempts: 3,
            last: RemoteError::Http {
                service: MUSIC_SERVICE.to_string(),
                status: 500,
                body: String::new(),
            },
        });
        assert!(matches!(err, MusicError::Remote(RemoteError::Http { status: 500, .. })));
    }
}

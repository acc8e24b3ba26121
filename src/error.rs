use std::time::Duration;
use thiserror::Error;

/// Main study error type
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Content generation error: {0}")]
    Content(#[from] ContentError),

    #[error("Music generation error: {0}")]
    Music(#[from] MusicError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl StudyError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            StudyError::Remote(err) => err.user_message(),
            StudyError::Content(err) => err.user_message(),
            StudyError::Music(err) => err.user_message(),
            StudyError::Audio(err) => err.user_message(),
            StudyError::Validation(err) => err.to_string(),
            StudyError::Submission(err) => err.user_message(),
            StudyError::Config(err) => err.user_message(),
            StudyError::File(err) => format!("File system error: {}", err),
            StudyError::Parse(err) => format!("Input error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            StudyError::Remote(err) => err.recovery_suggestions(),
            StudyError::Content(err) => err.recovery_suggestions(),
            StudyError::Music(err) => err.recovery_suggestions(),
            StudyError::Audio(_) => vec!["The study continues without background music".to_string()],
            StudyError::Validation(_) => vec!["Fill in the required fields and try again".to_string()],
            StudyError::Submission(err) => err.recovery_suggestions(),
            StudyError::Config(err) => err.recovery_suggestions(),
            StudyError::File(_) => vec!["Check the path and file permissions".to_string()],
            StudyError::Parse(_) => vec!["Type 'help' to see what input is expected".to_string()],
        }
    }

    /// Check if the session can continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            StudyError::Remote(err) => err.is_retryable(),
            StudyError::Content(_) => true, // Degrades to an error-state lesson
            StudyError::Music(_) => true,   // Degrades to silence
            StudyError::Audio(_) => true,
            StudyError::Validation(_) => true,
            StudyError::Submission(_) => true, // State is kept, user may resubmit
            StudyError::Config(err) => err.is_recoverable(),
            StudyError::File(_) => false,
            StudyError::Parse(_) => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StudyError::Remote(RemoteError::RateLimited { .. }) => ErrorSeverity::Warning,
            StudyError::Remote(_) => ErrorSeverity::Error,
            StudyError::Content(_) => ErrorSeverity::Error,
            StudyError::Music(_) => ErrorSeverity::Warning,
            StudyError::Audio(_) => ErrorSeverity::Warning,
            StudyError::Validation(_) => ErrorSeverity::Info,
            StudyError::Submission(_) => ErrorSeverity::Error,
            StudyError::Config(_) => ErrorSeverity::Warning,
            StudyError::File(_) => ErrorSeverity::Critical,
            StudyError::Parse(_) => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Failures of a single call to a remote HTTP service
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("{service} rate limit reached (HTTP 429)")]
    RateLimited { service: String },

    #[error("{service} request timed out after {}s", .after.as_secs())]
    Timeout { service: String, after: Duration },

    #[error("{service} authentication failed: {message}")]
    Auth { service: String, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Http { service: String, status: u16, body: String },

    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} returned a malformed response: {message}")]
    MalformedResponse { service: String, message: String },
}

impl RemoteError {
    /// Map a non-success HTTP status onto the error taxonomy
    pub fn from_status(service: &str, status: u16, body: String) -> Self {
        match status {
            429 => RemoteError::RateLimited { service: service.to_string() },
            401 | 403 => RemoteError::Auth {
                service: service.to_string(),
                message: format!("HTTP {}: {}", status, body),
            },
            _ => RemoteError::Http { service: service.to_string(), status, body },
        }
    }

    /// Map a transport-level reqwest failure
    pub fn from_reqwest(service: &str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout { service: service.to_string(), after: timeout }
        } else if let Some(status) = err.status() {
            RemoteError::from_status(service, status.as_u16(), err.to_string())
        } else if err.is_decode() {
            RemoteError::MalformedResponse { service: service.to_string(), message: err.to_string() }
        } else {
            RemoteError::Transport { service: service.to_string(), message: err.to_string() }
        }
    }

    pub fn malformed(service: &str, message: impl Into<String>) -> Self {
        RemoteError::MalformedResponse { service: service.to_string(), message: message.into() }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout { .. })
    }

    /// Rate limits and timeouts are transient; everything else is terminal
    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited() || self.is_timeout()
    }

    pub fn user_message(&self) -> String {
        match self {
            RemoteError::RateLimited { service } => {
                format!("{} is receiving too many requests right now", service)
            }
            RemoteError::Timeout { service, .. } => format!("{} took too long to answer", service),
            RemoteError::Auth { service, .. } => {
                format!("Could not authenticate with {}", service)
            }
            RemoteError::Http { service, status, .. } => {
                format!("{} rejected the request (HTTP {})", service, status)
            }
            RemoteError::Transport { service, .. } => format!("Could not reach {}", service),
            RemoteError::MalformedResponse { service, .. } => {
                format!("{} returned data that could not be understood", service)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            RemoteError::RateLimited { .. } => vec![
                "Wait a minute before starting another section".to_string(),
                "Check the quota of your API key".to_string(),
            ],
            RemoteError::Timeout { .. } => vec![
                "Check your network connection".to_string(),
                "Increase request_timeout_secs in the configuration".to_string(),
            ],
            RemoteError::Auth { .. } => vec![
                "Check the API key or service account configured for this service".to_string(),
                "Make sure the service account has access to the project".to_string(),
            ],
            RemoteError::Http { .. } | RemoteError::Transport { .. } => vec![
                "Check your network connection".to_string(),
                "Verify the endpoint and project settings in the configuration".to_string(),
            ],
            RemoteError::MalformedResponse { .. } => vec![
                "Restart the section to request new content".to_string(),
            ],
        }
    }
}

/// Lesson (passage + questions) generation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContentError {
    #[error("Rate limit reached. Maximum retries ({attempts}) exceeded")]
    RateLimited { attempts: u32 },

    #[error("Request failed: {0}")]
    Remote(RemoteError),

    #[error("Invalid lesson payload: {0}")]
    InvalidPayload(String),

    #[error("Text generation is not configured: {0}")]
    NotConfigured(String),
}

impl ContentError {
    pub fn user_message(&self) -> String {
        match self {
            ContentError::RateLimited { .. } => "Rate limit reached. Maximum retries exceeded.".to_string(),
            ContentError::Remote(err) => format!("Failed to load test: {}", err.user_message()),
            ContentError::InvalidPayload(_) => "Failed to load test: the generated lesson was malformed".to_string(),
            ContentError::NotConfigured(what) => format!("Failed to load test: {} is not configured", what),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ContentError::RateLimited { .. } => vec![
                "Wait a minute, then restart the study".to_string(),
            ],
            ContentError::Remote(err) => err.recovery_suggestions(),
            ContentError::InvalidPayload(_) => vec![
                "Restart the study to request a new lesson".to_string(),
            ],
            ContentError::NotConfigured(_) => vec![
                "Set GEMINI_API_KEY or text_generation.api_key in the configuration".to_string(),
            ],
        }
    }
}

/// Reasons music generation fell back to silence
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MusicError {
    #[error("Credential error: {0}")]
    Auth(RemoteError),

    #[error("Rate limit reached after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Timed out on all {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Request failed: {0}")]
    Remote(RemoteError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response contained no predictions")]
    EmptyPredictions,

    #[error("Prediction payload is not valid base64: {0}")]
    InvalidAudio(String),

    #[error("Could not frame generated audio: {0}")]
    Encode(AudioError),

    #[error("Music generation is not configured: {0}")]
    NotConfigured(String),
}

impl MusicError {
    pub fn user_message(&self) -> String {
        match self {
            MusicError::Auth(_) => "Could not authenticate with the music service, playing silence instead".to_string(),
            MusicError::RateLimited { .. } => "The music service is busy, playing silence instead".to_string(),
            MusicError::TimedOut { .. } => "Music generation took too long, playing silence instead".to_string(),
            MusicError::NotConfigured(_) => "Music generation is not configured, playing silence instead".to_string(),
            _ => "Music generation failed, playing silence instead".to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            MusicError::Auth(err) | MusicError::Remote(err) => err.recovery_suggestions(),
            MusicError::NotConfigured(_) => vec![
                "Set music_generation.project_id and credentials.service_account_path".to_string(),
            ],
            _ => vec!["The section can be completed without music".to_string()],
        }
    }
}

/// Audio container errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioError {
    #[error("Unsupported sample width: {width} bytes")]
    UnsupportedSampleWidth { width: u16 },

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::UnsupportedSampleWidth { width } => {
                format!("Audio with {}-byte samples is not supported", width)
            }
            AudioError::InvalidFormat(msg) => format!("Invalid audio format: {}", msg),
            AudioError::EncodeFailed(msg) => format!("Could not write audio: {}", msg),
            AudioError::ProbeFailed(msg) => format!("Could not read audio: {}", msg),
            AudioError::PlaybackFailed(msg) => format!("Could not play audio: {}", msg),
        }
    }
}

/// Local validation errors. These block progression and never mutate state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Seed must be a positive integer")]
    InvalidSeed,

    #[error("Preferences must be submitted before starting a test section")]
    MissingPreferences,

    #[error("Expected answers for {expected}, got {got}")]
    WrongStep { expected: String, got: String },

    #[error("The lesson for {section} has not been shown yet")]
    LessonNotLoaded { section: String },
}

/// Document store submission errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmissionError {
    #[error("Result submission is disabled in the configuration")]
    Disabled,

    #[error("Credential error: {0}")]
    Credentials(RemoteError),

    #[error("Store write failed: {0}")]
    Store(RemoteError),

    #[error("Could not encode the submission: {0}")]
    Encode(String),

    #[error("All test sections must be completed before submitting")]
    NotReady,
}

impl SubmissionError {
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Disabled => "Result submission is disabled".to_string(),
            SubmissionError::Credentials(err) => {
                format!("Failed to submit: {}", err.user_message())
            }
            SubmissionError::Store(err) => format!("Failed to submit: {}", err),
            SubmissionError::Encode(msg) => format!("Failed to submit: {}", msg),
            SubmissionError::NotReady => "Finish all three test sections before submitting".to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SubmissionError::Disabled => vec!["Set store.enabled = true in the configuration".to_string()],
            SubmissionError::Credentials(err) | SubmissionError::Store(err) => {
                let mut suggestions = err.recovery_suggestions();
                suggestions.push("Your answers are kept; type 'submit' to try again".to_string());
                suggestions
            }
            SubmissionError::Encode(_) => vec!["Type 'submit' to try again".to_string()],
            SubmissionError::NotReady => vec!["Answer the remaining test sections first".to_string()],
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid service account key: {0}")]
    InvalidCredentials(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::InvalidCredentials(msg) => {
                format!("Service account key could not be used: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/music-focus-study/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Run 'focus-study config reset'".to_string(),
            ],
            ConfigError::InvalidCredentials(_) => vec![
                "Download a fresh JSON key for the service account".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ConfigError::ConfigDirNotFound => true,
            ConfigError::IoError(_) => true,
            ConfigError::SerializationError(_) => true,
            ConfigError::DeserializationError(_) => true,
            ConfigError::InvalidCredentials(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(RemoteError::from_status("Gemini", 429, String::new()).is_rate_limited());
        assert!(matches!(
            RemoteError::from_status("Lyria", 403, "denied".to_string()),
            RemoteError::Auth { .. }
        ));
        match RemoteError::from_status("Lyria", 500, "boom".to_string()) {
            RemoteError::Http { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("Expected Http error, got {:?}", other),
        }
    }

    #[test]
    fn test_retryable_classification() {
        let timeout = RemoteError::Timeout {
            service: "Lyria".to_string(),
            after: Duration::from_secs(120),
        };
        assert!(timeout.is_retryable());
        assert!(!RemoteError::malformed("Gemini", "bad json").is_retryable());
        assert_eq!(timeout.to_string(), "Lyria request timed out after 120s");
    }

    #[test]
    fn test_severity_levels() {
        let err = StudyError::Validation(ValidationError::MissingField {
            field: "genre".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.severity().log_level(), log::Level::Info);

        let err = StudyError::Remote(RemoteError::RateLimited { service: "Gemini".to_string() });
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_submission_failure_suggests_retry() {
        let err = SubmissionError::Store(RemoteError::Transport {
            service: "Firestore".to_string(),
            message: "connection reset".to_string(),
        });
        let suggestions = err.recovery_suggestions();
        assert!(suggestions.iter().any(|s| s.contains("submit")));
        assert!(StudyError::from(err).is_recoverable());
    }

    #[test]
    fn test_music_error_messages_mention_silence() {
        let errors = vec![
            MusicError::RateLimited { attempts: 3 },
            MusicError::TimedOut { attempts: 3 },
            MusicError::EmptyPredictions,
        ];
        for err in errors {
            assert!(err.user_message().contains("silence"));
        }
    }
}

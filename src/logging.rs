use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Environment variable controlling the log level
pub const LOG_LEVEL_ENV: &str = "FOCUS_STUDY_LOG_LEVEL";

/// Study event for logging and debugging
#[derive(Debug, Clone)]
pub struct StudyEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: StudyEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudyEventType {
    LessonRequested,
    LessonLoaded,
    LessonFailed,
    MusicGenerated,
    MusicFallback,
    RetryScheduled,
    SectionCompleted,
    SubmissionSucceeded,
    SubmissionFailed,
    SessionReset,
}

impl StudyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyEventType::LessonRequested => "LESSON_REQUESTED",
            StudyEventType::LessonLoaded => "LESSON_LOADED",
            StudyEventType::LessonFailed => "LESSON_FAILED",
            StudyEventType::MusicGenerated => "MUSIC_GENERATED",
            StudyEventType::MusicFallback => "MUSIC_FALLBACK",
            StudyEventType::RetryScheduled => "RETRY_SCHEDULED",
            StudyEventType::SectionCompleted => "SECTION_COMPLETED",
            StudyEventType::SubmissionSucceeded => "SUBMISSION_SUCCEEDED",
            StudyEventType::SubmissionFailed => "SUBMISSION_FAILED",
            StudyEventType::SessionReset => "SESSION_RESET",
        }
    }
}

/// Logger for study operations. Clones share the same event history.
#[derive(Clone)]
pub struct StudyLogger {
    events: Arc<Mutex<VecDeque<StudyEvent>>>,
    max_events: usize,
}

impl Default for StudyLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl StudyLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 500,
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "warn".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

        match log_level.to_lowercase().as_str() {
            "trace" => builder.filter_level(log::LevelFilter::Trace),
            "debug" => builder.filter_level(log::LevelFilter::Debug),
            "info" => builder.filter_level(log::LevelFilter::Info),
            "warn" => builder.filter_level(log::LevelFilter::Warn),
            "error" => builder.filter_level(log::LevelFilter::Error),
            _ => builder.filter_level(log::LevelFilter::Warn),
        };

        builder.try_init()?;

        info!("Study logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Log a study event
    pub fn log_event(&self, event_type: StudyEventType, details: String, duration: Option<Duration>) {
        match event_type {
            StudyEventType::LessonRequested => debug!("[{}] {}", event_type.as_str(), details),
            StudyEventType::LessonLoaded
            | StudyEventType::MusicGenerated
            | StudyEventType::SectionCompleted
            | StudyEventType::SubmissionSucceeded
            | StudyEventType::SessionReset => {
                info!("[{}] {} (took: {:?})", event_type.as_str(), details, duration)
            }
            StudyEventType::RetryScheduled | StudyEventType::MusicFallback => {
                warn!("[{}] {}", event_type.as_str(), details)
            }
            StudyEventType::LessonFailed | StudyEventType::SubmissionFailed => {
                error!("[{}] {}", event_type.as_str(), details)
            }
        }

        let event = StudyEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_retry(&self, operation: &str, attempt: u32, max_attempts: u32, delay: Duration, reason: &str) {
        self.log_event(
            StudyEventType::RetryScheduled,
            format!(
                "{} attempt {}/{} failed ({}), retrying in {:.1}s",
                operation,
                attempt,
                max_attempts,
                reason,
                delay.as_secs_f64()
            ),
            Some(delay),
        );
    }

    pub fn log_lesson_loaded(&self, section: &str, question_count: usize, took: Duration) {
        self.log_event(
            StudyEventType::LessonLoaded,
            format!("Lesson for {} loaded with {} questions", section, question_count),
            Some(took),
        );
    }

    pub fn log_lesson_failed(&self, section: &str, error: &str) {
        self.log_event(
            StudyEventType::LessonFailed,
            format!("Lesson for {} failed: {}", section, error),
            None,
        );
    }

    pub fn log_music_fallback(&self, reason: &str) {
        self.log_event(
            StudyEventType::MusicFallback,
            format!("Falling back to silence: {}", reason),
            None,
        );
    }

    /// Get recent events for debugging
    pub fn get_recent_events(&self, count: usize) -> Vec<StudyEvent> {
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(count);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Clear event history
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Get event statistics
    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(_) => return stats,
        };

        for event in events.iter() {
            match event.event_type {
                StudyEventType::RetryScheduled => stats.retries += 1,
                StudyEventType::LessonFailed => stats.lesson_failures += 1,
                StudyEventType::MusicFallback => stats.music_fallbacks += 1,
                StudyEventType::SubmissionFailed => stats.submission_failures += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub retries: usize,
    pub lesson_failures: usize,
    pub music_fallbacks: usize,
    pub submission_failures: usize,
}

/// Timer utility for measuring remote call durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        let logger = StudyLogger::new();

        logger.log_event(StudyEventType::SessionReset, "Test reset".to_string(), None);

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Test reset");
        assert_eq!(events[0].event_type, StudyEventType::SessionReset);
    }

    #[test]
    fn test_event_history_limit() {
        let mut logger = StudyLogger::new();
        logger.max_events = 3;

        for i in 0..5 {
            logger.log_event(StudyEventType::LessonRequested, format!("Event {}", i), None);
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_clones_share_history() {
        let logger = StudyLogger::new();
        let clone = logger.clone();

        clone.log_music_fallback("no credentials");
        assert_eq!(logger.get_recent_events(5).len(), 1);

        logger.clear_events();
        assert!(clone.get_recent_events(5).is_empty());
    }

    #[test]
    fn test_event_statistics() {
        let logger = StudyLogger::new();

        logger.log_retry("lesson", 1, 7, Duration::from_secs(5), "rate limited");
        logger.log_retry("lesson", 2, 7, Duration::from_secs(5), "rate limited");
        logger.log_music_fallback("timeout");
        logger.log_lesson_failed("section_1", "invalid json");
        logger.log_lesson_loaded("section_2", 3, Duration::from_millis(900));

        let stats = logger.get_event_statistics();
        assert_eq!(stats.total_events, 5);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.music_fallbacks, 1);
        assert_eq!(stats.lesson_failures, 1);
        assert_eq!(stats.submission_failures, 0);
    }

    #[test]
    fn test_retry_event_details() {
        let logger = StudyLogger::new();
        logger.log_retry("music", 2, 3, Duration::from_secs(3), "timeout");

        let events = logger.get_recent_events(1);
        assert_eq!(events[0].details, "music attempt 2/3 failed (timeout), retrying in 3.0s");
        assert_eq!(events[0].duration, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.finish() >= Duration::from_millis(5));
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(StudyEventType::MusicFallback.as_str(), "MUSIC_FALLBACK");
        assert_eq!(StudyEventType::RetryScheduled.as_str(), "RETRY_SCHEDULED");
    }
}

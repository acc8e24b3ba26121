//! One respondent's pass through the study.
//!
//! Pages run strictly forward: preferences, three test sections (the first
//! without music), then the summary. Lessons and music are fetched at most
//! once per section and kept until the session is reset.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::content::ContentGenerationService;
use crate::error::{SubmissionError, ValidationError};
use crate::logging::{StudyEventType, StudyLogger};
use crate::models::{Answer, AnswerRecord, LessonPayload, MusicParams, SummaryReport, UserPreferences};
use crate::music::{MusicGenerationService, MusicOutcome, MusicPromptBuilder};
use crate::results::{score_section, summarize};
use crate::store::{DocumentStore, SubmissionRecord, DEFAULT_COLLECTION};

pub const SECTION_COUNT: u8 = 3;

/// A test section, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Section(u8);

impl Section {
    pub const FIRST: Section = Section(1);
    pub const ALL: [Section; SECTION_COUNT as usize] = [Section(1), Section(2), Section(3)];

    pub fn new(number: u8) -> Option<Self> {
        (1..=SECTION_COUNT).contains(&number).then_some(Section(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// The first section is the no-music baseline
    pub fn has_music(&self) -> bool {
        self.0 > 1
    }

    pub fn label(&self) -> String {
        format!("Test Section {}", self.0)
    }

    /// Key under which answers are stored. Sections start on page 2.
    pub fn key(&self) -> String {
        format!("page_{}", self.0 + 1)
    }

    pub fn next(&self) -> Option<Section> {
        Section::new(self.0 + 1)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test Section {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Preferences,
    Test(Section),
    Summary,
}

impl Page {
    /// 1-based position in the five-page form
    pub fn number(&self) -> u8 {
        match self {
            Page::Preferences => 1,
            Page::Test(section) => section.number() + 1,
            Page::Summary => SECTION_COUNT + 2,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Page::Preferences => f.write_str("preferences"),
            Page::Test(section) => write!(f, "{}", section),
            Page::Summary => f.write_str("summary"),
        }
    }
}

/// Everything that belongs to the current respondent
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub page: Page,
    pub preferences: Option<UserPreferences>,
    pub music_params: Option<MusicParams>,
    pub lessons: HashMap<Section, LessonPayload>,
    pub music: HashMap<Section, MusicOutcome>,
    pub answers: BTreeMap<String, AnswerRecord>,
    pub summary: Option<SummaryReport>,
}

pub fn validate_preferences(prefs: &UserPreferences) -> Result<(), ValidationError> {
    if prefs.favourite_music_style.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "favourite_music_style".to_string(),
        });
    }
    if prefs.mood.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "mood".to_string() });
    }
    if prefs.seed == Some(0) {
        return Err(ValidationError::InvalidSeed);
    }
    Ok(())
}

/// Drives a session against the generation services and the result store
pub struct StudyFlow {
    state: SessionState,
    content: ContentGenerationService,
    music: MusicGenerationService,
    store: Option<Arc<dyn DocumentStore>>,
    collection: String,
    logger: StudyLogger,
}

impl StudyFlow {
    pub fn new(content: ContentGenerationService, music: MusicGenerationService, logger: StudyLogger) -> Self {
        Self {
            state: SessionState::default(),
            content,
            music,
            store: None,
            collection: DEFAULT_COLLECTION.to_string(),
            logger,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        self.store = Some(store);
        self.collection = collection.into();
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn page(&self) -> Page {
        self.state.page
    }

    pub fn music_params(&self) -> Option<&MusicParams> {
        self.state.music_params.as_ref()
    }

    pub fn summary(&self) -> Option<&SummaryReport> {
        self.state.summary.as_ref()
    }

    /// Validate and store preferences, then open the first section.
    /// On error nothing changes.
    pub fn submit_preferences(&mut self, prefs: UserPreferences) -> Result<Section, ValidationError> {
        if self.state.page != Page::Preferences {
            return Err(ValidationError::WrongStep {
                expected: self.state.page.to_string(),
                got: Page::Preferences.to_string(),
            });
        }
        validate_preferences(&prefs)?;

        self.state.music_params = Some(MusicParams::from(&prefs));
        self.state.preferences = Some(prefs);
        self.state.page = Page::Test(Section::FIRST);
        Ok(Section::FIRST)
    }

    /// The lesson for a section, generated on first request
    pub async fn lesson(&mut self, section: Section) -> Result<&LessonPayload, ValidationError> {
        if self.state.preferences.is_none() {
            return Err(ValidationError::MissingPreferences);
        }

        let lesson = match self.state.lessons.entry(section) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let lesson = self.content.load_lesson(&section.key()).await;
                entry.insert(lesson)
            }
        };
        Ok(lesson)
    }

    /// Background track for a section; `None` for the baseline section
    pub async fn music(&mut self, section: Section) -> Result<Option<&MusicOutcome>, ValidationError> {
        if !section.has_music() {
            return Ok(None);
        }
        let params = self
            .state
            .music_params
            .as_ref()
            .ok_or(ValidationError::MissingPreferences)?;

        let outcome = match self.state.music.entry(section) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let outcome = self.music.generate(params).await;
                entry.insert(outcome)
            }
        };
        Ok(Some(outcome))
    }

    /// Score the open section and move to the next page
    pub fn record_answers(&mut self, section: Section, answers: &[Option<Answer>]) -> Result<AnswerRecord, ValidationError> {
        if self.state.page != Page::Test(section) {
            return Err(ValidationError::WrongStep {
                expected: self.state.page.to_string(),
                got: section.to_string(),
            });
        }
        let lesson = self
            .state
            .lessons
            .get(&section)
            .ok_or_else(|| ValidationError::LessonNotLoaded { section: section.label() })?;

        let record = score_section(lesson, answers, &section.label(), section.has_music());
        self.logger.log_event(
            StudyEventType::SectionCompleted,
            format!("{}: {}/{}", record.section_label, record.correct_count, record.total_questions),
            None,
        );

        self.state.answers.insert(section.key(), record.clone());
        self.state.page = match section.next() {
            Some(next) => Page::Test(next),
            None => {
                self.state.summary = Some(summarize(&self.state.answers));
                Page::Summary
            }
        };
        Ok(record)
    }

    /// The document that would be stored for this session
    pub fn submission_record(&self) -> Result<SubmissionRecord, SubmissionError> {
        let (Page::Summary, Some(preferences)) = (self.state.page, self.state.preferences.as_ref()) else {
            return Err(SubmissionError::NotReady);
        };

        Ok(SubmissionRecord {
            user_info: preferences.clone(),
            music_params: self.state.music_params.clone(),
            music_prompt: self.state.music_params.as_ref().map(MusicPromptBuilder::build),
            test_answers: self.state.answers.clone(),
            summary: self.state.summary.clone(),
            submitted_at: Utc::now(),
        })
    }

    /// Store the finished session and start a fresh one. On failure the
    /// session is kept so submission can be retried.
    pub async fn submit(&mut self) -> Result<String, SubmissionError> {
        let store = self.store.clone().ok_or(SubmissionError::Disabled)?;
        let document = self.submission_record()?.to_document()?;

        match store.add(&self.collection, &document).await {
            Ok(name) => {
                self.logger
                    .log_event(StudyEventType::SubmissionSucceeded, name.clone(), None);
                self.state = SessionState::default();
                Ok(name)
            }
            Err(err) => {
                self.logger
                    .log_event(StudyEventType::SubmissionFailed, err.to_string(), None);
                Err(err)
            }
        }
    }

    /// Drop everything about the current respondent
    pub fn reset(&mut self) {
        info!("Resetting session from {}", self.state.page);
        self.state = SessionState::default();
        self.logger
            .log_event(StudyEventType::SessionReset, "session reset".to_string(), None);
    }
}

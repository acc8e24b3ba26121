use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A yes/no comprehension answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Answer::Yes => "Yes",
            Answer::No => "No",
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Answer {
    type Err = String;

    /// Exact match against the answer-key spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Yes" => Ok(Answer::Yes),
            "No" => Ok(Answer::No),
            other => Err(format!("'{}' is not Yes or No", other)),
        }
    }
}

/// One scored yes/no question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub text: String,
    pub correct_response: Answer,
}

/// A generated reading passage with its comprehension questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonPayload {
    pub passage: String,
    pub questions: Vec<QuestionItem>,
}

impl LessonPayload {
    pub const ERROR_PASSAGE: &'static str = "Error loading test.";
    pub const RATE_LIMIT_PASSAGE: &'static str = "Error loading test (rate limit).";

    /// Placeholder shown when generation fails terminally
    pub fn error_state(rate_limited: bool) -> Self {
        let passage = if rate_limited {
            Self::RATE_LIMIT_PASSAGE
        } else {
            Self::ERROR_PASSAGE
        };
        Self {
            passage: passage.to_string(),
            questions: Vec::new(),
        }
    }

    pub fn is_error_state(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Five ordered tempo levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tempo {
    VerySlow,
    Slow,
    Moderate,
    Fast,
    VeryFast,
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo::Moderate
    }
}

impl Tempo {
    pub const ALL: [Tempo; 5] = [Tempo::VerySlow, Tempo::Slow, Tempo::Moderate, Tempo::Fast, Tempo::VeryFast];

    pub fn label(&self) -> &'static str {
        match self {
            Tempo::VerySlow => "Very Slow",
            Tempo::Slow => "Slow",
            Tempo::Moderate => "Moderate",
            Tempo::Fast => "Fast",
            Tempo::VeryFast => "Very Fast",
        }
    }

    /// Parse a label, falling back to `Moderate` for anything unrecognised
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            log::warn!("Unknown tempo '{}', using {}", label, Tempo::default().label());
            Tempo::default()
        })
    }
}

impl FromStr for Tempo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_label(s);
        Tempo::ALL
            .iter()
            .copied()
            .find(|tempo| normalize_label(tempo.label()) == normalized)
            .ok_or_else(|| format!("unknown tempo '{}'", s))
    }
}

/// Five ordered volume levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Volume {
    VeryQuiet,
    Quiet,
    Moderate,
    Loud,
    VeryLoud,
}

impl Default for Volume {
    fn default() -> Self {
        Volume::Moderate
    }
}

impl Volume {
    pub const ALL: [Volume; 5] = [Volume::VeryQuiet, Volume::Quiet, Volume::Moderate, Volume::Loud, Volume::VeryLoud];

    pub fn label(&self) -> &'static str {
        match self {
            Volume::VeryQuiet => "Very Quiet",
            Volume::Quiet => "Quiet",
            Volume::Moderate => "Moderate",
            Volume::Loud => "Loud",
            Volume::VeryLoud => "Very Loud",
        }
    }

    /// Parse a label, falling back to `Moderate` for anything unrecognised
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            log::warn!("Unknown volume '{}', using {}", label, Volume::default().label());
            Volume::default()
        })
    }
}

impl FromStr for Volume {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_label(s);
        Volume::ALL
            .iter()
            .copied()
            .find(|volume| normalize_label(volume.label()) == normalized)
            .ok_or_else(|| format!("unknown volume '{}'", s))
    }
}

/// "Very Slow", "very-slow" and "VERY_SLOW" all normalize to "veryslow"
fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Everything collected on the preferences step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserPreferences {
    pub favourite_music_style: String,
    pub music_while_studying: bool,
    pub preferred_volume: Volume,
    pub tempo: Tempo,
    pub mood: String,
    pub instruments: Vec<String>,
    pub excluded_elements: String,
    pub seed: Option<u32>,
}

/// Parameters for one session's music generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicParams {
    pub genre: String,
    pub tempo: Tempo,
    pub mood: String,
    pub volume: Volume,
    pub instruments: Vec<String>,
    pub negative_prompt: String,
    pub seed: Option<u32>,
}

impl MusicParams {
    pub fn new(genre: impl Into<String>, mood: impl Into<String>) -> Self {
        Self {
            genre: genre.into(),
            tempo: Tempo::default(),
            mood: mood.into(),
            volume: Volume::default(),
            instruments: Vec::new(),
            negative_prompt: String::new(),
            seed: None,
        }
    }

    /// Positive seeds only; zero means "no seed"
    pub fn effective_seed(&self) -> Option<u32> {
        self.seed.filter(|seed| *seed > 0)
    }
}

impl From<&UserPreferences> for MusicParams {
    fn from(prefs: &UserPreferences) -> Self {
        let mut instruments: Vec<String> = Vec::new();
        for instrument in prefs.instruments.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
            if !instruments.iter().any(|known| known.eq_ignore_ascii_case(instrument)) {
                instruments.push(instrument.to_string());
            }
        }

        Self {
            genre: prefs.favourite_music_style.trim().to_string(),
            tempo: prefs.tempo,
            mood: prefs.mood.trim().to_string(),
            volume: prefs.preferred_volume,
            instruments,
            negative_prompt: prefs.excluded_elements.trim().to_string(),
            seed: prefs.seed,
        }
    }
}

/// Positive and negative descriptions fed to the music model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    pub prompt: String,
    pub negative_prompt: String,
}

/// Declared format of an audio container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bit_depth: u16,
    pub frame_count: u64,
}

impl AudioAsset {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Size of the sample payload in bytes
    pub fn payload_len(&self) -> u64 {
        self.frame_count * self.channel_count as u64 * (self.bit_depth as u64 / 8)
    }

    pub fn format_description(&self) -> String {
        let channels = match self.channel_count {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{} channels", n),
        };
        format!(
            "{:.1}kHz {}-bit {}, {:.1}s",
            self.sample_rate as f64 / 1000.0,
            self.bit_depth,
            channels,
            self.duration_secs()
        )
    }
}

/// A single question as answered by the respondent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_text: String,
    pub respondent_answer: Option<Answer>,
    pub correct_response: Answer,
}

/// One test section's answers and score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub section_label: String,
    pub had_music: bool,
    pub responses: Vec<QuestionResponse>,
    pub correct_count: usize,
    pub total_questions: usize,
}

/// Score of one section in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub score: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Final comparison between baseline and music sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub per_section: std::collections::BTreeMap<String, SectionScore>,
    pub baseline_avg: Option<f64>,
    pub music_avg: Option<f64>,
    pub improvement: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_parsing_is_exact() {
        assert_eq!("Yes".parse::<Answer>(), Ok(Answer::Yes));
        assert_eq!("No".parse::<Answer>(), Ok(Answer::No));
        assert!("yes".parse::<Answer>().is_err());
        assert!("Maybe".parse::<Answer>().is_err());
    }

    #[test]
    fn test_answer_serialization() {
        let item = QuestionItem {
            text: "Is the sky green?".to_string(),
            correct_response: Answer::No,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, r#"{"text":"Is the sky green?","correct_response":"No"}"#);
    }

    #[test]
    fn test_tempo_labels() {
        assert_eq!("Very Slow".parse::<Tempo>(), Ok(Tempo::VerySlow));
        assert_eq!("very-fast".parse::<Tempo>(), Ok(Tempo::VeryFast));
        assert_eq!(Tempo::from_label("warp speed"), Tempo::Moderate);
        for tempo in Tempo::ALL {
            assert_eq!(tempo.label().parse::<Tempo>(), Ok(tempo));
        }
    }

    #[test]
    fn test_volume_labels() {
        assert_eq!("QUIET".parse::<Volume>(), Ok(Volume::Quiet));
        assert_eq!(Volume::from_label(""), Volume::Moderate);
        assert!(Volume::Quiet < Volume::Loud);
    }

    #[test]
    fn test_music_params_from_preferences() {
        let prefs = UserPreferences {
            favourite_music_style: "  Lo-fi ".to_string(),
            mood: "Calm".to_string(),
            instruments: vec![
                "Piano".to_string(),
                "piano".to_string(),
                " ".to_string(),
                "Guitar".to_string(),
            ],
            excluded_elements: " drums ".to_string(),
            seed: Some(42),
            ..Default::default()
        };

        let params = MusicParams::from(&prefs);
        assert_eq!(params.genre, "Lo-fi");
        assert_eq!(params.instruments, vec!["Piano", "Guitar"]);
        assert_eq!(params.negative_prompt, "drums");
        assert_eq!(params.effective_seed(), Some(42));
    }

    #[test]
    fn test_zero_seed_is_ignored() {
        let mut params = MusicParams::new("Jazz", "Calm");
        params.seed = Some(0);
        assert_eq!(params.effective_seed(), None);
    }

    #[test]
    fn test_error_state_lesson() {
        let lesson = LessonPayload::error_state(true);
        assert!(lesson.is_error_state());
        assert_eq!(lesson.passage, "Error loading test (rate limit).");
        assert_eq!(LessonPayload::error_state(false).passage, "Error loading test.");
    }

    #[test]
    fn test_audio_asset_description() {
        let asset = AudioAsset {
            sample_rate: 48000,
            channel_count: 2,
            bit_depth: 16,
            frame_count: 96000,
        };
        assert_eq!(asset.duration_secs(), 2.0);
        assert_eq!(asset.payload_len(), 384000);
        assert_eq!(asset.format_description(), "48.0kHz 16-bit stereo, 2.0s");
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ErrorSeverity, StudyError};
use crate::models::{AnswerRecord, LessonPayload, PromptPair, SummaryReport, UserPreferences};
use crate::music::MusicOutcome;
use crate::session::{Page, SECTION_COUNT};

const WIDTH: usize = 57;

/// Terminal rendering of the study form
pub struct FormDisplay;

impl FormDisplay {
    /// Title line for a page of the form
    pub fn display_page_header(page: Page) {
        let title = match page {
            Page::Preferences => "Your Music Preferences".to_string(),
            Page::Test(section) if section.has_music() => format!("{} (with music)", section.label()),
            Page::Test(section) => format!("{} (no music)", section.label()),
            Page::Summary => "Summary".to_string(),
        };
        println!();
        println!("{}", Self::title_bar(&format!("Page {}/{}: {}", page.number(), SECTION_COUNT + 2, title)));
    }

    pub fn display_preferences(prefs: &UserPreferences) {
        println!("{}", Self::title_bar("Preferences"));
        println!("│ Style: {}", Self::truncate(&prefs.favourite_music_style, 48));
        println!("│ Music while studying: {}", if prefs.music_while_studying { "yes" } else { "no" });
        println!("│ Volume: {} | Tempo: {}", prefs.preferred_volume.label(), prefs.tempo.label());
        println!("│ Mood: {}", Self::truncate(&prefs.mood, 49));
        if !prefs.instruments.is_empty() {
            println!("│ Instruments: {}", Self::truncate(&prefs.instruments.join(", "), 42));
        }
        if !prefs.excluded_elements.is_empty() {
            println!("│ Avoid: {}", Self::truncate(&prefs.excluded_elements, 48));
        }
        if let Some(seed) = prefs.seed {
            println!("│ Seed: {}", seed);
        }
        println!("{}", Self::bottom_bar());
    }

    /// Passage text in a box; questions are asked separately
    pub fn display_lesson(title: &str, lesson: &LessonPayload) {
        println!("{}", Self::title_bar(title));
        for line in Self::wrap_text(&lesson.passage, WIDTH - 2) {
            println!("│ {}", line);
        }
        if lesson.is_error_state() {
            println!("│");
            println!("│ No questions could be generated for this section.");
        }
        println!("{}", Self::bottom_bar());
    }

    pub fn display_answer_key(lesson: &LessonPayload) {
        for (index, question) in lesson.questions.iter().enumerate() {
            println!("{}. {} [{}]", index + 1, question.text, question.correct_response);
        }
    }

    pub fn display_music(outcome: &MusicOutcome, saved_to: Option<&Path>) {
        match outcome {
            MusicOutcome::Generated { asset: Some(asset), .. } => {
                println!("♪ Background music: {}", asset.format_description());
            }
            MusicOutcome::Generated { wav, .. } => {
                println!("♪ Background music: {} bytes", wav.len());
            }
            MusicOutcome::Silence { reason, .. } => {
                println!("♪ {}", reason.user_message());
            }
        }
        if let Some(path) = saved_to {
            println!("  Saved to {}", path.display());
        }
    }

    pub fn display_prompt(prompt: &PromptPair) {
        println!("{}", Self::title_bar("Music Prompt"));
        for line in Self::wrap_text(&prompt.prompt, WIDTH - 2) {
            println!("│ {}", line);
        }
        println!("│");
        println!("│ Avoid:");
        for line in Self::wrap_text(&prompt.negative_prompt, WIDTH - 4) {
            println!("│   {}", line);
        }
        println!("{}", Self::bottom_bar());
    }

    pub fn display_section_score(record: &AnswerRecord) {
        println!(
            "✓ {} recorded: {}/{} correct",
            record.section_label, record.correct_count, record.total_questions
        );
    }

    pub fn display_summary(summary: &SummaryReport) {
        println!("{}", Self::title_bar("Results"));
        for (label, score) in &summary.per_section {
            println!("│ {:<16} {}/{} ({:.1}%)", label, score.score, score.total, score.percentage);
        }
        println!("│");
        println!("│ Without music: {}", Self::format_percentage(summary.baseline_avg));
        println!("│ With music:    {}", Self::format_percentage(summary.music_avg));
        println!("│ Difference:    {}", Self::format_improvement(summary.improvement));
        println!("{}", Self::bottom_bar());
    }

    /// Everything that will be submitted, shown before the submit prompt
    pub fn display_review(prefs: Option<&UserPreferences>, answers: &BTreeMap<String, AnswerRecord>) {
        if let Some(prefs) = prefs {
            Self::display_preferences(prefs);
        }
        for record in answers.values() {
            let music = if record.had_music { "with music" } else { "no music" };
            println!("{}", Self::title_bar(&format!("{} ({})", record.section_label, music)));
            for line in Self::answer_lines(record) {
                println!("│ {}", line);
            }
            println!("{}", Self::bottom_bar());
        }
    }

    /// One line per question: text, the respondent's answer and the key
    pub fn answer_lines(record: &AnswerRecord) -> Vec<String> {
        if record.responses.is_empty() {
            return vec!["No questions in this section.".to_string()];
        }
        record
            .responses
            .iter()
            .enumerate()
            .map(|(index, response)| {
                let given = response.respondent_answer.map_or("-", |answer| answer.as_str());
                let mark = if response.respondent_answer == Some(response.correct_response) { "✓" } else { "✗" };
                format!(
                    "{} {}. {} [you: {}, key: {}]",
                    mark,
                    index + 1,
                    Self::truncate(&response.question_text, 30),
                    given,
                    response.correct_response
                )
            })
            .collect()
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &StudyError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("{}", Self::title_bar(&format!("{} {}", severity_icon, severity.as_str())));
        for line in Self::wrap_text(&error.user_message(), WIDTH - 2) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), WIDTH - 4) {
                    eprintln!("│   {}", line);
                }
            }
        }
        eprintln!("{}", Self::bottom_bar());
    }

    /// One-line error for non-interactive commands
    pub fn display_simple_error(error: &StudyError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    pub fn format_percentage(value: Option<f64>) -> String {
        match value {
            Some(pct) => format!("{:.1}%", pct),
            None => "n/a".to_string(),
        }
    }

    /// Signed difference in percentage points
    pub fn format_improvement(value: Option<f64>) -> String {
        match value {
            Some(diff) => format!("{:+.1} points", diff),
            None => "n/a".to_string(),
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    /// Wrap text to fit within specified width
    pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.chars().count() + word.chars().count() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    fn title_bar(title: &str) -> String {
        let used = title.chars().count() + 5;
        format!("┌─ {} {}┐", title, "─".repeat(WIDTH.saturating_sub(used)))
    }

    fn bottom_bar() -> String {
        format!("└{}┘", "─".repeat(WIDTH - 2))
    }
}

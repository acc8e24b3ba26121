//! Turns a respondent's music parameters into a positive and a negative prompt
//! for the generative-audio model. Everything here is pure and total.

use crate::models::{MusicParams, PromptPair, Tempo, Volume};

/// Excluded from every generated track
pub const ALWAYS_EXCLUDED: [&str; 5] = ["vocals", "lyrics", "singing", "sudden changes", "jarring transitions"];

const SLOW_EXCLUSIONS: [&str; 3] = ["fast", "energetic", "upbeat"];
const FAST_EXCLUSIONS: [&str; 3] = ["slow", "meditative", "sleepy"];
const CALM_EXCLUSIONS: [&str; 3] = ["aggressive", "chaotic", "dissonant"];
const ENERGETIC_EXCLUSIONS: [&str; 3] = ["sleepy", "boring", "monotonous"];

pub fn tempo_description(tempo: Tempo) -> &'static str {
    match tempo {
        Tempo::VerySlow => "very slow tempo, meditative pace",
        Tempo::Slow => "slow tempo, relaxed pace",
        Tempo::Moderate => "moderate tempo, steady pace",
        Tempo::Fast => "fast tempo, lively pace",
        Tempo::VeryFast => "very fast tempo, driving pace",
    }
}

pub fn volume_description(volume: Volume) -> &'static str {
    match volume {
        Volume::VeryQuiet => "very soft dynamics, barely audible background",
        Volume::Quiet => "soft dynamics, gentle background level",
        Volume::Moderate => "balanced dynamics, moderate volume",
        Volume::Loud => "full dynamics, present but not overpowering",
        Volume::VeryLoud => "bold dynamics, strong presence",
    }
}

/// "featuring a", "featuring a and b", "featuring a, b, and c"
pub fn instrument_clause(instruments: &[String]) -> String {
    let names: Vec<String> = instruments
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    match names.as_slice() {
        [] => String::new(),
        [only] => format!("featuring {}", only),
        [first, second] => format!("featuring {} and {}", first, second),
        [rest @ .., last] => format!("featuring {}, and {}", rest.join(", "), last),
    }
}

/// Negative terms in first-seen order, deduplicated ignoring case
pub fn negative_terms(params: &MusicParams) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: &str| {
        let term = term.trim();
        if !term.is_empty() && !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
            terms.push(term.to_string());
        }
    };

    push(&params.negative_prompt);

    match params.tempo {
        Tempo::VerySlow => SLOW_EXCLUSIONS.iter().for_each(|t| push(*t)),
        Tempo::Fast | Tempo::VeryFast => FAST_EXCLUSIONS.iter().for_each(|t| push(*t)),
        Tempo::Slow | Tempo::Moderate => {}
    }

    let mood = params.mood.trim();
    if mood.eq_ignore_ascii_case("calm") {
        CALM_EXCLUSIONS.iter().for_each(|t| push(*t));
    } else if mood.eq_ignore_ascii_case("energetic") {
        ENERGETIC_EXCLUSIONS.iter().for_each(|t| push(*t));
    }

    ALWAYS_EXCLUDED.iter().for_each(|t| push(*t));
    terms
}

/// Builds the prompt pair sent to the music model
#[derive(Debug, Clone, Copy, Default)]
pub struct MusicPromptBuilder;

impl MusicPromptBuilder {
    pub fn build(params: &MusicParams) -> PromptPair {
        let clause = instrument_clause(&params.instruments);
        let clause = if clause.is_empty() {
            clause
        } else {
            format!(", {}", clause)
        };

        let prompt = format!(
            "{} music, {} and peaceful, {}{}, {}, instrumental, non-distracting, perfect for concentration and focus",
            params.genre.trim(),
            params.mood.trim().to_lowercase(),
            tempo_description(params.tempo),
            clause,
            volume_description(params.volume),
        );

        PromptPair {
            prompt,
            negative_prompt: negative_terms(params).join(", "),
        }
    }
}

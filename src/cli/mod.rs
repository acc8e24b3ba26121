use crate::models::{Answer, MusicParams, Tempo, UserPreferences, Volume};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod display;
pub use display::FormDisplay;

/// Music & Focus study CLI
#[derive(Parser)]
#[command(name = "focus-study")]
#[command(about = "Measures reading comprehension with and without generated background music")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Use this configuration file instead of the default one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Take the study interactively (default)
    Run,
    /// Print the music prompt built from the given parameters
    Prompt {
        #[command(flatten)]
        params: MusicArgs,
    },
    /// Generate and print one reading lesson
    Lesson,
    /// Generate background music and write it to a WAV file
    Music {
        #[command(flatten)]
        params: MusicArgs,
        /// Output file (defaults to the configured tracks directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration with secrets masked
    Show,
    /// Print the configuration file location
    Path,
    /// Overwrite the configuration file with defaults
    Reset,
}

/// Music parameters accepted by `prompt` and `music`
#[derive(Debug, Clone, PartialEq, Args)]
pub struct MusicArgs {
    /// Genre or favourite music style
    pub genre: String,
    #[arg(long, default_value = "Moderate", value_parser = parse_tempo)]
    pub tempo: Tempo,
    #[arg(long, default_value = "Calm")]
    pub mood: String,
    #[arg(long, default_value = "Moderate", value_parser = parse_volume)]
    pub volume: Volume,
    /// May be given more than once
    #[arg(long = "instrument")]
    pub instruments: Vec<String>,
    /// Elements to keep out of the music
    #[arg(long, default_value = "")]
    pub exclude: String,
    #[arg(long, value_parser = parse_seed)]
    pub seed: Option<u32>,
}

impl MusicArgs {
    /// Normalized the same way as answers from the preferences step
    pub fn to_params(&self) -> MusicParams {
        MusicParams::from(&UserPreferences {
            favourite_music_style: self.genre.clone(),
            music_while_studying: true,
            preferred_volume: self.volume,
            tempo: self.tempo,
            mood: self.mood.clone(),
            instruments: self.instruments.clone(),
            excluded_elements: self.exclude.clone(),
            seed: self.seed,
        })
    }
}

/// Words that act on the whole session from any prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Restart,
    Quit,
    Help,
    Submit,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(rest)
            } else {
                PathBuf::from(path)
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Recognize a session keyword typed at any prompt
    pub fn parse_keyword(input: &str) -> Option<Keyword> {
        match input.trim().to_lowercase().as_str() {
            "restart" => Some(Keyword::Restart),
            "quit" | "exit" => Some(Keyword::Quit),
            "help" | "?" => Some(Keyword::Help),
            "submit" => Some(Keyword::Submit),
            _ => None,
        }
    }

    /// A required free-text field
    pub fn parse_required(field: &str, input: &str) -> Result<String, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyInput {
                field: field.to_string(),
            });
        }
        Ok(trimmed.to_string())
    }

    /// Blank input leaves the question unanswered
    pub fn parse_answer(input: &str) -> Result<Option<Answer>, ParseError> {
        match input.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "y" | "yes" => Ok(Some(Answer::Yes)),
            "n" | "no" => Ok(Some(Answer::No)),
            _ => Err(ParseError::InvalidArgument {
                argument: "answer".to_string(),
                value: input.trim().to_string(),
                expected: "yes or no".to_string(),
            }),
        }
    }

    /// Yes/no question where blank input takes `default`
    pub fn parse_yes_no(input: &str, default: bool) -> Result<bool, ParseError> {
        match input.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            _ => Err(ParseError::InvalidArgument {
                argument: "choice".to_string(),
                value: input.trim().to_string(),
                expected: "yes or no".to_string(),
            }),
        }
    }

    /// Comma-separated list; empty entries are dropped
    pub fn parse_instruments(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Blank input means no seed
    pub fn parse_optional_seed(input: &str) -> Result<Option<u32>, ParseError> {
        if input.trim().is_empty() {
            Ok(None)
        } else {
            parse_seed(input).map(Some)
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("Music & Focus Study - Available Commands:");
        println!();
        println!("At any prompt:");
        println!("  restart         - Discard all answers and start over");
        println!("  quit, exit      - Leave the study");
        println!("  help            - Show this help message");
        println!();
        println!("Preferences:");
        println!("  Tempo and volume accept a level 1-5 or its name (e.g. 'Very Slow')");
        println!("  Instruments are comma separated; leave blank for none");
        println!("  Seed must be a positive number; leave blank for a random track");
        println!();
        println!("Test sections:");
        println!("  y, yes / n, no  - Answer a question");
        println!("  <enter>         - Skip a question (counted as incorrect)");
        println!();
        println!("Summary:");
        println!("  submit          - Store your results");
    }
}

/// Level 1-5 or a tempo name
pub fn parse_tempo(input: &str) -> Result<Tempo, ParseError> {
    parse_level(input, &Tempo::ALL)
        .or_else(|| input.parse().ok())
        .ok_or_else(|| ParseError::InvalidArgument {
            argument: "tempo".to_string(),
            value: input.trim().to_string(),
            expected: format!("1-5 or one of: {}", labels(Tempo::ALL.iter().map(Tempo::label))),
        })
}

/// Level 1-5 or a volume name
pub fn parse_volume(input: &str) -> Result<Volume, ParseError> {
    parse_level(input, &Volume::ALL)
        .or_else(|| input.parse().ok())
        .ok_or_else(|| ParseError::InvalidArgument {
            argument: "volume".to_string(),
            value: input.trim().to_string(),
            expected: format!("1-5 or one of: {}", labels(Volume::ALL.iter().map(Volume::label))),
        })
}

pub fn parse_seed(input: &str) -> Result<u32, ParseError> {
    match input.trim().parse::<u32>() {
        Ok(seed) if seed > 0 => Ok(seed),
        _ => Err(ParseError::InvalidArgument {
            argument: "seed".to_string(),
            value: input.trim().to_string(),
            expected: "a positive integer".to_string(),
        }),
    }
}

/// 1-based position in an ordered scale
fn parse_level<T: Copy>(input: &str, levels: &[T]) -> Option<T> {
    let level: usize = input.trim().parse().ok()?;
    level.checked_sub(1).and_then(|index| levels.get(index)).copied()
}

fn labels<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Input parsing errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("{field} is required")]
    EmptyInput { field: String },

    #[error("Invalid {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },
}

#[cfg(test)]
mod tests;

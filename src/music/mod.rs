pub mod prompt;
pub mod service;

pub use prompt::MusicPromptBuilder;
pub use service::{LyriaClient, MusicGenerationService, MusicModel, MusicOutcome};

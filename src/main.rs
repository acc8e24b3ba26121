use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::mpsc;

use music_focus_study::auth::{MissingCredentials, ServiceAccountTokenProvider, TokenProvider};
use music_focus_study::cli::{parse_tempo, parse_volume, CliApp, Commands, ConfigAction, FormDisplay, Keyword, ParseError};
use music_focus_study::config::ConfigManager;
use music_focus_study::content::{ContentGenerationService, GeminiClient, MissingApiKey, TextGenerator};
use music_focus_study::error::{ContentError, MusicError, StudyError};
use music_focus_study::logging::StudyLogger;
use music_focus_study::models::{Tempo, UserPreferences, Volume};
use music_focus_study::music::{LyriaClient, MusicGenerationService, MusicOutcome, MusicPromptBuilder};
use music_focus_study::retry::{RetryingCaller, TokioSleeper};
use music_focus_study::session::{Page, Section, StudyFlow};
use music_focus_study::store::{DocumentStore, FirestoreStore};

#[cfg(feature = "playback")]
use music_focus_study::audio::playback::BackgroundPlayer;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the interactive form stopped collecting input
enum Interrupt {
    Restart,
    Quit,
}

/// Lines typed by the respondent, read on a dedicated stdin thread so the
/// shutdown flag can be polled while waiting.
struct InputReader {
    rx: mpsc::UnboundedReceiver<String>,
    shutdown: Arc<AtomicBool>,
}

impl InputReader {
    fn spawn(shutdown: Arc<AtomicBool>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    // EOF
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { rx, shutdown }
    }

    /// One line of input; session keywords are handled here
    async fn ask(&mut self, prompt: &str) -> Result<String, Interrupt> {
        loop {
            print!("{}", prompt);
            let _ = std::io::stdout().flush();

            let line = self.next_line().await.ok_or(Interrupt::Quit)?;
            match CliApp::parse_keyword(&line) {
                Some(Keyword::Restart) => return Err(Interrupt::Restart),
                Some(Keyword::Quit) => return Err(Interrupt::Quit),
                Some(Keyword::Help) => CliApp::display_help(),
                Some(Keyword::Submit) | None => return Ok(line),
            }
        }
    }

    /// Ask until the answer parses
    async fn ask_parsed<T>(
        &mut self,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, ParseError>,
    ) -> Result<T, Interrupt> {
        loop {
            let line = self.ask(prompt).await?;
            match parse(&line) {
                Ok(value) => return Ok(value),
                Err(e) => eprintln!("  ✗ {}", e),
            }
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                biased;

                line = self.rx.recv() => return line,
                _ = interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        return None;
                    }
                }
            }
        }
    }
}

/// Main application controller that wires configuration to the study services
pub struct StudyApp {
    config_manager: ConfigManager,
    logger: StudyLogger,
}

impl StudyApp {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, StudyError> {
        if let Err(e) = StudyLogger::init() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = match config_path {
            Some(path) => ConfigManager::with_path(CliApp::expand_path(&path.to_string_lossy()))?,
            None => ConfigManager::new()?,
        };
        info!("Using configuration at {}", config_manager.config_path().display());

        Ok(Self {
            config_manager,
            logger: StudyLogger::new(),
        })
    }

    /// Execute a single command
    pub async fn execute_command(&mut self, command: Commands) -> Result<(), StudyError> {
        match command {
            Commands::Run => self.run_interactive_mode().await?,
            Commands::Prompt { params } => {
                FormDisplay::display_prompt(&MusicPromptBuilder::build(&params.to_params()));
            }
            Commands::Lesson => {
                if let Some(reason) = self.missing_api_key() {
                    return Err(ContentError::NotConfigured(reason).into());
                }
                let content = self.content_service();
                println!("Generating lesson...");
                let lesson = content.generate().await?;
                FormDisplay::display_lesson("Lesson", &lesson);
                FormDisplay::display_answer_key(&lesson);
            }
            Commands::Music { params, output } => {
                let (credentials, key_project) = self.credentials();
                let service = self.music_service(credentials, key_project);
                println!("Generating music...");
                let (wav, prompt) = service.try_generate(&params.to_params()).await?;

                let path = match output {
                    Some(path) => path,
                    None => self.tracks_dir()?.join(format!("music-{}.wav", Utc::now().format("%Y%m%d-%H%M%S"))),
                };
                std::fs::write(&path, &wav)?;

                let outcome = MusicOutcome::Generated {
                    asset: music_focus_study::audio::probe(&wav).ok(),
                    wav,
                    prompt,
                };
                FormDisplay::display_music(&outcome, Some(&path));
            }
            Commands::Config { action } => match action {
                ConfigAction::Show => println!("{}", self.config_manager.describe()),
                ConfigAction::Path => println!("{}", self.config_manager.config_path().display()),
                ConfigAction::Reset => {
                    self.config_manager.reset_to_defaults()?;
                    println!("OK: Configuration reset to defaults");
                }
            },
        }

        Ok(())
    }

    /// Run the five-page form until the respondent quits
    pub async fn run_interactive_mode(&mut self) -> Result<(), StudyError> {
        let mut flow = self.build_flow();

        println!("Music & Focus Study v0.1.0");
        println!("Read three short passages and answer yes/no questions about them.");
        println!("The first section is silent; the other two come with music made for you.");
        println!("Type 'help' for commands, 'restart' to start over, 'quit' to leave.");

        let shutdown = Arc::new(AtomicBool::new(false));
        let handler_flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nReceived interrupt signal. Shutting down gracefully...");
            handler_flag.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let mut input = InputReader::spawn(shutdown);
        loop {
            match self.run_pages(&mut flow, &mut input).await {
                Interrupt::Restart => {
                    flow.reset();
                    println!("Starting over.");
                }
                Interrupt::Quit => break,
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Walk the pages from wherever the session currently is
    async fn run_pages(&self, flow: &mut StudyFlow, input: &mut InputReader) -> Interrupt {
        loop {
            let step = match flow.page() {
                Page::Preferences => self.preferences_page(flow, input).await,
                Page::Test(section) => self.section_page(flow, input, section).await,
                Page::Summary => self.summary_page(flow, input).await,
            };
            if let Err(interrupt) = step {
                return interrupt;
            }
        }
    }

    async fn preferences_page(&self, flow: &mut StudyFlow, input: &mut InputReader) -> Result<(), Interrupt> {
        FormDisplay::display_page_header(Page::Preferences);
        println!("Tempo:  {}", scale(Tempo::ALL.iter().map(Tempo::label)));
        println!("Volume: {}", scale(Volume::ALL.iter().map(Volume::label)));

        let favourite_music_style = input
            .ask_parsed("Favourite music style: ", |s| CliApp::parse_required("Music style", s))
            .await?;
        let music_while_studying = input
            .ask_parsed("Do you usually listen to music while studying? [y/N]: ", |s| {
                CliApp::parse_yes_no(s, false)
            })
            .await?;
        let preferred_volume = input
            .ask_parsed("Preferred volume [Moderate]: ", |s| with_default(s, Volume::default(), parse_volume))
            .await?;
        let tempo = input
            .ask_parsed("Tempo [Moderate]: ", |s| with_default(s, Tempo::default(), parse_tempo))
            .await?;
        let mood = input
            .ask_parsed("Mood (e.g. Calm, Focused, Uplifting): ", |s| CliApp::parse_required("Mood", s))
            .await?;
        let instruments = CliApp::parse_instruments(&input.ask("Instruments (comma separated, optional): ").await?);
        let excluded_elements = input.ask("Anything to keep out of the music (optional): ").await?;
        let seed = input
            .ask_parsed("Seed for repeatable music (optional): ", CliApp::parse_optional_seed)
            .await?;

        let prefs = UserPreferences {
            favourite_music_style,
            music_while_studying,
            preferred_volume,
            tempo,
            mood,
            instruments,
            excluded_elements: excluded_elements.trim().to_string(),
            seed,
        };
        FormDisplay::display_preferences(&prefs);

        if let Err(e) = flow.submit_preferences(prefs) {
            self.handle_error(&e.into());
        }
        Ok(())
    }

    async fn section_page(&self, flow: &mut StudyFlow, input: &mut InputReader, section: Section) -> Result<(), Interrupt> {
        FormDisplay::display_page_header(Page::Test(section));
        let volume = flow
            .state()
            .preferences
            .as_ref()
            .map(|prefs| prefs.preferred_volume)
            .unwrap_or_default();

        // Dropping the player stops the music when the section ends
        let _player = if section.has_music() {
            println!("Generating background music...");
            match flow.music(section).await {
                Ok(Some(outcome)) => self.present_music(section, outcome, volume),
                Ok(None) => None,
                Err(e) => {
                    self.handle_error(&e.into());
                    None
                }
            }
        } else {
            None
        };

        println!("Loading test...");
        let lesson = match flow.lesson(section).await {
            Ok(lesson) => lesson.clone(),
            Err(e) => {
                self.handle_error(&e.into());
                return Err(Interrupt::Restart);
            }
        };
        FormDisplay::display_lesson(&section.label(), &lesson);

        let mut answers = Vec::with_capacity(lesson.questions.len());
        for (index, question) in lesson.questions.iter().enumerate() {
            println!("{}. {}", index + 1, question.text);
            let answer = input
                .ask_parsed("   Your answer (y/n, enter to skip): ", CliApp::parse_answer)
                .await?;
            answers.push(answer);
        }
        if lesson.is_error_state() {
            input.ask("Press enter to continue: ").await?;
        }

        match flow.record_answers(section, &answers) {
            Ok(record) => FormDisplay::display_section_score(&record),
            Err(e) => self.handle_error(&e.into()),
        }
        Ok(())
    }

    async fn summary_page(&self, flow: &mut StudyFlow, input: &mut InputReader) -> Result<(), Interrupt> {
        FormDisplay::display_page_header(Page::Summary);
        let state = flow.state();
        FormDisplay::display_review(state.preferences.as_ref(), &state.answers);
        if let Some(summary) = flow.summary() {
            FormDisplay::display_summary(summary);
        }

        loop {
            let line = input
                .ask("Type 'submit' to store your results or 'restart' to discard them: ")
                .await?;
            if CliApp::parse_keyword(&line) != Some(Keyword::Submit) {
                continue;
            }

            match flow.submit().await {
                Ok(name) => {
                    info!("Submission stored as {}", name);
                    println!("✓ Thank you! Your results have been stored.");
                    return Ok(());
                }
                Err(e) => self.handle_error(&e.into()),
            }
        }
    }

    /// Save the section track and start it playing; returns the live player
    fn present_music(&self, section: Section, outcome: &MusicOutcome, volume: Volume) -> Option<BackgroundPlayer> {
        let saved = match self.write_track(section, outcome.wav()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not save track for {}: {}", section, e);
                None
            }
        };
        FormDisplay::display_music(outcome, saved.as_deref());

        if outcome.is_silence() || !self.config_manager.get_config().output.play_music {
            return None;
        }
        self.start_playback(outcome, volume)
    }

    #[cfg(feature = "playback")]
    fn start_playback(&self, outcome: &MusicOutcome, volume: Volume) -> Option<BackgroundPlayer> {
        match BackgroundPlayer::start(outcome.wav(), volume) {
            Ok(player) => Some(player),
            Err(e) => {
                self.handle_error(&e.into());
                None
            }
        }
    }

    #[cfg(not(feature = "playback"))]
    fn start_playback(&self, _outcome: &MusicOutcome, _volume: Volume) -> Option<BackgroundPlayer> {
        info!("Built without the playback feature; open the saved track to listen");
        None
    }

    fn write_track(&self, section: Section, wav: &[u8]) -> Result<PathBuf, StudyError> {
        let path = self.tracks_dir()?.join(format!(
            "{}-section-{}.wav",
            Utc::now().format("%Y%m%d-%H%M%S"),
            section.number()
        ));
        std::fs::write(&path, wav)?;
        Ok(path)
    }

    fn tracks_dir(&self) -> Result<PathBuf, StudyError> {
        let configured = &self.config_manager.get_config().output.directory;
        let dir = CliApp::expand_path(&configured.to_string_lossy());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn build_flow(&self) -> StudyFlow {
        let content = self.content_service();
        let (credentials, key_project) = self.credentials();
        let music = self.music_service(credentials.clone(), key_project.clone());

        let flow = StudyFlow::new(content, music, self.logger.clone());
        let store_config = &self.config_manager.get_config().store;
        if !store_config.enabled {
            info!("Result submission is disabled");
            return flow;
        }
        match store_config.project_id.clone().or(key_project) {
            Some(project) => {
                let store: Arc<dyn DocumentStore> =
                    Arc::new(FirestoreStore::new(project, credentials, store_config.request_timeout()));
                flow.with_store(store, store_config.collection.clone())
            }
            None => {
                warn!("No project configured for result submission; results will not be stored");
                flow
            }
        }
    }

    /// Description of the missing API key setting, if there is no key
    fn missing_api_key(&self) -> Option<String> {
        let text = &self.config_manager.get_config().text_generation;
        match text.resolve_api_key() {
            Some(_) => None,
            None => Some(format!("the API key (${} or text_generation.api_key)", text.api_key_env)),
        }
    }

    /// Lessons fall back to the error state when no API key is configured
    fn content_service(&self) -> ContentGenerationService {
        let text = &self.config_manager.get_config().text_generation;
        let generator: Arc<dyn TextGenerator> = match text.resolve_api_key() {
            Some(api_key) => Arc::new(GeminiClient::new(&text.endpoint, &text.model, api_key, text.request_timeout())),
            None => {
                let reason = self.missing_api_key().unwrap_or_default();
                warn!("Text generation is not configured: {}; lessons will not load", reason);
                Arc::new(MissingApiKey::new(format!("{} is not set", reason)))
            }
        };
        let caller = RetryingCaller::new(text.retry_policy(), Arc::new(TokioSleeper), self.logger.clone());
        ContentGenerationService::new(generator, caller, self.logger.clone())
    }

    /// Service-account credentials and the key's project, if a key is configured
    fn credentials(&self) -> (Arc<dyn TokenProvider>, Option<String>) {
        let Some(path) = &self.config_manager.get_config().credentials.service_account_path else {
            return (
                Arc::new(MissingCredentials::new("credentials.service_account_path is not set")),
                None,
            );
        };

        let path = CliApp::expand_path(&path.to_string_lossy());
        match ServiceAccountTokenProvider::from_file(&path, TOKEN_TIMEOUT) {
            Ok(provider) => {
                let project = provider.project_id().map(str::to_string);
                (Arc::new(provider), project)
            }
            Err(e) => {
                warn!("Could not load service account key {}: {}", path.display(), e);
                (Arc::new(MissingCredentials::new(e.to_string())), None)
            }
        }
    }

    fn music_service(&self, credentials: Arc<dyn TokenProvider>, key_project: Option<String>) -> MusicGenerationService {
        let music = &self.config_manager.get_config().music_generation;
        let project = music.project_id.clone().or(key_project);

        let service = match project.filter(|_| music.enabled) {
            None => {
                let reason = if music.enabled {
                    "set music_generation.project_id or a service account key"
                } else {
                    "music_generation.enabled is false"
                };
                MusicGenerationService::unavailable(MusicError::NotConfigured(reason.to_string()), self.logger.clone())
            }
            Some(project) => {
                let client = LyriaClient::for_project(&project, &music.location, &music.model, music.request_timeout());
                let caller = RetryingCaller::new(music.retry_policy(), Arc::new(TokioSleeper), self.logger.clone());
                MusicGenerationService::new(Arc::new(client), credentials, caller, self.logger.clone())
            }
        };
        service.with_silence_duration(music.silence_duration())
    }

    /// Log and show an error without leaving the session
    fn handle_error(&self, error: &StudyError) {
        log::log!(error.severity().log_level(), "{}", error);
        FormDisplay::display_error(error);
        if !error.is_recoverable() {
            eprintln!("⚠  This needs a configuration change before it will work.");
        }
    }

    fn shutdown(&self) {
        let stats = self.logger.get_event_statistics();
        info!(
            "Session events: {} total, {} retries, {} lesson failures, {} music fallbacks, {} failed submissions",
            stats.total_events, stats.retries, stats.lesson_failures, stats.music_fallbacks, stats.submission_failures
        );
        println!("Goodbye!");
    }
}

/// Stands in for the audio player when built without output support
#[cfg(not(feature = "playback"))]
struct BackgroundPlayer;

fn scale<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels
        .enumerate()
        .map(|(i, label)| format!("{}={}", i + 1, label))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Blank input takes `default`
fn with_default<T>(input: &str, default: T, parse: impl Fn(&str) -> Result<T, ParseError>) -> Result<T, ParseError> {
    if input.trim().is_empty() {
        Ok(default)
    } else {
        parse(input)
    }
}

#[tokio::main]
async fn main() {
    let cli = CliApp::parse();

    let mut app = match StudyApp::new(cli.config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            FormDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Run);
    if let Err(e) = app.execute_command(command).await {
        error!("{}", e);
        FormDisplay::display_error(&e);
        std::process::exit(1);
    }
}

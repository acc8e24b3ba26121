#[cfg(test)]
mod tests {
    use crate::cli::{
        parse_seed, parse_tempo, parse_volume, CliApp, Commands, ConfigAction, Keyword, ParseError,
    };
    use crate::models::{Answer, Tempo, Volume};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_no_subcommand_means_interactive() {
        let cli = CliApp::try_parse_from(["focus-study"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());

        let cli = CliApp::try_parse_from(["focus-study", "run"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = CliApp::try_parse_from(["focus-study", "lesson", "--config", "/tmp/study.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/study.toml")));
        assert!(matches!(cli.command, Some(Commands::Lesson)));
    }

    #[test]
    fn test_prompt_command_defaults() {
        let cli = CliApp::try_parse_from(["focus-study", "prompt", "Jazz"]).unwrap();
        match cli.command {
            Some(Commands::Prompt { params }) => {
                assert_eq!(params.genre, "Jazz");
                assert_eq!(params.tempo, Tempo::Moderate);
                assert_eq!(params.volume, Volume::Moderate);
                assert_eq!(params.mood, "Calm");
                assert!(params.instruments.is_empty());
                assert_eq!(params.seed, None);
            }
            _ => panic!("Expected Prompt command"),
        }
    }

    #[test]
    fn test_music_command_with_options() {
        let cli = CliApp::try_parse_from([
            "focus-study",
            "music",
            "Lo-fi",
            "--tempo",
            "very slow",
            "--volume",
            "2",
            "--instrument",
            "Piano",
            "--instrument",
            "Rain sounds",
            "--exclude",
            "vocals",
            "--seed",
            "42",
            "-o",
            "track.wav",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Music { params, output }) => {
                assert_eq!(params.tempo, Tempo::VerySlow);
                assert_eq!(params.volume, Volume::Quiet);
                assert_eq!(params.instruments, vec!["Piano", "Rain sounds"]);
                assert_eq!(output, Some(PathBuf::from("track.wav")));

                let music = params.to_params();
                assert_eq!(music.genre, "Lo-fi");
                assert_eq!(music.negative_prompt, "vocals");
                assert_eq!(music.effective_seed(), Some(42));
            }
            _ => panic!("Expected Music command"),
        }
    }

    #[test]
    fn test_music_command_rejects_zero_seed() {
        assert!(CliApp::try_parse_from(["focus-study", "music", "Jazz", "--seed", "0"]).is_err());
        assert!(CliApp::try_parse_from(["focus-study", "prompt", "Jazz", "--tempo", "warp"]).is_err());
    }

    #[test]
    fn test_config_subcommands() {
        for (word, expected) in [("show", "Show"), ("path", "Path"), ("reset", "Reset")] {
            let cli = CliApp::try_parse_from(["focus-study", "config", word]).unwrap();
            match cli.command {
                Some(Commands::Config { action }) => assert_eq!(format!("{:?}", action), expected),
                _ => panic!("Expected Config command"),
            }
        }
        assert!(matches!(
            CliApp::try_parse_from(["focus-study", "config", "show"]).unwrap().command,
            Some(Commands::Config { action: ConfigAction::Show })
        ));
    }

    #[test]
    fn test_parse_keyword() {
        assert_eq!(CliApp::parse_keyword("restart"), Some(Keyword::Restart));
        assert_eq!(CliApp::parse_keyword("  QUIT "), Some(Keyword::Quit));
        assert_eq!(CliApp::parse_keyword("exit"), Some(Keyword::Quit));
        assert_eq!(CliApp::parse_keyword("help"), Some(Keyword::Help));
        assert_eq!(CliApp::parse_keyword("submit"), Some(Keyword::Submit));
        assert_eq!(CliApp::parse_keyword("jazz"), None);
        assert_eq!(CliApp::parse_keyword(""), None);
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(CliApp::parse_answer("y"), Ok(Some(Answer::Yes)));
        assert_eq!(CliApp::parse_answer("YES"), Ok(Some(Answer::Yes)));
        assert_eq!(CliApp::parse_answer(" n "), Ok(Some(Answer::No)));
        assert_eq!(CliApp::parse_answer("no"), Ok(Some(Answer::No)));
        assert_eq!(CliApp::parse_answer(""), Ok(None));

        match CliApp::parse_answer("maybe") {
            Err(ParseError::InvalidArgument { argument, value, .. }) => {
                assert_eq!(argument, "answer");
                assert_eq!(value, "maybe");
            }
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_yes_no_default() {
        assert_eq!(CliApp::parse_yes_no("", true), Ok(true));
        assert_eq!(CliApp::parse_yes_no("", false), Ok(false));
        assert_eq!(CliApp::parse_yes_no("n", true), Ok(false));
        assert!(CliApp::parse_yes_no("sometimes", true).is_err());
    }

    #[test]
    fn test_parse_required() {
        assert_eq!(CliApp::parse_required("mood", "  Calm "), Ok("Calm".to_string()));
        assert_eq!(
            CliApp::parse_required("mood", "   "),
            Err(ParseError::EmptyInput { field: "mood".to_string() })
        );
    }

    #[test]
    fn test_parse_instruments() {
        assert_eq!(
            CliApp::parse_instruments("Piano, Guitar ,, Strings"),
            vec!["Piano", "Guitar", "Strings"]
        );
        assert!(CliApp::parse_instruments("").is_empty());
        assert!(CliApp::parse_instruments(" , ").is_empty());
    }

    #[test]
    fn test_parse_tempo_and_volume() {
        assert_eq!(parse_tempo("1"), Ok(Tempo::VerySlow));
        assert_eq!(parse_tempo("5"), Ok(Tempo::VeryFast));
        assert_eq!(parse_tempo("Fast"), Ok(Tempo::Fast));
        assert!(parse_tempo("0").is_err());
        assert!(parse_tempo("6").is_err());
        assert!(parse_tempo("brisk").is_err());

        assert_eq!(parse_volume("3"), Ok(Volume::Moderate));
        assert_eq!(parse_volume("very loud"), Ok(Volume::VeryLoud));
        assert!(parse_volume("11").is_err());
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Ok(42));
        assert_eq!(parse_seed(" 7 "), Ok(7));
        assert!(parse_seed("0").is_err());
        assert!(parse_seed("-3").is_err());
        assert!(parse_seed("abc").is_err());

        assert_eq!(CliApp::parse_optional_seed(""), Ok(None));
        assert_eq!(CliApp::parse_optional_seed("9"), Ok(Some(9)));
        assert!(CliApp::parse_optional_seed("0").is_err());
    }

    #[test]
    fn test_error_display() {
        let error = ParseError::InvalidArgument {
            argument: "seed".to_string(),
            value: "0".to_string(),
            expected: "a positive integer".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid seed: got '0', expected a positive integer");

        let error = ParseError::EmptyInput { field: "Mood".to_string() };
        assert_eq!(error.to_string(), "Mood is required");
    }
}

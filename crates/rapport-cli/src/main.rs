use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use rapport_core::{load_config, load_lexicon, Collaborators, Orchestrator, RapportConfig};
use rapport_provider::{LlmProvider, StubProvider};
use rapport_schema::{Policy, SessionKey, Signal};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "rapport", version, about = "Emotionally-aware conversational replies")]
struct Cli {
    #[arg(
        long,
        short = 'c',
        default_value = "rapport.yaml",
        help = "Path to the YAML config file"
    )]
    config: PathBuf,

    #[arg(long, help = "Also write daily-rotated logs into this directory")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the signal and policy for a message as JSON (no generation)")]
    Analyze {
        #[arg(required = true, trailing_var_arg = true, help = "Message text")]
        text: Vec<String>,
    },
    #[command(about = "Local REPL against the configured provider")]
    Chat {
        #[arg(long, default_value = "local", help = "Session id")]
        session: String,
        #[arg(long, help = "Use the stub provider and skip classifier/knowledge calls")]
        offline: bool,
        #[arg(long, short = 'v', help = "Show state and rule for every reply")]
        verbose: bool,
    },
    #[command(about = "Validate the config file")]
    Validate,
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    signal: &'a Signal,
    policy: Option<&'a Policy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = resolve_config(&cli.config, true)?;
            let lexicon = load_lexicon(&config)?;
            println!(
                "Config valid. provider {:?} model {}, classifier {}, knowledge {}, lexicon v{}.",
                config.provider.provider_type,
                config.provider.model,
                on_off(config.classifier.enabled),
                on_off(config.knowledge.enabled),
                lexicon.version
            );
        }
        Commands::Analyze { text } => {
            let config = resolve_config(&cli.config, false)?;
            let orchestrator = build_orchestrator(&config, Arc::new(StubProvider))?;
            let (signal, policy) = orchestrator.analyze(&text.join(" ")).await;
            let output = AnalyzeOutput {
                signal: &signal,
                policy: policy.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Chat {
            session,
            offline,
            verbose,
        } => {
            let mut config = resolve_config(&cli.config, false)?;
            let orchestrator = if offline {
                offline_config(&mut config);
                build_orchestrator(&config, Arc::new(StubProvider))?
            } else {
                Orchestrator::from_config(&config)?
            };
            run_repl(&orchestrator, SessionKey::new(session), verbose).await?;
        }
    }

    Ok(())
}

fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "rapport.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Loads `path`. A missing file falls back to defaults unless `required`.
fn resolve_config(path: &Path, required: bool) -> Result<RapportConfig> {
    if path.exists() {
        return load_config(path);
    }
    if required {
        return Err(anyhow!("config file not found: {}", path.display()));
    }
    tracing::info!("No config at {}, using defaults", path.display());
    Ok(RapportConfig::default())
}

fn offline_config(config: &mut RapportConfig) {
    config.classifier.enabled = false;
    config.knowledge.enabled = false;
}

fn build_orchestrator(
    config: &RapportConfig,
    provider: Arc<dyn LlmProvider>,
) -> Result<Orchestrator> {
    let lexicon = load_lexicon(config)?;
    Ok(Orchestrator::new(
        config,
        lexicon,
        Collaborators::with_provider(config, provider),
    ))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

async fn run_repl(orchestrator: &Orchestrator, session: SessionKey, verbose: bool) -> Result<()> {
    println!("rapport REPL (session {session}). Type 'quit' to exit.");
    println!("---");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let reply = orchestrator.handle_message(&session, input).await;
        if verbose {
            let rule = reply
                .policy
                .as_ref()
                .map(|p| p.rule_id.as_str())
                .unwrap_or("none");
            println!("[{} / {}]", reply.overall_state, rule);
        }
        println!("{}", reply.reply);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_joins_trailing_words() {
        let cli = Cli::try_parse_from(["rapport", "analyze", "im", "so", "cooked"]).unwrap();
        match cli.command {
            Some(Commands::Analyze { text }) => assert_eq!(text.join(" "), "im so cooked"),
            _ => panic!("expected analyze"),
        }
        assert_eq!(cli.config, PathBuf::from("rapport.yaml"));
    }

    #[test]
    fn chat_flags_parse() {
        let cli = Cli::try_parse_from([
            "rapport", "--config", "x.yaml", "chat", "--session", "abc", "--offline",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Chat {
                session,
                offline,
                verbose,
            }) => {
                assert_eq!(session, "abc");
                assert!(offline);
                assert!(!verbose);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn missing_config_only_fails_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(resolve_config(&path, true).is_err());
        let config = resolve_config(&path, false).unwrap();
        assert_eq!(config.session.max_turns, 50);
    }

    #[test]
    fn offline_disables_remote_collaborators() {
        let mut config = RapportConfig::default();
        config.classifier.enabled = true;
        offline_config(&mut config);
        assert!(!config.classifier.enabled);
        assert!(!config.knowledge.enabled);
    }

    #[tokio::test]
    async fn offline_orchestrator_analyzes_without_network() {
        let mut config = RapportConfig::default();
        offline_config(&mut config);
        let orchestrator = build_orchestrator(&config, Arc::new(StubProvider)).unwrap();
        let (signal, policy) = orchestrator.analyze("bye!").await;
        assert_eq!(signal.language, "en");
        assert_eq!(policy.unwrap().rule_id.as_str(), "goodbye");
    }
}

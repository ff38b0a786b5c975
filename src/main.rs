use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use medqa::answer::Question;
use medqa::cli::{Cli, Commands, ConfigAction};
use medqa::client::MedqaClient;
use medqa::config::Config;
use medqa::model::load_backend;
use medqa::server::protocol::ReadyStatus;
use medqa::service::InferenceService;
use medqa::service::availability::ModelState;
use medqa::text::TextChain;
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            serve(config).await?;
        }
        Some(Commands::Serve {
            host,
            port,
            timeout,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(timeout) = timeout {
                config.server.generation_timeout = timeout;
            }
            serve(config).await?;
        }
        Some(Commands::Ask { question }) => {
            let config = load_config(cli.config.as_deref())?;
            handle_ask(config, &question).await?;
        }
        Some(Commands::Status { url }) => {
            handle_status(&url).await?;
        }
        Some(Commands::Query { question, url }) => {
            let answer = MedqaClient::new(&url).ask(&question).await?;
            println!("{answer}");
        }
        Some(Commands::Clean { text }) => {
            let input = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            println!("{}", TextChain::answer_normalization().apply(&input));
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "medqa", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise -q → warn, default → info, -v → debug, -vv → trace.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/medqa/config.toml)
/// 3. Built-in defaults
///
/// Environment overrides apply on top; the result is validated.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config");
            Config::load(path)?
        }
        None => {
            let default_path = Config::default_path();
            tracing::debug!(path = %default_path.display(), "Loading config if present");
            Config::load_or_default(&default_path)?
        }
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(
        version = %medqa::version_string(),
        backend = medqa::defaults::compute_backend(),
        "Starting medqa"
    );
    let model_config = config.model.clone();
    medqa::server::run_server(config, move || load_backend(&model_config)).await?;
    Ok(())
}

/// Load the model in-process and answer a single question.
async fn handle_ask(config: Config, question: &str) -> Result<()> {
    let question = Question::parse(question)?;
    let timeout = config.server.generation_timeout()?;
    let service = Arc::new(InferenceService::new(&config));

    let loading = Arc::clone(&service);
    let model_config = config.model.clone();
    let state = tokio::task::spawn_blocking(move || {
        loading.load_with(move || load_backend(&model_config))
    })
    .await
    .context("Model load task failed")??;

    if state != ModelState::Ready {
        anyhow::bail!("{}", service.status_message());
    }

    let answer = service.answer_blocking(question, timeout).await?;
    println!("{answer}");
    Ok(())
}

async fn handle_status(url: &str) -> Result<()> {
    let client = MedqaClient::new(url);
    match client.status().await {
        Ok(status) => {
            let label = match status.status {
                ReadyStatus::Ready => "ready".green().to_string(),
                ReadyStatus::NotReady => "not ready".yellow().to_string(),
            };
            println!("Status:");
            println!("  {}  {}", "Server:".dimmed(), client.base_url());
            println!("  {}   {}", "Model:".dimmed(), label);
            println!("  {} {}", "Message:".dimmed(), status.message);
            if status.status == ReadyStatus::NotReady {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{}", format!("Failed to reach server: {e}").red());
            eprintln!("Is the server running? Start it with: medqa serve");
            std::process::exit(2);
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Get { key } => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            match config.get_value_by_path(&key) {
                Ok(value) => println!("{value}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::List => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Dump => {
            print!("{}", Config::default().to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

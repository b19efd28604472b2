//! Mise CLI - chat with a recipe assistant that remembers you

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mise::cli::{Cli, Command};
use mise::config::Config;
use mise::context::AppContext;
use mise::error::Result;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let format = cli.output_format();

    let mut config = load_config(cli.config.clone())?;
    config.apply_env_overrides();
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    let ctx = AppContext::open(config, cli.ephemeral).await?;

    match &cli.command {
        Command::Chat(cmd) => cmd.execute(&ctx).await,
        Command::Ask(cmd) => cmd.execute(&ctx, format).await,
        Command::Memory(cmd) => cmd.execute(ctx.memory().as_ref(), format).await,
        Command::Index(cmd) => cmd.execute(&ctx, format).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mise=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_config(path: &Path) -> Result<Config> {
    tracing::info!("Loading config from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        mise::MiseError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| mise::MiseError::Config(format!("Failed to parse config: {e}")))
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        return read_config(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".mise").join("config.toml")),
        dirs::config_dir().map(|c| c.join("mise").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return read_config(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

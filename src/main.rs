// Entrypoint for the `uploader` CLI.
// - Parses arguments, installs logging, resolves credentials.
// - Hands the actual work to `ui`, which prints results for the user.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use strava_uploader::api::{StravaClient, UploadRequest};
use strava_uploader::config::{default_config_path, StravaConfig};
use strava_uploader::ui;
use strava_uploader::upload::UploadOptions;
use tracing::{debug, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "uploader")]
#[command(about = "Upload FIT files to Strava")]
#[command(version)]
struct Cli {
    /// FIT file to upload.
    #[arg(conflicts_with = "multiple")]
    file: Option<PathBuf>,

    /// Activity name.
    #[arg(long, conflicts_with = "multiple")]
    name: Option<String>,

    /// Activity description.
    #[arg(long, conflicts_with = "multiple")]
    description: Option<String>,

    /// Activity type.
    #[arg(long = "type", default_value = "Swim")]
    activity_type: String,

    /// Upload every file matching a pattern (e.g. "output/*.fit").
    #[arg(long, value_name = "GLOB")]
    multiple: Option<String>,

    /// Config file (default: ./strava_config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the OAuth flow and write the tokens to the config file.
    Authorize,
    /// Swap the stored refresh token for a new access token.
    Refresh,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set.
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    debug!(path = %config_path.display(), "using config");
    let mut client = StravaClient::from_env().context("Failed to build HTTP client")?;

    match cli.command {
        Some(Commands::Authorize) => {
            ui::authorize(&client, &config_path)?;
            return Ok(true);
        }
        Some(Commands::Refresh) => {
            ui::refresh(&client, &config_path)?;
            return Ok(true);
        }
        None => {}
    }

    if cli.file.is_none() && cli.multiple.is_none() {
        anyhow::bail!("Nothing to upload: give a FIT file or --multiple <GLOB>");
    }

    ui::banner("STRAVA FIT FILE UPLOADER");

    let config = StravaConfig::resolve(&config_path)
        .with_context(|| format!("Reading {}", config_path.display()))?;
    let token = match config.require_token() {
        Ok(token) => token,
        Err(_) => {
            ui::print_missing_token_help();
            return Ok(false);
        }
    };
    if config.is_expired(chrono::Utc::now().timestamp()) {
        warn!("access token looks expired; run `uploader refresh` if the upload is rejected");
    }
    client.set_token(token);

    let opts = UploadOptions::default();
    if let Some(pattern) = cli.multiple {
        return ui::run_multiple(&client, &pattern, &cli.activity_type, &opts);
    }

    let Some(file) = cli.file else {
        return Ok(false);
    };
    let req = UploadRequest {
        file,
        name: cli.name,
        description: cli.description,
        activity_type: cli.activity_type,
    };
    Ok(ui::run_single(&client, &req, &opts))
}

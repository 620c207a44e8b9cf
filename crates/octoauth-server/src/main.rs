use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, parser::ValueSource};

use octoauth_core::SweepReport;
use octoauth_core::secret::{generate_client_secret, hash_secret};
use octoauth_server::cli::{Cli, Commands, SweepArgs};
use octoauth_server::config::AppConfig;
use octoauth_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use octoauth_server::{ServerBuilder, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From OCTOAUTH_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (octoauth.toml)
    Default,
}

impl From<Option<ValueSource>> for ConfigSource {
    fn from(source: Option<ValueSource>) -> Self {
        match source {
            Some(ValueSource::CommandLine) => Self::CliArgument,
            Some(ValueSource::EnvVariable) => Self::EnvironmentVariable,
            _ => Self::Default,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (OCTOAUTH_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let source = ConfigSource::from(matches.value_source("config"));

    if let Err(e) = run(cli, source).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, source: ConfigSource) -> Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let cfg = load_or_exit(cli.config.as_deref(), source);
            observability::apply_logging_level(&cfg.logging.level);

            let server = ServerBuilder::new()
                .with_config(cfg)
                .build()
                .await
                .context("server initialization failed")?;
            server.run().await
        }
        Commands::CheckConfig => {
            let cfg = load_or_exit(cli.config.as_deref(), source);
            let rendered =
                toml::to_string_pretty(&cfg).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
        Commands::Sweep(args) => sweep(&args).await,
        Commands::GenSecret => {
            let secret = generate_client_secret();
            let hash = hash_secret(&secret)?;
            println!("secret      = {secret}");
            println!("secret_hash = \"{hash}\"");
            Ok(())
        }
    }
}

/// Configuration errors exit with status 2.
fn load_or_exit(path: Option<&str>, source: ConfigSource) -> AppConfig {
    match load_config(path) {
        Ok(cfg) => {
            tracing::info!(
                path = %path.unwrap_or(DEFAULT_CONFIG_PATH),
                source = %source,
                "Configuration loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    }
}

async fn sweep(args: &SweepArgs) -> Result<()> {
    let url = format!(
        "{}/oauth/maintenance/sweep",
        args.url.trim_end_matches('/')
    );
    let resp = reqwest::Client::new()
        .post(&url)
        .bearer_auth(&args.token)
        .send()
        .await
        .context("Failed to connect to server")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("sweep failed with HTTP {status}: {body}");
    }

    let report: SweepReport = resp.json().await.context("Invalid sweep response")?;
    println!("Removed {} expired session(s)", report.sessions_removed);
    Ok(())
}

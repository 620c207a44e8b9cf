use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "octoauth-server")]
#[command(about = "OctoAuth OAuth 2.0 authorization and resource server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to octoauth.toml)
    #[arg(short, long, global = true, env = "OCTOAUTH_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,
    /// Remove expired sessions on a running server
    Sweep(SweepArgs),
    /// Validate the configuration and print the effective settings
    CheckConfig,
    /// Generate a client secret and its Argon2 hash
    GenSecret,
}

#[derive(clap::Args)]
pub struct SweepArgs {
    /// Server base URL
    #[arg(short, long, env = "OCTOAUTH_URL", default_value = "http://127.0.0.1:8090")]
    pub url: String,
    /// Access token carrying the maintenance scope
    #[arg(short, long, env = "OCTOAUTH_TOKEN")]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_optional() {
        let cli = Cli::try_parse_from(["octoauth-server"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_sweep_args() {
        let cli = Cli::try_parse_from([
            "octoauth-server",
            "--config",
            "prod.toml",
            "sweep",
            "--url",
            "http://auth.internal:8090",
            "--token",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("prod.toml"));
        match cli.command {
            Some(Commands::Sweep(args)) => {
                assert_eq!(args.url, "http://auth.internal:8090");
                assert_eq!(args.token, "abc");
            }
            _ => panic!("expected sweep"),
        }
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Safety observation tracking server
#[derive(Debug, Parser)]
#[command(
    name = "safetrack-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "REST backend for safety observations, verification and points",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Print a signed bearer token for an existing user
    IssueToken {
        #[arg(long)]
        user_id: i64,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 86_400)]
        ttl_secs: i64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "SAFETRACK_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "SAFETRACK_PORT", default_value_t = 8000)]
    pub port: u16,

    /// SQLite database file, created on first start
    #[arg(long, env = "SAFETRACK_DATABASE", default_value = "./safetrack.sqlite")]
    pub database: PathBuf,

    /// HMAC secret for signing and verifying bearer tokens
    #[arg(long, env = "SAFETRACK_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Allowed browser origin; any origin is accepted when unset
    #[arg(long, env = "SAFETRACK_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Delay before backfilling dropdown options from existing records
    #[arg(long, default_value_t = 5)]
    pub reconcile_delay_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_the_secret_is_given() {
        let cli = Cli::try_parse_from(["safetrack-server", "--jwt-secret", "s3cret"])
            .expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.config.host, "127.0.0.1");
        assert_eq!(cli.config.port, 8000);
        assert_eq!(cli.config.database, PathBuf::from("./safetrack.sqlite"));
        assert_eq!(cli.config.reconcile_delay_secs, 5);
        assert!(cli.config.cors_origin.is_none());
    }

    #[test]
    fn issue_token_takes_a_user_and_lifetime() {
        let cli = Cli::try_parse_from([
            "safetrack-server",
            "--jwt-secret",
            "s3cret",
            "issue-token",
            "--user-id",
            "7",
            "--ttl-secs",
            "60",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::IssueToken {
                user_id: 7,
                ttl_secs: 60
            })
        ));
    }

    #[test]
    fn port_must_be_numeric() {
        let result = Cli::try_parse_from([
            "safetrack-server",
            "--jwt-secret",
            "s3cret",
            "--port",
            "http",
        ]);
        assert!(result.is_err());
    }
}

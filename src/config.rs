use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KvBackend {
    Memory,
    Sqlite,
}

impl FromStr for KvBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown kv backend `{}` (expected memory or sqlite)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub kv_backend: KvBackend,
    pub database_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "S3 multipart gateway credential service")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_AUTH_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_AUTH_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Credential store backend (overrides GATEWAY_AUTH_KV_BACKEND)
    #[arg(long, value_enum)]
    pub kv_backend: Option<KvBackend>,

    /// Database URL for the sqlite backend (overrides GATEWAY_AUTH_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("GATEWAY_AUTH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("GATEWAY_AUTH_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing GATEWAY_AUTH_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8000,
            Err(err) => return Err(err).context("reading GATEWAY_AUTH_PORT"),
        };
        let env_backend = match env::var("GATEWAY_AUTH_KV_BACKEND") {
            Ok(value) => value
                .parse::<KvBackend>()
                .context("parsing GATEWAY_AUTH_KV_BACKEND")?,
            Err(env::VarError::NotPresent) => KvBackend::Memory,
            Err(err) => return Err(err).context("reading GATEWAY_AUTH_KV_BACKEND"),
        };
        let env_db = env::var("GATEWAY_AUTH_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/auth.db".into());

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            kv_backend: args.kv_backend.unwrap_or(env_backend),
            database_url: args.database_url.unwrap_or(env_db),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

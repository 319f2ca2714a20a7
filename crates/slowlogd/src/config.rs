use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tailer::{TailOptions, DEFAULT_BLOCK_SIZE, DEFAULT_DELIMITER};

use crate::cli::Cli;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlowlogdConfig {
    pub server: ServerConfig,
    pub slowlog: SlowlogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Bytes pulled from the log per response chunk
    pub block_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlowlogConfig {
    pub path: String,
    /// Marker that opens every record
    pub delimiter: String,
    pub poll_interval_ms: u64,
    /// Idle polls between checks for a rotated file
    pub rotation_check_every: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}

impl SlowlogdConfig {
    /// Load configuration: defaults < config files < environment < command line
    pub fn load(cli: &Cli) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&SlowlogdConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        // 1. /etc/slowlogd/slowlogd.toml (production)
        // 2. config/slowlogd.toml (local development)
        // 3. crates/slowlogd/config/slowlogd.toml (workspace root)
        let config_paths = [
            "/etc/slowlogd/slowlogd",
            "config/slowlogd",
            "crates/slowlogd/config/slowlogd",
        ];
        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        if let Some(file) = &cli.config {
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }

        // Nested keys use a double underscore: SLOWLOGD_SLOWLOG__PATH
        builder = builder.add_source(
            config::Environment::with_prefix("SLOWLOGD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(path) = &cli.slowlog {
            builder = builder
                .set_override("slowlog.path", path.display().to_string())
                .context("Invalid --slowlog value")?;
        }

        let mut config: SlowlogdConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Some(port) = cli.port {
            config.set_port(port)?;
        }

        Ok(config)
    }

    /// Replace the port of `server.bind_address`, keeping its host.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        let mut addr: SocketAddr = self
            .server
            .bind_address
            .parse()
            .context("Invalid bind_address")?;
        addr.set_port(port);
        self.server.bind_address = addr.to_string();
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .context("Invalid bind_address")?;

        if self.slowlog.path.trim().is_empty() {
            anyhow::bail!("slowlog.path is not set (use --slowlog or SLOWLOGD_SLOWLOG__PATH)");
        }
        if self.slowlog.delimiter.is_empty() {
            anyhow::bail!("slowlog.delimiter must not be empty");
        }
        if self.slowlog.poll_interval_ms == 0 {
            anyhow::bail!("slowlog.poll_interval_ms must be > 0");
        }
        if self.slowlog.rotation_check_every == 0 {
            anyhow::bail!("slowlog.rotation_check_every must be > 0");
        }
        // The first chunk of every stream is the bare delimiter.
        if self.server.block_size < self.slowlog.delimiter.len() {
            anyhow::bail!(
                "server.block_size ({}) must hold the record delimiter ({} bytes)",
                self.server.block_size,
                self.slowlog.delimiter.len()
            );
        }

        Ok(())
    }

    /// Per-connection tail settings for the given rate limit.
    pub fn tail_options(&self, rate_limit: usize) -> TailOptions {
        TailOptions {
            delimiter: self.slowlog.delimiter.as_bytes().to_vec(),
            rate_limit,
            poll_interval: Duration::from_millis(self.slowlog.poll_interval_ms),
            rotation_check_every: self.slowlog.rotation_check_every,
        }
    }
}

impl Default for SlowlogdConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:3307".to_string(),
                block_size: DEFAULT_BLOCK_SIZE,
            },
            slowlog: SlowlogConfig {
                path: String::new(),
                delimiter: String::from_utf8_lossy(DEFAULT_DELIMITER).into_owned(),
                poll_interval_ms: 250,
                rotation_check_every: 4,
            },
            logging: LoggingConfig {
                level: "info,slowlogd=debug,tailer=info".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stdout,
            },
        }
    }
}

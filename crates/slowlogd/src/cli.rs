use clap::Parser;
use std::path::PathBuf;

/// Stream a live MySQL slow-query log over HTTP.
#[derive(Debug, Default, Parser)]
#[command(name = "slowlogd", version)]
pub struct Cli {
    /// Path to the MySQL slow log
    #[arg(short = 'f', long = "slowlog", value_name = "PATH")]
    pub slowlog: Option<PathBuf>,

    /// Port to listen on (keeps the configured bind host)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Extra TOML configuration file, layered over the default locations
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

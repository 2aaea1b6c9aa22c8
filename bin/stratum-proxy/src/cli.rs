use std::path::PathBuf;

use clap::Parser;

/// Command-line entry point, following the `clap` derive + env pattern
/// used throughout the teacher's `bin/reth` commands.
#[derive(Debug, Parser)]
#[command(name = "stratum-proxy", about = "Ethash stratum/HTTP mining proxy")]
pub struct Cli {
    /// Path to the TOML config file (proxy, upstreams, payouts).
    #[arg(long, env = "STRATUM_PROXY_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// `tracing-subscriber` `EnvFilter` directive.
    #[arg(long, env = "STRATUM_PROXY_LOG", default_value = "info")]
    pub log: String,

    /// Address the Prometheus `/metrics` scrape endpoint listens on.
    #[arg(long, env = "STRATUM_PROXY_METRICS_LISTEN", default_value = "0.0.0.0:9100")]
    pub metrics_listen: String,
}

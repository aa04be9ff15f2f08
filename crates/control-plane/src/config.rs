//! Server configuration from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use node_runtime::{lambdalabs, ProviderConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Control plane for provisioning and tracking GPU nodes.
#[derive(Debug, Clone, Parser)]
#[command(name = "control-plane")]
#[command(about = "Provision, track and tear down GPU nodes")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:4000")]
    pub listen_addr: SocketAddr,

    /// LambdaLabs API key (or set `LAMBDALABS_API_KEY` env var).
    #[arg(long, env = "LAMBDALABS_API_KEY", hide_env_values = true)]
    pub lambdalabs_api_key: Option<String>,

    /// LambdaLabs API base URL.
    #[arg(long, env = "LAMBDALABS_API_URL", default_value = lambdalabs::API_BASE_URL)]
    pub lambdalabs_api_url: String,

    /// Seconds between node status polls.
    #[arg(long, env = "WATCH_POLL_INTERVAL_SECS", default_value = "10")]
    pub watch_poll_interval_secs: u64,

    /// Directory build logs are stored in.
    #[arg(long, env = "BUILD_LOG_DIR", default_value = "build-logs")]
    pub build_log_dir: PathBuf,

    /// Program (with arguments) run for each build. The uploaded context
    /// path is appended as the last argument. No builder is registered when unset.
    #[arg(long, env = "BUILDER_COMMAND")]
    pub builder_command: Option<String>,

    /// Name clients pass as `?builder=` to select the command builder.
    #[arg(long, env = "BUILDER_NAME", default_value = "command")]
    pub builder_name: String,

    /// Directory uploaded build contexts are written to while building.
    #[arg(long, env = "BUILD_WORK_DIR", default_value = "build-contexts")]
    pub build_work_dir: PathBuf,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

impl Config {
    /// Provider settings handed to the runtime initializer.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            lambdalabs_api_key: self.lambdalabs_api_key.clone(),
            lambdalabs_api_url: self.lambdalabs_api_url.clone(),
            poll_interval: Duration::from_secs(self.watch_poll_interval_secs.max(1)),
        }
    }

    /// Program and arguments of the configured build command, if any.
    pub fn build_command(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self
            .builder_command
            .as_deref()?
            .split_whitespace()
            .map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }
}

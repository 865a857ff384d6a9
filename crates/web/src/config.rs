// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// HTTP control plane for a NetDIMM cabinet fleet.
#[derive(Debug, Clone, Parser)]
#[command(name = "cabnetd", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "CABNET_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "CABNET_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to the system configuration YAML.
    #[arg(long, env = "CABNET_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "CABNET_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CABNET_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

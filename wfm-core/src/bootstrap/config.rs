//! Configuration loading

use anyhow::Result;
use tracing::info;

use crate::config::mask_database_url;
use crate::Config;

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. Explicit path (command line)
/// 2. `WFM_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. /config/config.yaml (Kubernetes mount path)
/// 5. Fall back to environment variables only
pub fn load_config(explicit_path: Option<&str>) -> Result<Config> {
    let config_path = explicit_path
        .map(str::to_string)
        .or_else(|| {
            std::env::var("WFM_CONFIG_PATH")
                .ok()
                .filter(|p| std::path::Path::new(p).exists())
        })
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| std::path::Path::new(p).exists())
                .map(str::to_string)
        });

    // Logging is not up yet, so report on stderr
    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path).map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()?
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

/// Log the effective configuration once logging is initialized
pub fn log_config(config: &Config) {
    info!("gRPC address: {}", config.grpc_address());
    info!("HTTP address: {}", config.http_address());
    for node in &config.database.nodes {
        info!(node = %node.name, url = %mask_database_url(&node.url), "Database node configured");
    }
    info!(
        picker = ?config.database.cluster.picker,
        checker = ?config.database.cluster.checker,
        update_interval_seconds = config.database.cluster.update_interval_seconds,
        update_timeout_seconds = config.database.cluster.update_timeout_seconds,
        "Database cluster configured"
    );
}

//! Configuration loading
//!
//! Settings come from an optional TOML file, then command-line overrides.
//! Keys mirror `HubConfig`; anything omitted keeps its default.
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 5555
//! max_pending_connections = 100
//! file_chunk_size = 8192
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use switchboard_net::HubConfig;

/// Switchboard relay hub
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard", version, about = "Chat and file relay hub")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "SWITCHBOARD_BIND")]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(long, env = "SWITCHBOARD_PORT")]
    pub port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parse config from TOML text
pub fn from_toml(content: &str) -> Result<HubConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Read and parse a config file
pub fn load_file(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml(&content)
}

/// Resolve the effective configuration for this run
pub fn resolve(cli: &Cli) -> Result<HubConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_file(path)?,
        None => HubConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("switchboard").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(&cli(&[])).unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let config = from_toml("port = 6000\nfile_chunk_size = 1024\n").unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.file_chunk_size, 1024);
        assert_eq!(config.read_buffer_size, 4096);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bind_address = \"127.0.0.1\"\nport = 6000").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = resolve(&cli(&["--config", &path, "--port", "7000"])).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_missing_file() {
        let result = load_file(Path::new("/nonexistent/switchboard.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(from_toml("port = \"high\""), Err(ConfigError::Parse(_))));
    }
}

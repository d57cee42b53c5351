//! Configuration module for the waste-management service

use anyhow::Result;
use config::{builder::DefaultState, Config as ConfigBuilder, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One JSON file per collection under `data_dir`
    File,
    /// Process-lifetime only
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the collection files
    pub data_dir: PathBuf,

    pub storage: StorageKind,

    /// API server configuration
    pub api_host: String,
    pub api_port: u16,

    /// IoT simulation
    pub simulation_interval_ms: u64,
    pub simulation_autostart: bool,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub simulation_seed: Option<u64>,

    /// Provision demo bins, citizen and contractor on an empty store
    pub seed_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            storage: StorageKind::File,
            api_host: "0.0.0.0".to_string(),
            api_port: 3000,
            simulation_interval_ms: 30_000,
            simulation_autostart: true,
            simulation_seed: None,
            seed_defaults: true,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        Self::layered(Some(path), None)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::layered(None, None)
    }

    /// Defaults, then the optional file, then plain and `WASTECHAIN_` environment variables.
    /// `env` replaces the process environment when given.
    fn layered(path: Option<&str>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let config = builder
            .add_source(Environment::default().source(env.clone()))
            .add_source(Environment::with_prefix("WASTECHAIN").source(env))
            .build()?;

        config.try_deserialize().map_err(|e| e.into())
    }

    fn defaults() -> Result<config::ConfigBuilder<DefaultState>> {
        let d = Config::default();
        Ok(ConfigBuilder::builder()
            .set_default("data_dir", d.data_dir.to_string_lossy().to_string())?
            .set_default("storage", "file")?
            .set_default("api_host", d.api_host)?
            .set_default("api_port", d.api_port as i64)?
            .set_default("simulation_interval_ms", d.simulation_interval_ms as i64)?
            .set_default("simulation_autostart", d.simulation_autostart)?
            .set_default("seed_defaults", d.seed_defaults)?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::layered(Some("definitely-not-here.toml"), env(&[])).unwrap();
        assert_eq!(config.api_port, 3000);
        assert_eq!(config.simulation_interval_ms, 30_000);
        assert_eq!(config.storage, StorageKind::File);
        assert!(config.simulation_seed.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "api_port = 8088\nstorage = \"memory\"\nsimulation_interval_ms = 5000\nsimulation_seed = 7"
        )
        .unwrap();

        let config = Config::layered(file.path().to_str(), env(&[])).unwrap();
        assert_eq!(config.api_port, 8088);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.simulation_interval_ms, 5000);
        assert_eq!(config.simulation_seed, Some(7));
        assert_eq!(config.bind_address(), "0.0.0.0:8088");
    }

    #[test]
    fn plain_environment_variables_are_read() {
        let config = Config::layered(
            None,
            env(&[
                ("API_PORT", "9911"),
                ("DATA_DIR", "/var/lib/wastechain"),
                ("WASTECHAIN_SIMULATION_INTERVAL_MS", "1234"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api_port, 9911);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/wastechain"));
        assert_eq!(config.simulation_interval_ms, 1234);
    }

    #[test]
    fn prefixed_variables_win_over_plain_ones() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "api_port = 8088").unwrap();

        let config = Config::layered(
            file.path().to_str(),
            env(&[("API_PORT", "9911"), ("WASTECHAIN_API_PORT", "7070")]),
        )
        .unwrap();
        assert_eq!(config.api_port, 7070);
    }
}

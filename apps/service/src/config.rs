use std::net::SocketAddr;
use std::{env, fmt, fs, io, path};

use pulse::clients::PRE_PRODUCTION_CLIENTS;
use pulse::{CheckConfig, Dimension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        source: io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grafana: Grafana,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grafana {
    pub base_url: String,
    pub datasource_id: String,
    /// Environment variable holding the service account token
    pub token_env: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub interval_seconds: u64,
    pub run_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub pre_production_clients: Vec<String>,
}

/// Prometheus endpoint served while the scheduler runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub enabled: bool,
    pub listen_address: String,
}

/// A client watched on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub network: String,
    pub client: String,
    #[serde(default)]
    pub alert_unexplained: bool,
}

impl Default for Grafana {
    fn default() -> Self {
        Self {
            base_url: "https://grafana.observability.ethpandaops.io".into(),
            datasource_id: "UhcO3vy7z".into(),
            token_env: "GRAFANA_SERVICE_TOKEN".into(),
            timeout_seconds: 30,
        }
    }
}

impl Grafana {
    /// Token read from the configured environment variable, if set
    pub fn token(&self) -> Option<String> {
        env::var(&self.token_env).ok().filter(|token| !token.is_empty())
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            run_timeout_seconds: 300,
        }
    }
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            pre_production_clients: PRE_PRODUCTION_CLIENTS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: "0.0.0.0:9091".into(),
        }
    }
}

impl Metrics {
    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        self.listen_address
            .parse()
            .map_err(|e| Error::Invalid(format!("metrics.listen_address: {e}")))
    }
}

impl Target {
    pub fn new(network: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            client: client.into(),
            alert_unexplained: false,
        }
    }

    pub fn dimension(&self) -> Result<Dimension, Error> {
        Dimension::of_client(&self.client)
            .ok_or_else(|| Error::Invalid(format!("unknown client '{}'", self.client)))
    }

    /// Check config aimed at this target's client
    pub fn check_config(&self) -> Result<CheckConfig, Error> {
        Ok(CheckConfig::for_client(
            self.network.clone(),
            self.dimension()?,
            &self.client,
        ))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.client)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pulse/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Grafana")?;
        write_1(f, "Base URL", &self.grafana.base_url)?;
        write_1(f, "Datasource", &self.grafana.datasource_id)?;
        write_1(f, "Token Variable", &self.grafana.token_env)?;
        write_1(f, "Timeout (s)", &self.grafana.timeout_seconds)?;

        write_title_1(f, "Schedule")?;
        write_1(f, "Interval (s)", &self.schedule.interval_seconds)?;
        write_1(f, "Run Timeout (s)", &self.schedule.run_timeout_seconds)?;

        write_title_1(f, "Analysis")?;
        write_1(
            f,
            "Pre-production",
            &self.analysis.pre_production_clients.join(", "),
        )?;

        write_title_1(f, "Metrics")?;
        write_1(f, "Enabled", &self.metrics.enabled)?;
        write_1(f, "Listen Address", &self.metrics.listen_address)?;

        write_title_1(f, "Targets")?;
        if self.targets.is_empty() {
            write_1(f, "(none)", &"")?;
        }
        for target in &self.targets {
            write_1(
                f,
                &target.to_string(),
                &format!("alert unexplained = {}", target.alert_unexplained),
            )?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|source| Error::ReadFailed {
                    path: config_path.clone(),
                    source,
                })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let url = Url::parse(&self.grafana.base_url)
            .map_err(|e| Error::Invalid(format!("grafana.base_url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Invalid(format!(
                    "grafana.base_url: unsupported scheme {other}"
                )));
            }
        }

        if self.schedule.interval_seconds == 0 {
            return Err(Error::Invalid(
                "schedule.interval_seconds must be positive".into(),
            ));
        }
        if self.schedule.run_timeout_seconds == 0 {
            return Err(Error::Invalid(
                "schedule.run_timeout_seconds must be positive".into(),
            ));
        }

        if self.metrics.enabled {
            self.metrics.socket_addr()?;
        }

        for target in &self.targets {
            if target.network.trim().is_empty() {
                return Err(Error::Invalid(format!(
                    "target {target} has an empty network"
                )));
            }
            target.dimension()?;
        }

        Ok(())
    }
}

//! Configuration loading
//!
//! The config is a YAML document with a single `smsfwd:` top-level key holding
//! the instance list. Each instance pairs an optional own-number match pattern
//! with forward targets (mailto addresses and/or a command template).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "SMSFWD_CONFIG";

/// Default config filename looked up in the working directory.
pub const CONFIG_FILENAME: &str = "smsfwd.yaml";

/// Top-level config document: `smsfwd: { instances: [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub smsfwd: Config,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instances: Vec<InstanceConfig>,
}

/// One configured logical instance: identity match rule plus forward targets.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub mid: Option<MatchConfig>,
    pub fwd: ForwardConfig,
}

/// Identity match rule. A missing `n-own` means match-all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchConfig {
    #[serde(rename = "n-own", default)]
    pub n_own: Option<String>,
}

/// Forward targets: mail destinations and/or a command-argument template.
///
/// Command arguments may carry `{sender}`, `{to}`, `{ts_req}` and `{ts_del}`
/// placeholders, interpolated per message.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub mailto: Vec<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Mailer invoked per mailto address, document piped to stdin.
    #[serde(default = "default_sendmail")]
    pub sendmail: PathBuf,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            mailto: Vec::new(),
            cmd: Vec::new(),
            sendmail: default_sendmail(),
        }
    }
}

fn default_sendmail() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

impl Config {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_yaml::from_str(&content)?;
        if file.smsfwd.instances.is_empty() {
            return Err(Error::Config("no instances configured".to_string()));
        }
        Ok(file.smsfwd)
    }

    /// Resolve the config path: env override, then the working directory,
    /// then `~/.config/smsfwd/smsfwd.yaml`.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(env_path));
        }
        let cwd_path = PathBuf::from(CONFIG_FILENAME);
        if cwd_path.exists() {
            return Ok(cwd_path);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("smsfwd").join(CONFIG_FILENAME);
            if user_path.exists() {
                return Ok(user_path);
            }
        }
        Err(Error::Config(format!(
            "no config found: set {} or create ./{}",
            CONFIG_ENV, CONFIG_FILENAME
        )))
    }
}

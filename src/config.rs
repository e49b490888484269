//! User configuration.
//!
//! Read from `./hearme.json`, then `~/.hearme/config.json`. Both the wrapped
//! form and the flat form are accepted:
//!
//! ```json
//! { "hearme": { "audio": { "engine": "kokoro", "chunk_chars": 1500 } } }
//! ```
//!
//! Every field has a default, so partial files are fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::AudioFormat;

pub const CONFIG_FILE_NAME: &str = "hearme.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearmeConfig {
    pub audio: AudioConfig,
    pub defaults: DefaultsConfig,
    pub output: OutputConfig,
    pub privacy: PrivacyConfig,
    pub installation: InstallationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Preferred engine. `None` picks the best available one.
    pub engine: Option<String>,
    pub fallback_engine: Option<String>,
    pub voices: String,
    pub format: AudioFormat,
    /// Per-chunk character limit for engines that need chunking.
    pub chunk_chars: usize,
    /// Upper bound on one subprocess synthesis call.
    pub synthesis_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            engine: None,
            fallback_engine: Some("piper".to_string()),
            voices: "auto".to_string(),
            format: AudioFormat::Wav,
            chunk_chars: 2000,
            synthesis_timeout_secs: 1800,
        }
    }
}

/// Hints for the calling agent. Not interpreted by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub mode: String,
    pub length: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: "agent-decided".to_string(),
            length: "balanced".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: crate::output::OUTPUT_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub allow_network: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    pub models_dir: String,
    pub venv_path: String,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            models_dir: "~/.hearme/models".to_string(),
            venv_path: "~/.hearme/venv".to_string(),
        }
    }
}

impl HearmeConfig {
    /// Model root with `~` expanded.
    pub fn models_dir(&self) -> PathBuf {
        expand_home(&self.installation.models_dir)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.audio.synthesis_timeout_secs)
    }
}

/// Expand a leading `~` to the home directory. Other paths are returned as is.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

/// `./hearme.json` if present, else `~/.hearme/config.json` if present.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(".hearme").join("config.json"))
        .filter(|path| path.is_file())
}

/// Load the discovered config, or defaults.
///
/// A file that cannot be read or parsed is logged and ignored.
pub fn load_config() -> HearmeConfig {
    let Some(path) = find_config_file() else {
        return HearmeConfig::default();
    };
    match load_config_from(&path) {
        Ok(config) => {
            log::debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("Ignoring config {}: {e}", path.display());
            HearmeConfig::default()
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<HearmeConfig, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

fn parse_config(raw: &str) -> Result<HearmeConfig, ConfigError> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    if let Some(inner) = value.get_mut("hearme") {
        value = inner.take();
    }
    Ok(serde_json::from_value(value)?)
}

/// Write `config` in the wrapped form. Defaults to `./hearme.json`.
pub fn save_config(config: &HearmeConfig, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), Path::to_path_buf);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let wrapped = serde_json::json!({ "hearme": config });
    fs::write(&path, serde_json::to_string_pretty(&wrapped)?)?;
    Ok(path)
}

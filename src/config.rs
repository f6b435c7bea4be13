use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_quiet_window_ms() -> u64 {
    500
}

fn default_max_save_attempts() -> u32 {
    3
}

fn default_mirror_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("sheaf")
        .join("mirror")
}

/// Settings for one sync session.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the note server, including the API prefix.
    pub api_base_url: String,
    /// How long a note must stay untouched before its staged edits are
    /// sent, in milliseconds.
    pub quiet_window_ms: u64,
    /// Sync calls per save before giving up.
    pub max_save_attempts: u32,
    /// Where the mirror worker keeps its per-note JSON files.
    pub mirror_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            quiet_window_ms: default_quiet_window_ms(),
            max_save_attempts: default_max_save_attempts(),
            mirror_dir: default_mirror_dir(),
        }
    }
}

impl SyncConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("sheaf")
            .join("config.json")
    }

    /// Read the config file, falling back to defaults when it is
    /// missing or unparseable.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    /// Ensure the mirror directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.mirror_dir)
    }
}

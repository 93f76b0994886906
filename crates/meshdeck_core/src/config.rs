//! Application configuration stored at `~/.meshdeck/config.json`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for the Mesh Deck server and its discovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Address the observer WebSocket server listens on.
    #[serde(with = "socket_addr_serde")]
    pub listen_addr: SocketAddr,

    // Radio device
    /// Serial port or TCP host of the radio to attach at startup, if any.
    pub radio_address: Option<String>,
    /// LoRa region code handed to the radio on connect.
    pub radio_region: String,

    // Discovery tuning
    /// Pause between cascade iterations.
    #[serde(with = "duration_serde")]
    pub ping_interval: Duration,
    /// Hard cap on a whole discovery run.
    #[serde(with = "duration_serde")]
    pub max_discovery_duration: Duration,
    /// Wait after the opening broadcast before the first iteration.
    #[serde(with = "duration_serde")]
    pub settle_delay: Duration,
    /// Pause between successive targeted pings, in milliseconds.
    pub ping_pacing_ms: u64,
    /// Pause between sequential outbound sends, in milliseconds.
    pub send_pacing_ms: u64,

    // Observer-facing behavior
    /// How many recent messages a newly joined observer receives.
    pub history_window: usize,
    /// Whether completed live discovery runs write a JSON report.
    pub write_reports: bool,
    /// Where discovery reports land; `None` means `~/.meshdeck/reports`.
    pub data_dir: Option<PathBuf>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8765".parse().expect("valid default listen address"),
            radio_address: None,
            radio_region: "US".into(),
            ping_interval: Duration::from_secs(30),
            max_discovery_duration: Duration::from_secs(300),
            settle_delay: Duration::from_secs(5),
            ping_pacing_ms: 2000,
            send_pacing_ms: 1000,
            history_window: 50,
            write_reports: true,
            data_dir: None,
        }
    }
}

impl DeckConfig {
    /// Returns the base config directory: `~/.meshdeck/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".meshdeck"))
    }

    /// Returns the config file path: `~/.meshdeck/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.meshdeck/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Returns the discovery reports directory: `~/.meshdeck/reports/`
    pub fn reports_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("reports"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        let dirs = [Self::base_dir()?, Self::logs_dir()?, Self::reports_dir()?];
        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from disk, or creates the default file if missing.
    pub fn load() -> Result<Self> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        if path.exists() {
            let config = Self::load_or_default(&path);
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Load config from a JSON file, or return defaults if the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<DeckConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        warn!("Corrupt config file, using defaults: {e}");
                    }
                },
                Err(e) => {
                    warn!("Cannot read config file, using defaults: {e}");
                }
            }
        }
        Self::default()
    }

    /// Saves config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to_path(&path)
    }

    /// Save config to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Pause between successive targeted pings.
    pub fn ping_pacing(&self) -> Duration {
        Duration::from_millis(self.ping_pacing_ms)
    }

    /// Pause between sequential outbound sends.
    pub fn send_pacing(&self) -> Duration {
        Duration::from_millis(self.send_pacing_ms)
    }

    /// Where discovery reports are written.
    pub fn report_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::reports_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S: Serializer>(addr: &SocketAddr, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SocketAddr, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(dur.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

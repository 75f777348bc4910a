// Persistent configuration: output rate, chip flavour, default song length.
// Stored as JSON in <config_dir>/sidvm/config.json

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::player::FRAMES_PER_SEC;
use crate::sid_device::{ChipModel, SidClock};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Chip clock ("pal" / "ntsc").
    pub clock: SidClock,
    /// "mos6581" or "mos8580".
    pub chip_model: ChipModel,
    /// Song length in seconds applied to every track. 0 = play until the
    /// tune stops by itself.
    pub default_song_length_secs: u32,
    /// Run output through the C64 board RC filter.
    pub external_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock: SidClock::Pal,
            chip_model: ChipModel::Mos6581,
            default_song_length_secs: 0,
            external_filter: true,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(p) => Self::load_from(&p),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse_json(&content),
            Err(e) => {
                log::warn!("cannot read config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Save config to disk, returning where it went.
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::config_path().ok_or("no config directory (HOME/APPDATA unset)")?;
        self.save_to(&path)
            .map_err(|e| format!("cannot save config to {}: {e}", path.display()))?;
        log::info!("config saved to {}", path.display());
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json())
    }

    /// Parse config from a JSON string. Unknown fields are ignored,
    /// missing fields get defaults, anything unparsable gives defaults.
    pub fn parse_json(s: &str) -> Self {
        match serde_json::from_str(s) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("invalid config, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of plain fields always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default() + "\n"
    }

    /// Play-call count corresponding to `default_song_length_secs`.
    pub fn frame_limit(&self) -> Option<u32> {
        match self.default_song_length_secs {
            0 => None,
            secs => Some(secs.saturating_mul(FRAMES_PER_SEC)),
        }
    }
}

/// Get the application config directory.
fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/sidvm/
    // Linux:   ~/.config/sidvm/
    // Windows: %APPDATA%/sidvm/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("sidvm"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("sidvm"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("sidvm"))
    }
}

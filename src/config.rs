use log::{error, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─── Persisted config ────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Gamedata documents, merged in order.
    pub gamedata_paths: Vec<String>,
    pub schema_dump_path: String,
    /// Empty selects the platform this tool was built for.
    pub platform: String,
    /// Host process scanned for signatures when attaching.
    pub process_name: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gamedata_paths: vec!["gamedata.toml".into()],
            schema_dump_path: "schema.json".into(),
            platform: String::new(),
            process_name: if cfg!(windows) { "cs2.exe".into() } else { "cs2".into() },
            log_level: "info".into(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl AppConfig {
    pub fn path() -> PathBuf {
        config_dir().join("gamedata-check.toml")
    }

    pub fn load() -> Self {
        let path = Self::path();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                info!("Loaded config from {}", path.display());
                Self::from_toml(&content)
            }
            Err(_) => {
                info!("No config file found, creating default config");
                let config = Self::default();
                config.save();
                config
            }
        }
    }

    pub fn from_toml(content: &str) -> Self {
        toml::from_str(content).unwrap_or_else(|e| {
            error!("Failed to parse config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self) {
        let path = Self::path();
        match toml::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&path, content) {
                    error!("Failed to save config: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize config: {}", e),
        }
    }

    /// Resolves a configured path relative to the config directory.
    pub fn resolve_path(path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            config_dir().join(path)
        }
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

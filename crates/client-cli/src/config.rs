use anyhow::{bail, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER: &str = "http://localhost:10000/api";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub server: Option<String>,
}

/// Display preferences. Unknown or missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dark_mode: bool,
    pub theme_color: String,
    pub table_page_size: usize,
    pub notifications: bool,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            theme_color: "blue".to_string(),
            table_page_size: 10,
            notifications: true,
            language: "en".to_string(),
        }
    }
}

pub const KEYS: &[&str] = &[
    "server",
    "dark_mode",
    "theme_color",
    "table_page_size",
    "notifications",
    "language",
];

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("{} expects true or false, got {:?}", key, value),
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "gsos", "gsos")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.to_path_buf())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Server base URL: explicit override, then config, then the local default.
    pub fn server_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.remote.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.remote.server = Some(value.trim_end_matches('/').to_string()),
            "dark_mode" => self.settings.dark_mode = parse_bool(key, value)?,
            "theme_color" => self.settings.theme_color = value.to_string(),
            "table_page_size" => {
                self.settings.table_page_size = match value.trim().parse() {
                    Ok(size) if size > 0 => size,
                    _ => bail!("table_page_size expects a positive number, got {:?}", value),
                }
            }
            "notifications" => self.settings.notifications = parse_bool(key, value)?,
            "language" => self.settings.language = value.to_string(),
            _ => bail!("Unknown config key: {}. Valid keys: {}", key, KEYS.join(", ")),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "server" => self.remote.server.clone().unwrap_or_default(),
            "dark_mode" => self.settings.dark_mode.to_string(),
            "theme_color" => self.settings.theme_color.clone(),
            "table_page_size" => self.settings.table_page_size.to_string(),
            "notifications" => self.settings.notifications.to_string(),
            "language" => self.settings.language.clone(),
            _ => bail!("Unknown config key: {}", key),
        };
        Ok(value)
    }
}

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Send raw store errors to clients instead of a generic message.
    #[serde(default)]
    pub expose_internal_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Supabase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub supabase: Option<SupabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 10000 }
fn default_db_path() -> String { "./data/gsos.db".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
            expose_internal_errors: false,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        if let Ok(path) = std::env::var("GSOS_CONFIG") {
            return Self::load_from_path(Path::new(&path));
        }

        let default_paths = [
            PathBuf::from("gsos-server.toml"),
            PathBuf::from("config/gsos-server.toml"),
            PathBuf::from("/etc/gsos/server.toml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        tracing::warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Layers environment variables over the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = match port.parse() {
                Ok(port) => port,
                Err(_) => bail!("PORT must be a number between 0 and 65535, got {:?}", port),
            };
        }

        if let Some(list) = get("ALLOWED_ORIGINS") {
            self.server.allowed_origins = list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(frontend) = get("FRONTEND_URL") {
            if !self.server.allowed_origins.contains(&frontend) {
                self.server.allowed_origins.push(frontend);
            }
        }

        if let Some(flag) = get("GSOS_EXPOSE_ERRORS") {
            self.server.expose_internal_errors = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        if let Some(path) = get("DATABASE_PATH") {
            self.storage.sqlite.path = path;
        }

        match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => {
                self.storage.supabase = Some(SupabaseConfig { url, key });
                // Credentials alone select the hosted backend unless told otherwise.
                if get("GSOS_BACKEND").is_none() {
                    self.storage.backend = Backend::Supabase;
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("Only one of SUPABASE_URL/SUPABASE_KEY is set, ignoring both");
            }
            (None, None) => {}
        }

        if let Some(backend) = get("GSOS_BACKEND") {
            self.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "sqlite" => Backend::Sqlite,
                "supabase" => Backend::Supabase,
                other => bail!("unknown GSOS_BACKEND {:?} (expected sqlite or supabase)", other),
            };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 10000);
        assert!(config.server.allowed_origins.is_empty());
        assert!(!config.server.expose_internal_errors);
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert_eq!(config.storage.sqlite.path, "./data/gsos.db");
        assert!(config.storage.supabase.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gsos-server.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8088
allowed_origins = ["https://dash.example"]

[storage.sqlite]
path = "/var/lib/gsos/roster.db"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.allowed_origins, vec!["https://dash.example"]);
        assert_eq!(config.storage.sqlite.path, "/var/lib/gsos/roster.db");
        assert_eq!(config.storage.backend, Backend::Sqlite);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("HOST", "127.0.0.1"),
                ("PORT", "9000"),
                ("DATABASE_PATH", "/tmp/x.db"),
                ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
                ("FRONTEND_URL", "https://front.example"),
                ("GSOS_EXPOSE_ERRORS", "true"),
            ]))
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.sqlite.path, "/tmp/x.db");
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example", "https://b.example", "https://front.example"]
        );
        assert!(config.server.expose_internal_errors);
    }

    #[test]
    fn test_frontend_url_extends_file_origins() {
        let mut config = Config::default();
        config.server.allowed_origins = vec!["https://file.example".to_string()];
        config
            .apply_env(env(&[("FRONTEND_URL", "https://front.example")]))
            .unwrap();
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://file.example", "https://front.example"]
        );

        // Already listed, not duplicated
        config
            .apply_env(env(&[("FRONTEND_URL", "https://file.example")]))
            .unwrap();
        assert_eq!(config.server.allowed_origins.len(), 2);
    }

    #[test]
    fn test_supabase_credentials_select_backend() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_KEY", "k")]))
            .unwrap();
        assert_eq!(config.storage.backend, Backend::Supabase);
        let supabase = config.storage.supabase.unwrap();
        assert_eq!(supabase.url, "https://x.supabase.co");
        assert_eq!(supabase.key, "k");
    }

    #[test]
    fn test_explicit_backend_wins() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SUPABASE_URL", "https://x.supabase.co"),
                ("SUPABASE_KEY", "k"),
                ("GSOS_BACKEND", "SQLite"),
            ]))
            .unwrap();
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert!(config.storage.supabase.is_some());
    }

    #[test]
    fn test_half_supabase_credentials_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap();
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert!(config.storage.supabase.is_none());
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Config::default().apply_env(env(&[("PORT", "http")])).is_err());
        assert!(Config::default().apply_env(env(&[("GSOS_BACKEND", "mysql")])).is_err());
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("HOST", "  "), ("PORT", "")])).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 10000);
    }
}

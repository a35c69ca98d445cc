//! TOML configuration with environment overrides.
//!
//! Lookup order: explicit `--config` path, `./portico.toml`, then
//! `<platform config dir>/portico/config.toml`. With none present the
//! built-in defaults apply. Environment variables win over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name probed in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "portico.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Root of the static file tree.
    pub public_dir: PathBuf,
    /// Served for directory requests, including `/`.
    pub index_document: String,
    /// Redirect target for unauthenticated requests to protected paths.
    pub login_page: String,
    /// Request paths that require a valid session cookie.
    pub protected_paths: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            index_document: "index.html".into(),
            login_page: "/Login.html".into(),
            protected_paths: vec!["/mainmenu.html".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Line-delimited JSON user records.
    pub users_file: PathBuf,
    pub session_ttl_secs: u64,
    pub cookie_name: String,
    /// Rewrite the users file without malformed lines before serving.
    pub compact_on_start: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users_file: PathBuf::from("users.txt"),
            session_ttl_secs: crate::auth::session::DEFAULT_SESSION_TTL_SECS,
            cookie_name: "sid".into(),
            compact_on_start: true,
        }
    }
}

impl Config {
    /// Resolve and load the configuration, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Apply `PORT`, `PORTICO_HOST`, `PORTICO_PUBLIC_DIR`, `PORTICO_USERS_FILE`
    /// and `PORTICO_SESSION_TTL_SECS`. Unparseable numbers are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(e) => tracing::warn!("Ignoring invalid PORT {port:?}: {e}"),
            }
        }
        if let Some(host) = lookup("PORTICO_HOST") {
            self.gateway.host = host;
        }
        if let Some(dir) = lookup("PORTICO_PUBLIC_DIR") {
            self.gateway.public_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("PORTICO_USERS_FILE") {
            self.auth.users_file = PathBuf::from(file);
        }
        if let Some(ttl) = lookup("PORTICO_SESSION_TTL_SECS") {
            match ttl.parse() {
                Ok(ttl) => self.auth.session_ttl_secs = ttl,
                Err(e) => tracing::warn!("Ignoring invalid PORTICO_SESSION_TTL_SECS {ttl:?}: {e}"),
            }
        }
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "portico") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gateway.login_page, "/Login.html");
        assert_eq!(config.gateway.protected_paths, vec!["/mainmenu.html"]);
        assert_eq!(config.auth.session_ttl_secs, 3600);
        assert_eq!(config.auth.cookie_name, "sid");
        assert!(config.auth.compact_on_start);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("portico.toml");
        std::fs::write(
            &path,
            "[gateway]\nport = 8080\n\n[auth]\nsession_ttl_secs = 60\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.auth.session_ttl_secs, 60);
        assert_eq!(config.auth.users_file, PathBuf::from("users.txt"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            ("PORT", "4000"),
            ("PORTICO_HOST", "0.0.0.0"),
            ("PORTICO_PUBLIC_DIR", "/srv/www"),
            ("PORTICO_USERS_FILE", "/var/lib/portico/users.txt"),
            ("PORTICO_SESSION_TTL_SECS", "120"),
        ]));

        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.public_dir, PathBuf::from("/srv/www"));
        assert_eq!(
            config.auth.users_file,
            PathBuf::from("/var/lib/portico/users.txt")
        );
        assert_eq!(config.auth.session_ttl_secs, 120);
    }

    #[test]
    fn invalid_env_numbers_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("PORT", "eighty"), ("PORTICO_SESSION_TTL_SECS", "")]));
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.auth.session_ttl_secs, 3600);
    }
}

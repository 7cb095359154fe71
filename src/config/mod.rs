pub mod structs;

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::file::Exists;
use structs::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write config {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot parse config {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("ADMIN_ID must be numeric, got {0:?}")]
    AdminId(String),
    #[error("PORT must be a port number, got {0:?}")]
    Port(String),
    #[error("missing telegram token or admin id, set TELEGRAM_TOKEN and ADMIN_ID or fill [telegram] in the config")]
    MissingCredentials,
}

/// Directory holding the config, uploads, logs and registry by default
pub fn base_dir() -> PathBuf {
    match home::home_dir() {
        Some(home) => home.join(".botpanel"),
        None => PathBuf::from(".botpanel"),
    }
}

pub fn default_path() -> PathBuf { base_dir().join("config.toml") }

/// Read the config at `path` (or the default location), writing defaults
/// when no file exists yet. Environment overrides are applied last.
pub fn read(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    let mut config = if Exists::check(&path).file() {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        toml::from_str::<Config>(&contents).map_err(|source| ConfigError::Parse { path: path.clone(), source })?
    } else {
        let config = Config::default();
        config.write(&path)?;
        log::info!("created default config at {}", path.display());
        config
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

impl Config {
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let encoded = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
        }

        fs::write(path, encoded).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    /// Apply `TELEGRAM_TOKEN`, `ADMIN_ID` and `PORT` on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN").filter(|token| !token.trim().is_empty()) {
            self.telegram.token = Some(token.trim().to_string());
        }

        if let Some(admin) = lookup("ADMIN_ID") {
            let admin_id = admin.trim().parse::<i64>().map_err(|_| ConfigError::AdminId(admin.clone()))?;
            self.telegram.admin_id = Some(admin_id);
        }

        if let Some(port) = lookup("PORT") {
            self.web.port = port.trim().parse::<u16>().map_err(|_| ConfigError::Port(port.clone()))?;
        }

        Ok(())
    }

    /// Token and operator id, both required before the chat poller may start
    pub fn credentials(&self) -> Result<(String, i64), ConfigError> {
        match (&self.telegram.token, self.telegram.admin_id) {
            (Some(token), Some(admin_id)) if !token.is_empty() => Ok((token.clone(), admin_id)),
            _ => Err(ConfigError::MissingCredentials),
        }
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
    fn test_read_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.write(&path).unwrap();
        assert!(path.exists());

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.web.port, 8000);
        assert_eq!(parsed.runner.program_extension, "py");

        config.apply_env(env(&[])).unwrap();
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[telegram]\ntoken = \"abc\"\nadmin_id = 42\n").unwrap();
        assert_eq!(parsed.credentials().unwrap(), ("abc".to_string(), 42));
        assert_eq!(parsed.telegram.poll_timeout, 30);
        assert_eq!(parsed.runner.installer.first().map(String::as_str), Some("python3"));
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let parsed: Config = toml::from_str("[web]\nport = 9000\n\n[runner]\ninterpreter = \"\"\n").unwrap();
        assert_eq!(parsed.web.port, 9000);
        assert_eq!(parsed.web.address, "0.0.0.0");
        assert_eq!(parsed.runner.program_extension, "py");
        assert_eq!(parsed.runner.interpreter.as_deref(), Some(""));
        assert_eq!(parsed.paths.registry.file_name().and_then(|n| n.to_str()), Some("bots_data.json"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TELEGRAM_TOKEN", "123:token"), ("ADMIN_ID", " 777 "), ("PORT", "9001")]))
            .unwrap();

        assert_eq!(config.credentials().unwrap(), ("123:token".to_string(), 777));
        assert_eq!(config.web.port, 9001);
    }

    #[test]
    fn test_env_rejects_non_numeric_admin() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("ADMIN_ID", "admin")])).unwrap_err();
        assert!(matches!(err, ConfigError::AdminId(value) if value == "admin"));
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = Config::default();
        assert!(matches!(config.apply_env(env(&[("PORT", "http")])), Err(ConfigError::Port(_))));
    }
}

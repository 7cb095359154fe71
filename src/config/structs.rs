use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub runner: Runner,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub web: Web,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Telegram {
    /// Bot token issued by BotFather
    pub token: Option<String>,
    /// Numeric user id of the only operator allowed to act
    pub admin_id: Option<i64>,
    /// Long-poll timeout for getUpdates, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runner {
    /// Interpreter the uploaded program is handed to. An empty string means
    /// the program file is executed directly and must carry its own shebang.
    pub interpreter: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Command prefix for dependency installation; the dependency file path is appended
    #[serde(default = "default_installer")]
    pub installer: Vec<String>,
    #[serde(default = "default_program_extension")]
    pub program_extension: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Paths {
    pub uploads: PathBuf,
    pub logs: PathBuf,
    pub registry: PathBuf,
    /// Operational log of the panel itself
    pub panel_log: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Web {
    pub address: String,
    pub port: u16,
}

fn default_poll_timeout() -> u64 { 30 }

fn default_installer() -> Vec<String> {
    ["python3", "-m", "pip", "install", "-r"]
        .iter()
        .map(|part| part.to_string())
        .collect()
}

fn default_program_extension() -> String { "py".to_string() }

impl Default for Telegram {
    fn default() -> Self {
        Self {
            token: None,
            admin_id: None,
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            interpreter: Some("python3".to_string()),
            args: vec![],
            installer: default_installer(),
            program_extension: default_program_extension(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        let base = super::base_dir();
        Self {
            uploads: base.join("uploaded_bots"),
            logs: base.join("bot_logs"),
            registry: base.join("bots_data.json"),
            panel_log: base.join("panel.log"),
        }
    }
}

impl Default for Web {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

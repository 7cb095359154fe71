use chrono::Local;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

static LOG_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Point the operational log at `path`. Only the first call takes effect.
pub fn init(path: &Path) {
    if LOG_PATH.set(path.to_path_buf()).is_err() {
        ::log::debug!("operational log already initialised");
    }
}

pub struct Logger {
    file: File,
}

/// Formats arguments into a string for logging
pub fn format_args(args: &BTreeMap<String, String>) -> String {
    args.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn format_line(message: &str, args: &BTreeMap<String, String>) -> String {
    match args.is_empty() {
        true => message.to_string(),
        false => format!("{message} ({})", format_args(args)),
    }
}

impl Logger {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Logger { file })
    }

    pub fn write(&mut self, line: &str) {
        // write errors are dropped so logging can never take the panel down
        let _ = writeln!(&mut self.file, "[{}] {line}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"));
    }
}

/// Backing function of the `log!` macro
pub fn write(message: &str, args: &BTreeMap<String, String>) {
    let line = format_line(message, args);
    ::log::info!("{line}");

    if let Some(path) = LOG_PATH.get() {
        match Logger::open(path) {
            Ok(mut logger) => logger.write(&line),
            Err(err) => ::log::warn!("cannot open operational log {}: {err}", path.display()),
        }
    }
}

#[macro_export]
macro_rules! log {
    ($msg:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut args = ::std::collections::BTreeMap::new();
        $(args.insert($key.to_string(), format!("{}", $value));)*
        $crate::oplog::write($msg, &args)
    }};
}

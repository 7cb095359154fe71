use colored::Colorize;
use macros_rs::{crashln, string};
use serde::Serialize;

use botpanel::{
    config::structs::Config,
    helpers,
    process::{
        dump::Registry,
        logs::{self, LogStream},
    },
};

use tabled::{
    settings::{
        object::{Columns, Rows, Segment},
        style::{BorderColor, Style},
        themes::Colorization,
        Color, Modify, Width,
    },
    Table, Tabled,
};

pub fn get_version(short: bool) -> String {
    match short {
        true => format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        false => match env!("GIT_HASH") {
            "" => format!("{} ({}) [{}]", env!("CARGO_PKG_VERSION"), env!("BUILD_DATE"), env!("PROFILE")),
            hash => format!("{} ({} {hash}) [{}]", env!("CARGO_PKG_VERSION"), env!("BUILD_DATE"), env!("PROFILE")),
        },
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Tabled)]
struct ProgramItem {
    name: String,
    pid: String,
    program: String,
    log: String,
}

fn items(registry: &Registry) -> Vec<ProgramItem> {
    registry
        .all()
        .map(|(name, record)| ProgramItem {
            name: name.clone(),
            pid: record.process_id.map(|pid| pid.to_string()).unwrap_or_else(|| string!("n/a")),
            program: record.path.display().to_string(),
            log: record.stdout_log_path.display().to_string(),
        })
        .collect()
}

fn open_registry(config: &Config) -> Registry {
    match Registry::peek(&config.paths.registry) {
        Ok(registry) => registry,
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    }
}

/// Print tracked programs. Reads the registry file only, so it works
/// whether or not the panel is running.
pub fn list(config: &Config, format: &String) {
    let registry = open_registry(config);
    let items = items(&registry);

    if items.is_empty() && format == "default" {
        return println!("{} No programs tracked in {}", *helpers::INFO, config.paths.registry.display());
    }

    let table = Table::new(&items)
        .with(Style::modern().remove_verticals())
        .with(Modify::new(Segment::all()).with(BorderColor::filled(Color::FG_BRIGHT_BLACK)))
        .with(Colorization::exact([Color::FG_BRIGHT_CYAN], Rows::first()))
        .with(Modify::new(Columns::single(2)).with(Width::truncate(48).suffix("... ")))
        .to_string();

    if let Ok(json) = serde_json::to_string(&items) {
        match format.as_str() {
            "raw" => println!("{:?}", items),
            "json" => println!("{json}"),
            "default" => println!("{table}"),
            other => crashln!("{} Unknown format {other:?}, use default, json or raw", *helpers::FAIL),
        };
    };
}

/// Print the last `lines` lines of a program's stdout (or stderr) log
pub fn logs(config: &Config, name: &str, lines: usize, errors: bool) {
    let registry = open_registry(config);

    let Some(record) = registry.get(name) else {
        crashln!("{} No program named {name}", *helpers::FAIL);
    };

    let (stream, path) = match errors {
        true => (LogStream::Stderr, &record.stderr_log_path),
        false => (LogStream::Stdout, &record.stdout_log_path),
    };

    match logs::tail(path, lines) {
        Ok(tail) => {
            let label = match stream {
                LogStream::Stdout => "out",
                LogStream::Stderr => "error",
            };
            println!("{}", format!("{name} {label} log ({}), last {lines} lines:", path.display()).bright_black());
            for line in tail {
                match stream {
                    LogStream::Stdout => println!("{} {line}", "|".white()),
                    LogStream::Stderr => println!("{} {line}", "|".red()),
                }
            }
        }
        Err(err) => crashln!("{} Cannot read {}: {err}", *helpers::FAIL, path.display()),
    }
}

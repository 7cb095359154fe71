use crate::{
    helpers,
    install::{InstallError, InstallOutcome},
    panel::{Deployed, RestartAllReport, StopAllReport, Stopped},
    telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

pub const WELCOME: &str = "Welcome to the deploy panel.\nSelect an option:";
pub const NOT_AUTHORIZED: &str = "You are not authorized.";
pub const UNAUTHORIZED: &str = "Unauthorized.";
pub const PRESS_DEPLOY: &str = "Press Deploy first.";
pub const ASK_DEPENDENCIES: &str = "Please upload requirements.txt or send 'none'.";
pub const NOTHING_RUNNING: &str = "No bots running.";
pub const NO_ACTIVE: &str = "No active bots.";
pub const SKIPPING: &str = "Skipping requirements. Deploying...";
pub const INSTALLING: &str = "Requirements received, installing...";

const LOG_PREFIX: &str = "log__";
const STOP_PREFIX: &str = "stop__";
const LOG_DIGEST_PREFIX: &str = "log#";
const STOP_DIGEST_PREFIX: &str = "stop#";

/// Telegram rejects inline buttons whose callback data exceeds this many bytes
pub const CALLBACK_DATA_LIMIT: usize = 64;

/// Program a button refers to. Names too long for the callback data are
/// carried as a digest and matched against the registry when pressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Name(String),
    Digest(u64),
}

impl Target {
    /// Name of the tracked program this target refers to, if any
    pub fn resolve(self, names: &[String]) -> Option<String> {
        match self {
            Target::Name(name) => Some(name),
            Target::Digest(digest) => names.iter().find(|name| name_digest(name) == digest).cloned(),
        }
    }

    fn parse_digest(hex: &str) -> Option<Self> {
        match hex.len() {
            16 => u64::from_str_radix(hex, 16).ok().map(Target::Digest),
            _ => None,
        }
    }
}

/// FNV-1a over the name bytes; stable across restarts so old buttons keep working
pub fn name_digest(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3))
}

/// Callback actions carried in inline button data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Deploy,
    List,
    ViewLogs,
    Log(Target),
    StopMenu,
    Stop(Target),
    StopAll,
    RestartAll,
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "deploy" => Action::Deploy,
            "list" => Action::List,
            "view_logs" => Action::ViewLogs,
            "stop_menu" => Action::StopMenu,
            "stop_all" => Action::StopAll,
            "restart_all" => Action::RestartAll,
            _ => {
                if let Some(name) = data.strip_prefix(LOG_PREFIX).filter(|name| !name.is_empty()) {
                    Action::Log(Target::Name(name.to_string()))
                } else if let Some(name) = data.strip_prefix(STOP_PREFIX).filter(|name| !name.is_empty()) {
                    Action::Stop(Target::Name(name.to_string()))
                } else if let Some(hex) = data.strip_prefix(LOG_DIGEST_PREFIX) {
                    Action::Log(Target::parse_digest(hex)?)
                } else if let Some(hex) = data.strip_prefix(STOP_DIGEST_PREFIX) {
                    Action::Stop(Target::parse_digest(hex)?)
                } else {
                    return None;
                }
            }
        };
        Some(action)
    }

    pub fn data(&self) -> String {
        match self {
            Action::Deploy => "deploy".to_string(),
            Action::List => "list".to_string(),
            Action::ViewLogs => "view_logs".to_string(),
            Action::Log(Target::Name(name)) => format!("{LOG_PREFIX}{name}"),
            Action::Log(Target::Digest(digest)) => format!("{LOG_DIGEST_PREFIX}{digest:016x}"),
            Action::StopMenu => "stop_menu".to_string(),
            Action::Stop(Target::Name(name)) => format!("{STOP_PREFIX}{name}"),
            Action::Stop(Target::Digest(digest)) => format!("{STOP_DIGEST_PREFIX}{digest:016x}"),
            Action::StopAll => "stop_all".to_string(),
            Action::RestartAll => "restart_all".to_string(),
        }
    }
}

fn button(text: &str, action: Action) -> Vec<InlineKeyboardButton> { vec![InlineKeyboardButton::new(text, action.data())] }

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            button("Deploy Bot", Action::Deploy),
            button("Active Bots", Action::List),
            button("View Logs", Action::ViewLogs),
            button("Stop Bot", Action::StopMenu),
            button("Stop All Bots", Action::StopAll),
            button("Restart All", Action::RestartAll),
        ],
    }
}

/// One button per program, each producing the action `to` builds. Names
/// that would overflow the callback data are sent as a digest.
pub fn program_menu(names: &[String], to: fn(Target) -> Action) -> InlineKeyboardMarkup {
    let inline_keyboard = names
        .iter()
        .map(|name| {
            let action = to(Target::Name(name.clone()));
            match action.data().len() <= CALLBACK_DATA_LIMIT {
                true => button(name, action),
                false => button(name, to(Target::Digest(name_digest(name)))),
            }
        })
        .collect();

    InlineKeyboardMarkup { inline_keyboard }
}

pub fn ask_program(extension: &str) -> String { format!("Please upload your .{} file.", extension.trim_start_matches('.')) }

pub fn wrong_program(extension: &str) -> String { format!("Please upload a .{} file.", extension.trim_start_matches('.')) }

pub fn program_received(file_name: &str) -> String { format!("{file_name} received. Now send requirements.txt or type 'none'.") }

pub fn active(list: &[(String, Option<u32>)]) -> String {
    if list.is_empty() {
        return NO_ACTIVE.to_string();
    }

    let lines: Vec<String> = list
        .iter()
        .map(|(name, pid)| match pid {
            Some(pid) => format!("• {name} (PID {pid})"),
            None => format!("• {name} (PID ?)"),
        })
        .collect();

    format!("Active Bots:\n{}", lines.join("\n"))
}

pub fn log_view(name: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return format!("Log for {name} is empty.");
    }
    helpers::pre_block(&format!("{}:\n", helpers::escape_html(name)), &lines.join("\n"))
}

pub fn install(outcome: &Result<InstallOutcome, InstallError>) -> String {
    match outcome {
        Ok(InstallOutcome::Installed) => "Requirements installed.".to_string(),
        Ok(InstallOutcome::Failed { stderr_tail, .. }) => {
            helpers::tail_chars(&format!("pip install failed:\n{stderr_tail}"), helpers::MESSAGE_LIMIT).to_string()
        }
        Err(err) => format!("pip install failed: {err}"),
    }
}

pub fn deployed(deployed: &Deployed) -> String {
    match deployed.replaced {
        Some(old) => format!("{} restarted (PID: {}, replaced {old}).", deployed.name, deployed.pid),
        None => format!("{} started (PID: {}).", deployed.name, deployed.pid),
    }
}

pub fn stopped(stopped: &Stopped) -> String {
    match (&stopped.signal, stopped.pid) {
        (Some(Ok(_)), Some(pid)) => format!("Stopped {} (PID {pid}).", stopped.name),
        (Some(Err(err)), _) => format!("Removed {}, but could not signal it: {err}", stopped.name),
        _ => format!("Removed {} (no process id recorded).", stopped.name),
    }
}

pub fn stop_all(report: &StopAllReport) -> String {
    let mut text = format!("Stopped {} bots.", report.delivered());
    for (name, err) in report.failed() {
        text.push_str(&format!("\nFailed to signal {name}: {err}"));
    }
    text
}

pub fn restart_all(report: &RestartAllReport) -> String {
    let mut text = format!("Restarted {} bots.", report.restarted.len());
    if !report.skipped.is_empty() {
        text.push_str(&format!("\nSkipped (file missing): {}", report.skipped.join(", ")));
    }
    for (name, err) in &report.failed {
        text.push_str(&format!("\nFailed to restart {name}: {err}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TerminationError;

    #[test]
    fn test_action_data_parses_back() {
        for action in [
            Action::Deploy,
            Action::List,
            Action::ViewLogs,
            Action::Log(Target::Name("42_bot.py".into())),
            Action::Log(Target::Digest(0x0123_4567_89ab_cdef)),
            Action::StopMenu,
            Action::Stop(Target::Name("my bot.py".into())),
            Action::Stop(Target::Digest(u64::MAX)),
            Action::StopAll,
            Action::RestartAll,
        ] {
            assert_eq!(Action::parse(&action.data()), Some(action));
        }
    }

    #[test]
    fn test_action_rejects_unknown() {
        assert_eq!(Action::parse("log__"), None);
        assert_eq!(Action::parse("reboot"), None);
        assert_eq!(Action::parse("log__stop__x"), Some(Action::Log(Target::Name("stop__x".into()))));
        assert_eq!(Action::parse("log#abc"), None);
        assert_eq!(Action::parse("stop#zzzzzzzzzzzzzzzz"), None);
    }

    #[test]
    fn test_long_names_fit_callback_limit() {
        let long = "1234567890_my_really_descriptive_crypto_trading_signal_bot_v2.py".to_string();
        let names = vec!["a.py".to_string(), long.clone(), format!("{}.py", "x".repeat(300))];

        for to in [Action::Log as fn(Target) -> Action, Action::Stop] {
            let menu = program_menu(&names, to);
            for row in &menu.inline_keyboard {
                assert!(row[0].callback_data.len() <= CALLBACK_DATA_LIMIT, "{} is too long", row[0].callback_data);
            }
            assert_eq!(menu.inline_keyboard[1][0].text, long);
        }

        let menu = program_menu(&names, Action::Stop);
        assert_eq!(menu.inline_keyboard[0][0].callback_data, "stop__a.py");

        let pressed = Action::parse(&menu.inline_keyboard[1][0].callback_data).unwrap();
        match pressed {
            Action::Stop(target) => assert_eq!(target.resolve(&names), Some(long)),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_digest_of_removed_program_resolves_to_nothing() {
        let target = Target::Digest(name_digest("gone.py"));
        assert_eq!(target.resolve(&["other.py".to_string()]), None);
    }

    #[test]
    fn test_main_menu_layout() {
        let menu = main_menu();
        let data: Vec<&str> = menu.inline_keyboard.iter().map(|row| row[0].callback_data.as_str()).collect();
        assert_eq!(data, vec!["deploy", "list", "view_logs", "stop_menu", "stop_all", "restart_all"]);
    }

    #[test]
    fn test_program_menu() {
        let menu = program_menu(&["a.py".to_string(), "b.py".to_string()], Action::Stop);
        assert_eq!(menu.inline_keyboard.len(), 2);
        assert_eq!(menu.inline_keyboard[1][0].text, "b.py");
        assert_eq!(menu.inline_keyboard[1][0].callback_data, "stop__b.py");
    }

    #[test]
    fn test_active_listing() {
        assert_eq!(active(&[]), NO_ACTIVE);
        assert_eq!(
            active(&[("a.py".into(), Some(10)), ("b.py".into(), None)]),
            "Active Bots:\n• a.py (PID 10)\n• b.py (PID ?)"
        );
    }

    #[test]
    fn test_log_view_escapes() {
        let view = log_view("bot.py", &["<ok> & done".to_string()]);
        assert_eq!(view, "bot.py:\n<pre>&lt;ok&gt; &amp; done</pre>");
        assert_eq!(log_view("bot.py", &[]), "Log for bot.py is empty.");
    }

    #[test]
    fn test_stop_all_summary() {
        let report = StopAllReport {
            stopped: vec![Stopped {
                name: "stale.py".into(),
                pid: Some(5),
                signal: Some(Err(TerminationError::InvalidPid(5))),
            }],
        };
        let text = stop_all(&report);
        assert!(text.starts_with("Stopped 0 bots."));
        assert!(text.contains("Failed to signal stale.py"));
    }

    #[test]
    fn test_install_failure_message() {
        let outcome = Ok(InstallOutcome::Failed {
            code: Some(1),
            stderr_tail: "ERROR: No matching distribution".into(),
        });
        assert_eq!(install(&outcome), "pip install failed:\nERROR: No matching distribution");
    }
}

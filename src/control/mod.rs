//! Chat front-end: polls Telegram, checks the operator, and turns menu
//! callbacks and uploads into panel operations.

pub mod menu;
pub mod session;

use crate::{
    config::structs::Config,
    install::Installer,
    log,
    panel::{Panel, PanelError},
    telegram::{
        types::{CallbackQuery, Document, InlineKeyboardMarkup, Message, Update},
        Bot,
    },
};

use anyhow::Result;
use menu::{Action, Target};
use session::{Session, Sessions, Upload};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Lines shown by the log view
pub const LOG_LINES: usize = 50;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub html: bool,
    pub markup: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
            markup: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self { Self { html: true, ..Self::text(text) } }

    pub fn with_menu(text: impl Into<String>, markup: InlineKeyboardMarkup) -> Self {
        Self {
            markup: Some(markup),
            ..Self::text(text)
        }
    }
}

pub struct Control {
    bot: Bot,
    panel: Arc<Panel>,
    sessions: Sessions,
    installer: Installer,
    admin_id: i64,
    uploads: PathBuf,
    program_extension: String,
    poll_timeout: u64,
}

impl Control {
    pub fn new(config: &Config, panel: Arc<Panel>) -> Result<Self> {
        let (token, admin_id) = config.credentials()?;

        Ok(Self {
            bot: Bot::new(token, config.telegram.poll_timeout)?,
            panel,
            sessions: Sessions::default(),
            installer: Installer::new(config.runner.installer.clone()),
            admin_id,
            uploads: config.paths.uploads.clone(),
            program_extension: config.runner.program_extension.clone(),
            poll_timeout: config.telegram.poll_timeout,
        })
    }

    /// Long-poll for updates until the task is dropped
    pub async fn run(self: Arc<Self>) {
        let mut offset = None;
        log!("[control] polling for updates", "admin" => self.admin_id);

        loop {
            match self.bot.get_updates(offset, self.poll_timeout).await {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.dispatch(update).await;
                    }
                }
                Err(err) => {
                    ::log::warn!("[control] getUpdates failed: {err:#}");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    pub fn is_admin(&self, user: i64) -> bool { user == self.admin_id }

    async fn dispatch(self: &Arc<Self>, update: Update) {
        if let Some(query) = update.callback_query {
            self.on_callback(query).await;
        } else if let Some(message) = update.message {
            self.on_message(message).await;
        }
    }

    async fn on_callback(self: &Arc<Self>, query: CallbackQuery) {
        if let Err(err) = self.bot.answer_callback(&query.id, None).await {
            ::log::warn!("[control] failed to answer callback: {err:#}");
        }

        let user = query.from.id;
        let chat = query.message.as_ref().map(|message| message.chat.id).unwrap_or(user);

        if !self.is_admin(user) {
            self.send(chat, Reply::text(menu::UNAUTHORIZED)).await;
            return;
        }

        let reply = match query.data.as_deref().and_then(Action::parse) {
            Some(action) => self.act(user, action).await,
            None => Reply::text("Unknown action."),
        };
        self.send(chat, reply).await;
    }

    async fn on_message(self: &Arc<Self>, message: Message) {
        let chat = message.chat.id;
        let Some(user) = message.from.as_ref().map(|from| from.id) else { return };

        if let Some(document) = &message.document {
            match self.is_admin(user) {
                true => self.on_document(chat, user, document).await,
                false => self.send(chat, Reply::text(menu::UNAUTHORIZED)).await,
            }
            return;
        }

        let Some(text) = message.text.as_deref() else { return };

        if is_command(text, "start") {
            let reply = match self.is_admin(user) {
                true => Reply::with_menu(menu::WELCOME, menu::main_menu()),
                false => Reply::text(menu::NOT_AUTHORIZED),
            };
            self.send(chat, reply).await;
            return;
        }

        if !self.is_admin(user) {
            return;
        }

        if let Some(program) = self.sessions.get(user).skip(text).map(Path::to_path_buf) {
            self.send(chat, Reply::text(menu::SKIPPING)).await;
            self.spawn_deploy(chat, user, program, None);
        }
    }

    /// Run `on_action` on the blocking pool, since stopping and relaunching
    /// programs waits on the registry lock and the filesystem
    pub async fn act(self: &Arc<Self>, user: i64, action: Action) -> Reply {
        let control = Arc::clone(self);
        match tokio::task::spawn_blocking(move || control.on_action(user, action)).await {
            Ok(reply) => reply,
            Err(err) => {
                log!("[control] action task failed", "error" => err.to_string());
                Reply::text(format!("Action failed: {err}"))
            }
        }
    }

    /// Apply a menu action for the operator and build the reply
    pub fn on_action(&self, user: i64, action: Action) -> Reply {
        match action {
            Action::Deploy => {
                self.sessions.begin(user);
                Reply::text(menu::ask_program(&self.program_extension))
            }
            Action::List => Reply::text(menu::active(&self.panel.list())),
            Action::ViewLogs => self.program_picker("Select bot:", Action::Log),
            Action::StopMenu => self.program_picker("Select bot to stop:", Action::Stop),
            Action::Log(target) => {
                let Some(name) = self.resolve(target) else { return Reply::text("Not found.") };
                self.view_log(&name)
            }
            Action::Stop(target) => {
                let Some(name) = self.resolve(target) else { return Reply::text("Not found.") };
                self.stop(&name)
            }
            Action::StopAll => match self.panel.stop_all() {
                Ok(report) => Reply::text(menu::stop_all(&report)),
                Err(err) => Reply::text(format!("Processes signalled, but saving state failed: {err}")),
            },
            Action::RestartAll => match self.panel.restart_all() {
                Ok(report) => Reply::text(menu::restart_all(&report)),
                Err(err) => Reply::text(format!("Restart finished, but saving state failed: {err}")),
            },
        }
    }

    fn resolve(&self, target: Target) -> Option<String> {
        match target {
            Target::Name(name) => Some(name),
            digest => digest.resolve(&self.panel.names()),
        }
    }

    fn view_log(&self, name: &str) -> Reply {
        match self.panel.tail_log(name, LOG_LINES) {
            Ok(lines) => Reply::html(menu::log_view(name, &lines)),
            Err(PanelError::NotFound(_)) => Reply::text("Not found."),
            Err(PanelError::NoLog(_)) => Reply::text("No log found."),
            Err(err) => Reply::text(err.to_string()),
        }
    }

    fn stop(&self, name: &str) -> Reply {
        match self.panel.stop_one(name) {
            Ok(stopped) => Reply::text(menu::stopped(&stopped)),
            Err(PanelError::NotFound(_)) => Reply::text("Not found."),
            Err(err) => Reply::text(format!("Stop failed: {err}")),
        }
    }

    fn program_picker(&self, prompt: &str, to: fn(Target) -> Action) -> Reply {
        let names = self.panel.names();
        match names.is_empty() {
            true => Reply::text(menu::NOTHING_RUNNING),
            false => Reply::with_menu(prompt, menu::program_menu(&names, to)),
        }
    }

    async fn on_document(self: &Arc<Self>, chat: i64, user: i64, document: &Document) {
        let file_name = document.file_name.clone().unwrap_or_default();
        let session = self.sessions.get(user);

        match session.upload(&file_name, &self.program_extension) {
            Upload::NotStarted => self.send(chat, Reply::text(menu::PRESS_DEPLOY)).await,
            Upload::Rejected => {
                let text = match session {
                    Session::AwaitingProgram => menu::wrong_program(&self.program_extension),
                    _ => menu::ASK_DEPENDENCIES.to_string(),
                };
                self.send(chat, Reply::text(text)).await;
            }
            Upload::Program => {
                let dest = upload_path(&self.uploads, user, &file_name);
                match self.bot.download(&document.file_id, &dest).await {
                    Ok(saved) => {
                        self.sessions.program_received(user, saved);
                        self.send(chat, Reply::text(menu::program_received(&file_name))).await;
                    }
                    Err(err) => self.download_failed(chat, &file_name, err).await,
                }
            }
            Upload::Dependencies { program_path } => {
                let dest = upload_path(&self.uploads, user, "requirements.txt");
                match self.bot.download(&document.file_id, &dest).await {
                    Ok(saved) => {
                        self.send(chat, Reply::text(menu::INSTALLING)).await;
                        self.spawn_deploy(chat, user, program_path, Some(saved));
                    }
                    Err(err) => self.download_failed(chat, &file_name, err).await,
                }
            }
        }
    }

    async fn download_failed(&self, chat: i64, file_name: &str, err: anyhow::Error) {
        log!("[control] download failed", "file" => file_name, "error" => format!("{err:#}"));
        self.send(chat, Reply::text(format!("Could not download {file_name}: {err}"))).await;
    }

    /// Install and launch on a separate task so polling continues meanwhile
    fn spawn_deploy(self: &Arc<Self>, chat: i64, user: i64, program: PathBuf, dependencies: Option<PathBuf>) {
        self.sessions.finish(user);
        let control = Arc::clone(self);

        tokio::spawn(async move {
            let report = control.panel.deploy_with(&control.installer, &program, dependencies.as_deref()).await;

            if let Some(install) = &report.install {
                control.send(chat, Reply::text(menu::install(install))).await;
            }

            let reply = match &report.deploy {
                Ok(deployed) => menu::deployed(deployed),
                Err(err) => format!("Deploy failed: {err}"),
            };
            control.send(chat, Reply::text(reply)).await;
        });
    }

    async fn send(&self, chat: i64, reply: Reply) {
        let parse_mode = reply.html.then_some("HTML");
        let Err(err) = self.bot.send_message(chat, &reply.text, parse_mode, reply.markup.as_ref()).await else { return };
        ::log::warn!("[control] failed to send reply to {chat}: {err:#}");

        // the operator would otherwise see nothing after pressing a button
        if let Some(fallback) = fallback(&reply) {
            if let Err(err) = self.bot.send_message(chat, &fallback.text, None, None).await {
                ::log::warn!("[control] failed to send fallback to {chat}: {err:#}");
            }
        }
    }
}

/// Plain-text notice sent when a formatted reply or one carrying a menu is
/// rejected. Plain replies get none since the notice would fail the same way.
fn fallback(reply: &Reply) -> Option<Reply> {
    match reply.html || reply.markup.is_some() {
        true => Some(Reply::text("Could not show that reply, see the panel log for details.")),
        false => None,
    }
}

/// `<uploads>/<user>_<file name>`, keeping only the last path component of
/// the name the client sent
pub fn upload_path(uploads: &Path, user: i64, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    uploads.join(format!("{user}_{base}"))
}

/// `/name` or `/name@botname`, optionally followed by arguments
fn is_command(text: &str, name: &str) -> bool {
    let Some(first) = text.split_whitespace().next() else { return false };
    let Some(command) = first.strip_prefix('/') else { return false };
    command.split('@').next() == Some(name)
}

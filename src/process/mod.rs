pub mod dump;
pub mod logs;
pub mod reconcile;
pub mod unix;

use crate::{config::structs::Runner, log};

use std::{
    fs::{self, File, OpenOptions},
    io,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

use dashmap::DashMap;
use nix::{errno::Errno, sys::signal::Signal};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("program {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("cannot open log file {}: {source}", path.display())]
    Log { path: PathBuf, source: io::Error },
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
}

#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("{0} is not a signalable process id")]
    InvalidPid(u32),
    #[error("cannot signal pid {pid} (group: {group}, process: {process})")]
    Delivery { pid: u32, group: Errno, process: Errno },
}

/// How a termination signal reached its target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signalled {
    /// SIGTERM went to the whole process group with this id
    Group(u32),
    /// Group delivery failed, the single process was signalled instead
    Process,
}

/// A freshly started program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launched {
    pub pid: u32,
    /// Canonical location of the program that was started
    pub program: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// Starts uploaded programs as detached session leaders and tears their
/// process groups down again.
///
/// Spawned `Child` handles are kept until the child exits so it can be
/// reaped; see [`Supervisor::reap`].
pub struct Supervisor {
    logs: PathBuf,
    interpreter: Option<String>,
    args: Vec<String>,
    handles: DashMap<u32, Child>,
}

impl Supervisor {
    pub fn new(logs: impl Into<PathBuf>, runner: &Runner) -> Self {
        let interpreter = runner.interpreter.clone().filter(|interpreter| !interpreter.trim().is_empty());
        Self::with_interpreter(logs, interpreter, runner.args.clone())
    }

    /// Supervisor that hands programs to `interpreter`, or executes them
    /// directly when it is `None`.
    pub fn with_interpreter(logs: impl Into<PathBuf>, interpreter: Option<String>, args: Vec<String>) -> Self {
        Self {
            logs: logs.into(),
            interpreter,
            args,
            handles: DashMap::new(),
        }
    }

    /// Deterministic stdout/stderr log locations for `name`
    pub fn log_paths(&self, name: &str) -> (PathBuf, PathBuf) {
        let base = name.replace(['/', ' '], "_");
        (self.logs.join(format!("{base}.log")), self.logs.join(format!("{base}.err")))
    }

    /// Start `program` in a new session with its output appended to the
    /// per-name log files and its working directory set to the program's own
    /// directory.
    pub fn launch(&self, program: &Path, name: &str) -> Result<Launched, LaunchError> {
        let program = fs::canonicalize(program)
            .ok()
            .filter(|path| path.is_file())
            .ok_or_else(|| LaunchError::Missing { path: program.to_path_buf() })?;

        let workdir = program.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        let (stdout_path, stderr_path) = self.log_paths(name);

        fs::create_dir_all(&self.logs).map_err(|source| LaunchError::Log { path: self.logs.clone(), source })?;
        let stdout = open_append(&stdout_path)?;
        let stderr = open_append(&stderr_path)?;

        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.args(&self.args).arg(&program);
                command
            }
            None => Command::new(&program),
        };

        cmd.current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // SAFETY: the hook only calls setsid between fork and exec
        unsafe {
            cmd.pre_exec(unix::detach_session);
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: match &self.interpreter {
                Some(interpreter) => format!("{interpreter} {}", program.display()),
                None => program.display().to_string(),
            },
            source,
        })?;

        let pid = child.id();
        self.handles.insert(pid, child);
        ::log::debug!("launched {name} as pid {pid} in {}", workdir.display());

        Ok(Launched {
            pid,
            program,
            stdout: stdout_path,
            stderr: stderr_path,
        })
    }

    /// Send SIGTERM to the process group rooted at `pid`, falling back to the
    /// single process when the group cannot be signalled.
    ///
    /// The pid is not checked for liveness first; if the OS recycled it the
    /// signal reaches whatever now owns it.
    pub fn terminate(&self, pid: u32) -> Result<Signalled, TerminationError> {
        let target = unix::to_pid(pid).ok_or(TerminationError::InvalidPid(pid))?;

        let group = match unix::signal_group(target, Signal::SIGTERM) {
            Ok(pgid) => return Ok(Signalled::Group(pgid.as_raw() as u32)),
            Err(errno) => errno,
        };

        ::log::debug!("group signal for pid {pid} failed ({group}), signalling the process");
        match unix::signal_process(target, Signal::SIGTERM) {
            Ok(()) => Ok(Signalled::Process),
            Err(process) => {
                log!("[supervisor] termination failed", "pid" => pid, "group" => group, "process" => process);
                Err(TerminationError::Delivery { pid, group, process })
            }
        }
    }

    /// Collect exit statuses of finished children, returning how many were reaped
    pub fn reap(&self) -> usize {
        let before = self.handles.len();

        self.handles.retain(|pid, child| match child.try_wait() {
            Ok(Some(status)) => {
                log!("[supervisor] reaped exited process", "pid" => pid, "status" => status);
                false
            }
            Ok(None) => true,
            Err(err) => {
                ::log::warn!("[supervisor] try_wait failed for pid {pid}: {err}");
                true
            }
        });

        before.saturating_sub(self.handles.len())
    }

    /// Number of children still held for reaping
    pub fn tracked(&self) -> usize { self.handles.len() }
}

fn open_append(path: &Path) -> Result<File, LaunchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LaunchError::Log { path: path.to_path_buf(), source })
}

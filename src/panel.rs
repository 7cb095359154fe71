//! Operator-facing operations over the registry and supervisor
//!
//! The registry sits behind one coarse lock. Every mutating operation holds
//! it across the supervisor call and the save that follows, so memory and
//! disk never diverge. Dependency installation and log reads happen outside
//! the lock.

use crate::{
    install::{InstallError, InstallOutcome, Installer},
    log,
    process::{
        dump::{ProgramRecord, Registry, RegistryError},
        logs::{self, LogStream},
        reconcile::{self, ReconcileReport},
        LaunchError, Launched, Signalled, Supervisor, TerminationError,
    },
};

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no program named {0}")]
    NotFound(String),
    #[error("cannot derive a program name from {}", .0.display())]
    Unnamed(PathBuf),
    #[error("no log found for {0}")]
    NoLog(String),
    #[error("cannot read log for {name}: {source}")]
    LogRead { name: String, source: io::Error },
    #[error("previous instance {previous} of {name} was stopped, but the new one failed to start: {source}")]
    Relaunch { name: String, previous: u32, source: LaunchError },
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployed {
    pub name: String,
    pub pid: u32,
    /// Process id of the instance this deploy replaced, if any
    pub replaced: Option<u32>,
}

/// Result of a deploy that may have installed dependencies first
#[derive(Debug)]
pub struct DeployReport {
    pub install: Option<Result<InstallOutcome, InstallError>>,
    pub deploy: Result<Deployed, PanelError>,
}

#[derive(Debug)]
pub struct Stopped {
    pub name: String,
    pub pid: Option<u32>,
    /// `None` when the record carried no process id to signal
    pub signal: Option<Result<Signalled, TerminationError>>,
}

impl Stopped {
    pub fn delivered(&self) -> bool { matches!(self.signal, Some(Ok(_))) }
}

#[derive(Debug, Default)]
pub struct StopAllReport {
    pub stopped: Vec<Stopped>,
}

impl StopAllReport {
    pub fn delivered(&self) -> usize { self.stopped.iter().filter(|stop| stop.delivered()).count() }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &TerminationError)> {
        self.stopped.iter().filter_map(|stop| match &stop.signal {
            Some(Err(err)) => Some((stop.name.as_str(), err)),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
pub struct RestartAllReport {
    pub restarted: Vec<(String, u32)>,
    /// Records whose program file is gone; they are kept as they were
    pub skipped: Vec<String>,
    pub failed: Vec<(String, LaunchError)>,
}

pub struct Panel {
    registry: Mutex<Registry>,
    supervisor: Supervisor,
}

impl Panel {
    pub fn new(registry: Registry, supervisor: Supervisor) -> Self {
        Self {
            registry: Mutex::new(registry),
            supervisor,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> { self.registry.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn supervisor(&self) -> &Supervisor { &self.supervisor }

    /// Boot pass: relaunch surviving programs and drop the missing ones
    pub fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let mut registry = self.registry();
        reconcile::run(&mut registry, &self.supervisor)
    }

    /// Launch `program` under its file name, replacing any instance already
    /// tracked under that name.
    pub fn deploy(&self, program: &Path) -> Result<Deployed, PanelError> {
        let name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PanelError::Unnamed(program.to_path_buf()))?;

        let mut registry = self.registry();

        let replaced = registry.get(&name).and_then(|record| record.process_id);
        if let Some(pid) = replaced {
            if let Err(err) = self.supervisor.terminate(pid) {
                log!("[deploy] previous instance not signalled", "name" => name, "error" => err);
            }
        }

        let launched = match (self.supervisor.launch(program, &name), replaced) {
            (Ok(launched), _) => launched,
            (Err(source), Some(previous)) => {
                // the signalled pid must not be reported as running
                if let Some(record) = registry.get_mut(&name) {
                    record.process_id = None;
                }
                registry.save()?;
                log!("[deploy] relaunch failed after stopping previous instance", "name" => name, "previous" => previous, "error" => source);
                return Err(PanelError::Relaunch { name, previous, source });
            }
            (Err(source), None) => return Err(source.into()),
        };
        let pid = launched.pid;
        registry.upsert(name.as_str(), record_for(launched));
        registry.save()?;

        log!("[deploy] started", "name" => name, "pid" => pid);
        Ok(Deployed { name, pid, replaced })
    }

    /// Install `dependencies` when given, then deploy `program`. An install
    /// failure is reported but does not prevent the launch.
    pub async fn deploy_with(&self, installer: &Installer, program: &Path, dependencies: Option<&Path>) -> DeployReport {
        let install = match dependencies {
            Some(path) => Some(installer.install(path).await),
            None => None,
        };

        DeployReport {
            install,
            deploy: self.deploy(program),
        }
    }

    /// Remove `name` and terminate its process group. The record is removed
    /// even when the signal cannot be delivered.
    pub fn stop_one(&self, name: &str) -> Result<Stopped, PanelError> {
        let mut registry = self.registry();
        let record = registry.remove(name).ok_or_else(|| PanelError::NotFound(name.to_string()))?;

        let stopped = self.stop_record(name.to_string(), record);
        registry.save()?;

        Ok(stopped)
    }

    /// Terminate every tracked program and clear the registry
    pub fn stop_all(&self) -> Result<StopAllReport, RegistryError> {
        let mut registry = self.registry();

        let stopped = registry
            .clear()
            .into_iter()
            .map(|(name, record)| self.stop_record(name, record))
            .collect();

        registry.save()?;
        Ok(StopAllReport { stopped })
    }

    /// Relaunch every record whose program still exists, terminating the
    /// previous instance first.
    pub fn restart_all(&self) -> Result<RestartAllReport, RegistryError> {
        let mut registry = self.registry();
        let mut report = RestartAllReport::default();

        for name in registry.names() {
            let Some(record) = registry.get(&name).cloned() else { continue };

            if !record.path.is_file() {
                report.skipped.push(name);
                continue;
            }

            if let Some(pid) = record.process_id {
                if let Err(err) = self.supervisor.terminate(pid) {
                    log!("[restart] previous instance not signalled", "name" => name, "error" => err);
                }
            }

            match self.supervisor.launch(&record.path, &name) {
                Ok(launched) => {
                    report.restarted.push((name.clone(), launched.pid));
                    registry.upsert(name, record_for(launched));
                }
                Err(err) => {
                    log!("[restart] launch failed", "name" => name, "error" => err);
                    report.failed.push((name, err));
                }
            }
        }

        registry.save()?;
        Ok(report)
    }

    /// Tracked programs and their last known process id, in name order
    pub fn list(&self) -> Vec<(String, Option<u32>)> { self.registry().all().map(|(name, record)| (name.clone(), record.process_id)).collect() }

    pub fn names(&self) -> Vec<String> { self.registry().names() }

    pub fn count(&self) -> usize { self.registry().len() }

    pub fn tail_log(&self, name: &str, max_lines: usize) -> Result<Vec<String>, PanelError> { self.tail_stream(name, LogStream::Stdout, max_lines) }

    pub fn tail_stream(&self, name: &str, stream: LogStream, max_lines: usize) -> Result<Vec<String>, PanelError> {
        let path = {
            let registry = self.registry();
            let record = registry.get(name).ok_or_else(|| PanelError::NotFound(name.to_string()))?;
            match stream {
                LogStream::Stdout => record.stdout_log_path.clone(),
                LogStream::Stderr => record.stderr_log_path.clone(),
            }
        };

        if path.as_os_str().is_empty() {
            return Err(PanelError::NoLog(name.to_string()));
        }

        logs::tail(&path, max_lines).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PanelError::NoLog(name.to_string()),
            _ => PanelError::LogRead { name: name.to_string(), source },
        })
    }

    /// Reap exited children; returns how many were collected
    pub fn reap(&self) -> usize { self.supervisor.reap() }

    fn stop_record(&self, name: String, record: ProgramRecord) -> Stopped {
        let signal = record.process_id.map(|pid| self.supervisor.terminate(pid));

        match &signal {
            Some(Err(err)) => log!("[stop] record removed, termination failed", "name" => name, "error" => err),
            _ => log!("[stop] stopped", "name" => name),
        }

        Stopped {
            name,
            pid: record.process_id,
            signal,
        }
    }
}

fn record_for(launched: Launched) -> ProgramRecord {
    ProgramRecord {
        path: launched.program,
        process_id: Some(launched.pid),
        stdout_log_path: launched.stdout,
        stderr_log_path: launched.stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::{drain, script, shell_supervisor};
    use std::{fs, os::unix::fs::PermissionsExt};

    const DEAD_PID: u32 = i32::MAX as u32 - 1000;

    fn panel(dir: &Path) -> Panel { Panel::new(Registry::empty(dir.join("bots_data.json")), shell_supervisor(&dir.join("logs"))) }

    fn teardown(panel: &Panel) {
        let _ = panel.stop_all();
        drain(panel.supervisor());
    }

    #[test]
    fn test_deploy_registers_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let program = script(dir.path(), "42_bot.py", "sleep 30");

        let deployed = panel.deploy(&program).unwrap();
        assert_eq!(deployed.name, "42_bot.py");
        assert_eq!(deployed.replaced, None);
        assert_eq!(panel.list(), vec![("42_bot.py".to_string(), Some(deployed.pid))]);

        let on_disk = Registry::peek(&dir.path().join("bots_data.json")).unwrap();
        assert_eq!(on_disk.get("42_bot.py").and_then(|r| r.process_id), Some(deployed.pid));
        assert_eq!(panel.count(), 1);

        teardown(&panel);
    }

    #[test]
    fn test_redeploy_replaces_previous_instance() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let program = script(dir.path(), "bot.py", "sleep 30");

        let first = panel.deploy(&program).unwrap();
        let second = panel.deploy(&program).unwrap();

        assert_eq!(second.replaced, Some(first.pid));
        assert_ne!(first.pid, second.pid);
        assert_eq!(panel.count(), 1);

        teardown(&panel);
    }

    #[test]
    fn test_deploy_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());

        let err = panel.deploy(&dir.path().join("gone.py")).unwrap_err();
        assert!(matches!(err, PanelError::Launch(LaunchError::Missing { .. })));
        assert_eq!(panel.count(), 0);
    }

    #[test]
    fn test_failed_redeploy_reports_stopped_instance() {
        let dir = tempfile::tempdir().unwrap();
        let panel = Panel::new(
            Registry::empty(dir.path().join("bots_data.json")),
            Supervisor::with_interpreter(dir.path().join("logs"), None, vec![]),
        );
        let program = script(dir.path(), "bot.sh", "sleep 30");
        let first = panel.deploy(&program).unwrap();

        fs::set_permissions(&program, fs::Permissions::from_mode(0o644)).unwrap();
        let err = panel.deploy(&program).unwrap_err();

        match &err {
            PanelError::Relaunch { name, previous, .. } => {
                assert_eq!(name, "bot.sh");
                assert_eq!(*previous, first.pid);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&format!("previous instance {} of bot.sh was stopped", first.pid)));
        assert_eq!(panel.list(), vec![("bot.sh".to_string(), None)]);

        let on_disk = Registry::peek(&dir.path().join("bots_data.json")).unwrap();
        assert_eq!(on_disk.get("bot.sh").and_then(|r| r.process_id), None);
        drain(panel.supervisor());
    }

    #[test]
    fn test_stop_one() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let program = script(dir.path(), "bot.py", "sleep 30");
        let deployed = panel.deploy(&program).unwrap();

        let stopped = panel.stop_one("bot.py").unwrap();
        assert_eq!(stopped.pid, Some(deployed.pid));
        assert!(matches!(stopped.signal, Some(Ok(Signalled::Group(_)))));
        assert!(Registry::peek(&dir.path().join("bots_data.json")).unwrap().is_empty());

        assert!(matches!(panel.stop_one("bot.py"), Err(PanelError::NotFound(name)) if name == "bot.py"));
        drain(panel.supervisor());
    }

    #[test]
    fn test_stop_all_clears_state_despite_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::empty(dir.path().join("bots_data.json"));
        registry.upsert(
            "stale.py",
            ProgramRecord {
                path: dir.path().join("stale.py"),
                process_id: Some(DEAD_PID),
                ..Default::default()
            },
        );
        registry.upsert("never.py", ProgramRecord::default());
        let panel = Panel::new(registry, shell_supervisor(&dir.path().join("logs")));
        panel.deploy(&script(dir.path(), "live.py", "sleep 30")).unwrap();

        let report = panel.stop_all().unwrap();

        assert_eq!(report.stopped.len(), 3);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed().map(|(name, _)| name).collect::<Vec<_>>(), vec!["stale.py"]);
        assert_eq!(panel.count(), 0);
        assert!(Registry::peek(&dir.path().join("bots_data.json")).unwrap().is_empty());

        drain(panel.supervisor());
    }

    #[test]
    fn test_restart_all_skips_missing_programs() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let kept = script(dir.path(), "kept.py", "sleep 30");
        let removed = script(dir.path(), "removed.py", "sleep 30");

        let before = panel.deploy(&kept).unwrap();
        panel.deploy(&removed).unwrap();
        fs::remove_file(&removed).unwrap();

        let report = panel.restart_all().unwrap();

        assert_eq!(report.skipped, vec!["removed.py".to_string()]);
        assert!(report.failed.is_empty());
        let (name, pid) = &report.restarted[0];
        assert_eq!(name, "kept.py");
        assert_ne!(*pid, before.pid);
        assert_eq!(panel.count(), 2);

        teardown(&panel);
    }

    #[test]
    fn test_tail_log_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let program = script(dir.path(), "job_a", "i=1; while [ $i -le 200 ]; do echo \"line $i\"; i=$((i+1)); done");

        panel.deploy(&program).unwrap();
        drain(panel.supervisor());

        let lines = panel.tail_log("job_a", 5).unwrap();
        assert_eq!(lines, vec!["line 196", "line 197", "line 198", "line 199", "line 200"]);
        assert!(panel.tail_stream("job_a", LogStream::Stderr, 5).unwrap().is_empty());
        assert!(matches!(panel.tail_log("other", 5), Err(PanelError::NotFound(_))));
    }

    #[test]
    fn test_tail_log_without_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::empty(dir.path().join("bots_data.json"));
        registry.upsert(
            "old.py",
            ProgramRecord {
                stdout_log_path: dir.path().join("missing.log"),
                ..Default::default()
            },
        );
        registry.upsert("bare.py", ProgramRecord::default());
        let panel = Panel::new(registry, shell_supervisor(&dir.path().join("logs")));

        assert!(matches!(panel.tail_log("old.py", 50), Err(PanelError::NoLog(_))));
        assert!(matches!(panel.tail_log("bare.py", 50), Err(PanelError::NoLog(_))));
    }

    #[tokio::test]
    async fn test_deploy_continues_after_failed_install() {
        let dir = tempfile::tempdir().unwrap();
        let panel = panel(dir.path());
        let program = script(dir.path(), "bot.py", "sleep 30");
        let deps = dir.path().join("requirements.txt");
        fs::write(&deps, "nonexistent-package\n").unwrap();

        let installer = Installer::new(vec!["/bin/sh".into(), "-c".into(), "echo no such package >&2; exit 1".into()]);
        let report = panel.deploy_with(&installer, &program, Some(&deps)).await;

        assert!(matches!(report.install, Some(Ok(InstallOutcome::Failed { code: Some(1), .. }))));
        assert!(report.deploy.is_ok());

        let skipped = panel.deploy_with(&installer, &program, None).await;
        assert!(skipped.install.is_none());
        assert_eq!(skipped.deploy.unwrap().replaced, report.deploy.ok().map(|d| d.pid));

        teardown(&panel);
    }
}

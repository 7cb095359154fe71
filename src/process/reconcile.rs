//! Boot-time recovery of the registry against what is on disk
//!
//! Every record whose program file still exists is relaunched and gets its
//! process id and log paths replaced. Records whose file is gone are dropped.
//! A record whose launch fails is kept untouched, stale pid included, so the
//! operator can see it and restart it by hand. The registry is saved once,
//! after the whole pass.

use super::{dump::Registry, dump::RegistryError, LaunchError, Supervisor};
use crate::{file::Exists, log};

#[derive(Debug)]
pub enum Outcome {
    Relaunched { previous: Option<u32>, pid: u32 },
    /// The program file no longer exists; the record was removed
    Dropped,
    /// Launch failed; the record was left as it was
    Failed(LaunchError),
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<(String, Outcome)>,
}

impl ReconcileReport {
    pub fn relaunched(&self) -> impl Iterator<Item = (&str, u32)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            Outcome::Relaunched { pid, .. } => Some((name.as_str(), *pid)),
            _ => None,
        })
    }

    pub fn dropped(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Dropped))
            .map(|(name, _)| name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &LaunchError)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            Outcome::Failed(err) => Some((name.as_str(), err)),
            _ => None,
        })
    }
}

/// Relaunch or drop every record in `registry`. Does not persist.
pub fn reconcile(registry: &mut Registry, supervisor: &Supervisor) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for name in registry.names() {
        let Some(record) = registry.get(&name).cloned() else { continue };

        if !Exists::check(&record.path).file() {
            registry.remove(&name);
            log!("[reconcile] program missing, record dropped", "name" => name, "path" => record.path.display());
            report.outcomes.push((name, Outcome::Dropped));
            continue;
        }

        match supervisor.launch(&record.path, &name) {
            Ok(launched) => {
                if let Some(entry) = registry.get_mut(&name) {
                    entry.process_id = Some(launched.pid);
                    entry.stdout_log_path = launched.stdout;
                    entry.stderr_log_path = launched.stderr;
                }
                log!("[reconcile] relaunched", "name" => name, "pid" => launched.pid);
                report.outcomes.push((name, Outcome::Relaunched { previous: record.process_id, pid: launched.pid }));
            }
            Err(err) => {
                log!("[reconcile] relaunch failed, record kept", "name" => name, "error" => err);
                report.outcomes.push((name, Outcome::Failed(err)));
            }
        }
    }

    report
}

/// Full boot pass: reconcile, then persist the result once.
pub fn run(registry: &mut Registry, supervisor: &Supervisor) -> Result<ReconcileReport, RegistryError> {
    if registry.is_empty() {
        log!("[reconcile] no saved programs to restart");
        return Ok(ReconcileReport::default());
    }

    let report = reconcile(registry, supervisor);
    registry.save()?;

    log!(
        "[reconcile] finished",
        "relaunched" => report.relaunched().count(),
        "dropped" => report.dropped().count(),
        "failed" => report.failed().count(),
    );

    Ok(report)
}

use crate::{helpers, log};

use std::{io, path::Path, process::Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Characters of installer stderr handed back to the operator on failure
pub const STDERR_TAIL: usize = 1500;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no installer command configured")]
    EmptyCommand,
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Failed { code: Option<i32>, stderr_tail: String },
}

/// Runs the dependency installer against an uploaded dependency list
#[derive(Clone, Debug)]
pub struct Installer {
    command: Vec<String>,
}

impl Installer {
    /// `command` is the installer prefix; the dependency file path is appended to it
    pub fn new(command: Vec<String>) -> Self { Self { command } }

    pub async fn install(&self, dependencies: &Path) -> Result<InstallOutcome, InstallError> {
        let (program, args) = self.command.split_first().ok_or(InstallError::EmptyCommand)?;

        let output = Command::new(program)
            .args(args)
            .arg(dependencies)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| InstallError::Spawn { program: program.clone(), source })?;

        if output.status.success() {
            log!("[install] dependencies installed", "file" => dependencies.display());
            return Ok(InstallOutcome::Installed);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        log!("[install] installer failed", "file" => dependencies.display(), "status" => output.status);

        Ok(InstallOutcome::Failed {
            code: output.status.code(),
            stderr_tail: helpers::tail_chars(&stderr, STDERR_TAIL).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> Installer { Installer::new(vec!["/bin/sh".into(), "-c".into(), script.into(), "installer".into()]) }

    #[tokio::test]
    async fn test_success_receives_dependency_path() {
        let dir = tempfile::tempdir().unwrap();
        let deps = dir.path().join("requirements.txt");
        std::fs::write(&deps, "requests\n").unwrap();
        let marker = dir.path().join("seen");

        let installer = shell(&format!("cp \"$1\" '{}'", marker.display()));
        assert_eq!(installer.install(&deps).await.unwrap(), InstallOutcome::Installed);
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "requests\n");
    }

    #[tokio::test]
    async fn test_failure_keeps_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let deps = dir.path().join("requirements.txt");
        std::fs::write(&deps, "").unwrap();

        let installer = shell("i=0; while [ $i -lt 400 ]; do printf 'abcdefghij' >&2; i=$((i+1)); done; echo END >&2; exit 3");
        match installer.install(&deps).await.unwrap() {
            InstallOutcome::Failed { code, stderr_tail } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr_tail.chars().count(), STDERR_TAIL);
                assert!(stderr_tail.ends_with("END\n"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_installer() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(vec!["/nonexistent/pip".into()]);
        assert!(matches!(installer.install(dir.path()).await, Err(InstallError::Spawn { .. })));
        assert!(matches!(Installer::new(vec![]).install(dir.path()).await, Err(InstallError::EmptyCommand)));
    }
}

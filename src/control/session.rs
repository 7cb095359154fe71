use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Where an operator is in the two-step upload handshake
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Idle,
    AwaitingProgram,
    AwaitingDependencies { program_path: PathBuf },
}

/// What the control surface should do with an incoming document
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upload {
    /// No deploy in progress
    NotStarted,
    /// Store the document as the program, then ask for dependencies
    Program,
    /// Wrong file type for the current step; the session is unchanged
    Rejected,
    /// Store the document as the dependency list and deploy `program_path`
    Dependencies { program_path: PathBuf },
}

impl Session {
    /// Classify an uploaded `file_name` against this state
    pub fn upload(&self, file_name: &str, program_extension: &str) -> Upload {
        match self {
            Session::Idle => Upload::NotStarted,
            Session::AwaitingProgram if is_program(file_name, program_extension) => Upload::Program,
            Session::AwaitingDependencies { program_path } if is_dependency_list(file_name) => Upload::Dependencies { program_path: program_path.clone() },
            _ => Upload::Rejected,
        }
    }

    /// Program path to deploy without dependencies, if `text` is a skip
    /// while awaiting the dependency list
    pub fn skip(&self, text: &str) -> Option<&Path> {
        match self {
            Session::AwaitingDependencies { program_path } if text.trim().eq_ignore_ascii_case("none") => Some(program_path),
            _ => None,
        }
    }
}

fn is_program(file_name: &str, extension: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.to_string_lossy() == extension.trim_start_matches('.'))
}

/// Any `.txt` file is taken as a dependency list
fn is_dependency_list(file_name: &str) -> bool { file_name.to_ascii_lowercase().ends_with(".txt") }

/// Per-operator upload sessions
#[derive(Debug, Default)]
pub struct Sessions {
    states: Mutex<HashMap<i64, Session>>,
}

impl Sessions {
    pub fn get(&self, user: i64) -> Session { self.states.lock().unwrap_or_else(PoisonError::into_inner).get(&user).cloned().unwrap_or_default() }

    /// Start (or restart) a deploy handshake
    pub fn begin(&self, user: i64) { self.set(user, Session::AwaitingProgram) }

    pub fn program_received(&self, user: i64, program_path: PathBuf) { self.set(user, Session::AwaitingDependencies { program_path }) }

    pub fn finish(&self, user: i64) { self.states.lock().unwrap_or_else(PoisonError::into_inner).remove(&user); }

    fn set(&self, user: i64, session: Session) { self.states.lock().unwrap_or_else(PoisonError::into_inner).insert(user, session); }
}

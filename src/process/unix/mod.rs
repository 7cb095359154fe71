use nix::{
    errno::Errno,
    sys::signal::{kill, killpg, Signal},
    unistd::{getpgid, getpgrp, Pid},
};
use std::io;

/// Convert a tracked process id into a nix pid, rejecting values that would
/// address more than one process (0 and anything past `i32::MAX`).
pub fn to_pid(pid: u32) -> Option<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}

/// Process group the given process currently belongs to
pub fn process_group_of(pid: Pid) -> Result<Pid, Errno> { getpgid(Some(pid)) }

/// Send `signal` to the whole process group rooted at `pid`.
///
/// The supervisor's own group is never signalled; a process still sharing it
/// was not launched in its own session, so the caller falls back to the
/// single-process path.
pub fn signal_group(pid: Pid, signal: Signal) -> Result<Pid, Errno> {
    let pgid = process_group_of(pid)?;
    if pgid == getpgrp() {
        return Err(Errno::EPERM);
    }

    killpg(pgid, signal)?;
    Ok(pgid)
}

pub fn signal_process(pid: Pid, signal: Signal) -> Result<(), Errno> { kill(pid, signal) }

/// Detach the calling (forked, not yet exec'd) child into a new session.
/// The child becomes leader of a fresh process group whose id equals its pid.
pub fn detach_session() -> io::Result<()> {
    // SAFETY: setsid is async-signal-safe and touches no memory
    match unsafe { libc::setsid() } {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

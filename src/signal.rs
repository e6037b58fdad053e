//! Termination-signal delivery.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Delivers a termination request to a process, reporting the OS reason on
/// failure.
pub trait Signaller {
    fn terminate(&self, pid: i32) -> Result<(), String>;
}

/// Sends SIGTERM, giving the process a chance to shut down cleanly.
pub struct Sigterm;

impl Signaller for Sigterm {
    fn terminate(&self, pid: i32) -> Result<(), String> {
        // kill(2) treats 0 and negatives as process-group targets; a malformed
        // prompt entry parses to 0 and must not signal our own group.
        if pid <= 0 {
            return Err("no such process".to_string());
        }
        signal::kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| e.desc().to_string())
    }
}

//! Process-group lifetime for phase commands.
//!
//! Every phase command is spawned as the leader of its own process group.
//! `ProcessGroupGuard` kills that whole group when dropped unless the leader
//! was reaped normally, so a timeout, an error path or an interrupt never
//! leaves children of the phase running.

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<Pid>,
}

impl ProcessGroupGuard {
    /// Guard the group led by `pid`.
    pub fn new(pid: u32) -> Self {
        let pgid = i32::try_from(pid).ok().map(Pid::from_raw);
        Self { pgid }
    }

    /// Send SIGKILL to every process in the group. Idempotent.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) => tracing::debug!(pgid = pgid.as_raw(), "Killed process group"),
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    tracing::warn!(pgid = pgid.as_raw(), error = %e, "Failed to kill process group")
                }
            }
        }
    }

    /// The leader exited normally; leave the group alone.
    pub fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

use crate::error::{Result, ShellError};
use crate::jobs::{Job, JobState, JobTable};
use crate::signals::Relay;
use log::debug;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// A child's status as seen by a non-blocking check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Alive,
    Stopped,
    Finished(WaitStatus),
    /// Already reaped elsewhere with no status left to report.
    Gone,
}

impl From<WaitStatus> for ChildStatus {
    fn from(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(..) | WaitStatus::Signaled(..) => ChildStatus::Finished(status),
            WaitStatus::Stopped(..) => ChildStatus::Stopped,
            _ => ChildStatus::Alive,
        }
    }
}

/// How a blocking wait on a job leader ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Stopped,
    Finished(Option<WaitStatus>),
}

/// The one place child statuses are collected.
///
/// With the signal relay installed, the child-status handler drains every
/// child into the relay's board and the reaper reads from there; its own
/// `waitpid` calls are non-blocking and treat "no such child" as a status
/// the handler already posted. Without the relay the reaper waits directly,
/// and only ever on pids it tracks.
pub struct Reaper {
    relay: Option<&'static Relay>,
}

impl Reaper {
    pub fn direct() -> Self {
        Reaper { relay: None }
    }

    pub fn relayed(relay: &'static Relay) -> Self {
        Reaper { relay: Some(relay) }
    }

    pub fn relay(&self) -> Option<&'static Relay> {
        self.relay
    }

    fn posted(&self, pid: Pid) -> Option<WaitStatus> {
        self.relay.and_then(|relay| relay.board().take(pid))
    }

    /// Checks `pid` without blocking.
    pub fn poll(&self, pid: Pid) -> Result<ChildStatus> {
        if let Some(status) = self.posted(pid) {
            return Ok(status.into());
        }
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
                Ok(status) => return Ok(status.into()),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    return Ok(self.posted(pid).map_or(ChildStatus::Gone, ChildStatus::from));
                }
                Err(errno) => return Err(ShellError::Wait(errno)),
            }
        }
    }

    /// Blocks until `pid` exits, is killed, or is stopped.
    pub fn wait(&self, pid: Pid) -> Result<Settled> {
        match self.relay {
            Some(relay) => loop {
                match self.poll(pid)? {
                    ChildStatus::Alive => relay.park()?,
                    ChildStatus::Stopped => return Ok(Settled::Stopped),
                    ChildStatus::Finished(status) => return Ok(Settled::Finished(Some(status))),
                    ChildStatus::Gone => return Ok(Settled::Finished(None)),
                }
            },
            None => loop {
                match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                    Ok(status) => match ChildStatus::from(status) {
                        ChildStatus::Stopped => return Ok(Settled::Stopped),
                        ChildStatus::Finished(status) => {
                            return Ok(Settled::Finished(Some(status)))
                        }
                        _ => continue,
                    },
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) => return Ok(Settled::Finished(None)),
                    Err(errno) => return Err(ShellError::Wait(errno)),
                }
            },
        }
    }

    /// Brings the table up to date with everything that happened to tracked
    /// jobs and returns the records of the jobs that finished.
    pub fn collect(&self, table: &mut JobTable) -> Result<Vec<Job>> {
        let mut finished = Vec::new();

        if let Some(relay) = self.relay {
            for (pid, status) in relay.board().drain() {
                match table.find_by_pid(pid).map(|job| job.jid) {
                    Some(jid) => apply(table, jid, status.into(), &mut finished),
                    None => debug!("discarding status of untracked child {}", pid),
                }
            }
        }

        let tracked: Vec<(usize, Pid)> = table.iter().map(|job| (job.jid, job.pid)).collect();
        for (jid, pid) in tracked {
            let status = self.poll(pid)?;
            apply(table, jid, status, &mut finished);
        }
        Ok(finished)
    }
}

fn apply(table: &mut JobTable, jid: usize, status: ChildStatus, finished: &mut Vec<Job>) {
    let record = match status {
        ChildStatus::Alive => return,
        ChildStatus::Stopped => {
            table.set_state(jid, JobState::Stopped);
            return;
        }
        ChildStatus::Finished(status) => table.complete(jid, Some(status)),
        ChildStatus::Gone => table.complete(jid, None),
    };
    finished.extend(record);
}

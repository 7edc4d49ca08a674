//! Foreground controller.
//!
//! One foreground run: designate the job, give its process group the
//! terminal, optionally resume it, block until it exits or stops, then take
//! the terminal back. A stopped job stays in the table; a finished one is
//! evicted on the spot.

use crate::error::{Result, ShellError};
use crate::jobs::{Job, JobState, JobTable};
use crate::reap::{Reaper, Settled};
use crate::terminal::Terminal;
use log::debug;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;

/// How a foreground run ended.
#[derive(Debug)]
pub enum Outcome {
    Stopped { jid: usize },
    /// The evicted record, with its final status if one was observed.
    Finished(Job),
}

impl Outcome {
    pub fn success(&self) -> bool {
        matches!(
            self,
            Outcome::Finished(Job {
                status: Some(WaitStatus::Exited(_, 0)),
                ..
            })
        )
    }
}

pub struct Controller {
    terminal: Terminal,
    reaper: Reaper,
}

impl Controller {
    pub fn new(terminal: Terminal, reaper: Reaper) -> Self {
        Controller { terminal, reaper }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    fn publish(&self, job: Option<&Job>) {
        if let Some(relay) = self.reaper.relay() {
            relay.publish_foreground(job.map(|job| job.pgid));
        }
    }

    /// Runs job `jid` in the foreground until it finishes or stops. With
    /// `resume`, a stopped job is sent a continue signal first.
    pub fn run(&self, table: &mut JobTable, jid: usize, resume: bool) -> Result<Outcome> {
        let job = table.find_by_id(jid).ok_or(ShellError::NoSuchJob)?;
        let (pid, pgid, stopped) = (job.pid, job.pgid, job.state == JobState::Stopped);

        table.set_foreground(jid);
        self.publish(table.foreground());
        self.terminal.hand_to(pgid);
        debug!("job [{}] in foreground (pgid {})", jid, pgid);

        let settled = if resume && stopped {
            killpg(pgid, Signal::SIGCONT).map_err(ShellError::Signal)
        } else {
            Ok(())
        }
        .and_then(|()| {
            table.set_state(jid, JobState::Running);
            self.reaper.wait(pid)
        });

        self.terminal.reclaim();
        self.publish(None);
        table.clear_foreground();

        match settled? {
            Settled::Stopped => {
                table.set_state(jid, JobState::Stopped);
                if let Some(job) = table.find_by_id(jid) {
                    println!("[{}] Stopped {}", job.jid, job.cmdline);
                }
                Ok(Outcome::Stopped { jid })
            }
            Settled::Finished(status) => table
                .complete(jid, status)
                .map(Outcome::Finished)
                .ok_or(ShellError::NoSuchJob),
        }
    }
}

use crate::builtins::Intrinsic;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::exec::{self, Pipeline, Placement};
use crate::foreground::Controller;
use crate::history::History;
use crate::input::{Input, Reader};
use crate::jobs::JobTable;
use crate::parser::{self, Segment};
use crate::reap::Reaper;
use crate::signals;
use crate::terminal::Terminal;
use crate::utils::{self, Navigator};
use log::{debug, warn};
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;
use std::env;

/// The command dispatcher and everything it works on.
pub struct Shell {
    config: Config,
    pub(crate) jobs: JobTable,
    pub(crate) control: Controller,
    pub(crate) history: Option<History>,
    pub(crate) dirs: Navigator,
}

impl Shell {
    /// A shell that owns no terminal and installs no signal handlers. Child
    /// statuses are collected with direct waits on tracked pids only.
    pub fn new(config: Config) -> Result<Shell> {
        let control = Controller::new(Terminal::detached(), Reaper::direct());
        Self::build(config, control, JobTable::new())
    }

    /// Takes the controlling terminal when there is one and installs the
    /// signal relay. Used by the `jsh` binary.
    pub fn attach(config: Config) -> Result<Shell> {
        let terminal = Terminal::acquire()?;
        let relay = signals::install(terminal.is_interactive())?;
        let control = Controller::new(terminal, Reaper::relayed(relay));
        Self::build(config, control, JobTable::mirrored(relay.groups()))
    }

    fn build(config: Config, control: Controller, jobs: JobTable) -> Result<Shell> {
        let home = env::current_dir()?;
        let history = config.history.clone().map(History::new);
        Ok(Shell {
            config,
            jobs,
            control,
            history,
            dirs: Navigator::new(home),
        })
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn is_interactive(&self) -> bool {
        self.control.terminal().is_interactive()
    }

    /// Reads and runs lines until end of input, then shuts down.
    pub fn run(&mut self) -> Result<()> {
        let mut reader = Reader::new(self.is_interactive())?;
        let relay = self.control.reaper().relay();
        loop {
            if let Err(e) = self.refresh() {
                warn!("cannot collect job statuses: {}", e);
            }
            let prompt = if self.is_interactive() && self.config.prompt {
                utils::prompt(self.dirs.home())
            } else {
                String::new()
            };
            match reader.read(&prompt, relay)? {
                Input::Line(line) => {
                    self.handle_input(&line);
                }
                Input::Interrupted => continue,
                Input::Eof => break,
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Checks, records and runs one raw input line.
    pub fn handle_input(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        if !parser::is_valid(line) {
            println!("Invalid Syntax!");
            return false;
        }
        if let Some(history) = &self.history {
            if let Err(e) = history.record(line) {
                warn!("cannot record `{}` in {}: {}", line, history.path().display(), e);
            }
        }
        self.execute_line(line)
    }

    /// Runs every segment of a validated line, left to right. A failing
    /// segment is reported and does not stop the ones after it. Returns
    /// whether all of them succeeded.
    pub fn execute_line(&mut self, line: &str) -> bool {
        let mut success = true;
        for segment in parser::split_segments(line) {
            match self.run_segment(&segment) {
                Ok(ok) => success &= ok,
                Err(e) => {
                    report(&e);
                    success = false;
                }
            }
        }
        success
    }

    fn run_segment(&mut self, segment: &Segment) -> Result<bool> {
        let words = parser::split_words(&segment.text);
        let Some(first) = words.first() else {
            return Ok(true);
        };
        if let Some(intrinsic) = Intrinsic::from_name(first) {
            return self.run_intrinsic(intrinsic, &words);
        }

        let placement = if segment.background {
            Placement::Background
        } else {
            Placement::Foreground
        };
        self.launch(&segment.text, placement)
    }

    fn launch(&mut self, text: &str, placement: Placement) -> Result<bool> {
        let pipeline = Pipeline::parse(text)?;
        let pid = exec::launch(&pipeline, placement)?;
        let jid = match self.jobs.add(pid, text) {
            Ok(jid) => jid,
            Err(e) => {
                // Nobody would ever collect it.
                let _ = killpg(pid, Signal::SIGKILL);
                let _ = self.control.reaper().wait(pid);
                return Err(e);
            }
        };

        match placement {
            Placement::Background => {
                println!("[{}] {}", jid, pid);
                Ok(true)
            }
            Placement::Foreground => {
                let outcome = self.control.run(&mut self.jobs, jid, false)?;
                Ok(outcome.success())
            }
        }
    }

    /// Collects finished background jobs and announces each one.
    pub fn refresh(&mut self) -> Result<()> {
        for job in self.control.reaper().collect(&mut self.jobs)? {
            let verdict = match job.status {
                Some(WaitStatus::Exited(_, 0)) => "normally",
                _ => "abnormally",
            };
            println!("{} with pid {} exited {}", job.name(), job.pid, verdict);
        }
        Ok(())
    }

    /// Kills every remaining job's process group and reaps its leader.
    pub fn shutdown(&mut self) {
        if self.is_interactive() {
            println!("logout");
        }
        for job in self.jobs.drain() {
            debug!("killing job [{}] (pgid {})", job.jid, job.pgid);
            let _ = killpg(job.pgid, Signal::SIGKILL);
            let _ = self.control.reaper().wait(job.pid);
        }
    }
}

/// Directory and log diagnostics go to standard output, everything else to
/// standard error.
fn report(e: &ShellError) {
    match e {
        ShellError::NoSuchDirectory | ShellError::InvalidLogCommand | ShellError::InvalidIndex => {
            println!("{}", e)
        }
        _ => eprintln!("{}", e),
    }
}

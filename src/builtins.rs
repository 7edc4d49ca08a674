//! Commands the shell runs in-process instead of launching a program.
//!
//! Intrinsics see every word of their segment as an argument; they take part
//! in neither pipelines nor redirection.

use crate::error::{Result, ShellError};
use crate::jobs::JobState;
use crate::shell::Shell;
use log::debug;
use nix::libc::{self, STDOUT_FILENO};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Hop,
    Reveal,
    Log,
    Activities,
    Ping,
    Fg,
    Bg,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        let intrinsic = match name {
            "hop" => Intrinsic::Hop,
            "reveal" => Intrinsic::Reveal,
            "log" => Intrinsic::Log,
            "activities" => Intrinsic::Activities,
            "ping" => Intrinsic::Ping,
            "fg" => Intrinsic::Fg,
            "bg" => Intrinsic::Bg,
            _ => return None,
        };
        Some(intrinsic)
    }
}

/// One row of the `activities` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub pid: Pid,
    pub name: String,
    pub state: JobState,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] : {} - {}", self.pid, self.name, self.state.as_str())
    }
}

/// Maps a `ping` signal number onto a real signal: the value is taken
/// modulo 32 and 0 stands for the default terminate signal.
pub fn signal_for(number: i32) -> Result<Signal> {
    match number.rem_euclid(32) {
        0 => Ok(Signal::SIGTERM),
        n => Signal::try_from(n).map_err(|_| ShellError::InvalidArguments),
    }
}

impl Shell {
    /// Runs `intrinsic` with the segment's words (`args[0]` is its name).
    /// Returns the command's success.
    pub(crate) fn run_intrinsic(&mut self, intrinsic: Intrinsic, args: &[String]) -> Result<bool> {
        debug!("intrinsic {:?} {:?}", intrinsic, &args[1..]);
        match intrinsic {
            Intrinsic::Hop => self.hop(args),
            Intrinsic::Reveal => self.reveal(args),
            Intrinsic::Log => self.log(args),
            Intrinsic::Activities => {
                for activity in self.activities()? {
                    println!("{}", activity);
                }
                Ok(true)
            }
            Intrinsic::Ping => ping(args),
            Intrinsic::Fg => self.fg(args),
            Intrinsic::Bg => self.bg(args),
        }
    }

    /// Live jobs sorted by command name, after evicting every job that has
    /// finished in the meantime.
    pub fn activities(&mut self) -> Result<Vec<Activity>> {
        self.refresh()?;
        let mut rows: Vec<Activity> = self
            .jobs
            .iter()
            .map(|job| Activity {
                pid: job.pid,
                name: job.name().to_string(),
                state: job.state,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// The job `fg`/`bg` act on: the id given, or the most recent job.
    fn target(&self, args: &[String]) -> Result<usize> {
        match args.get(1) {
            Some(arg) => arg.parse().map_err(|_| ShellError::InvalidJobId),
            None => self.jobs.most_recent().ok_or(ShellError::NoJobs),
        }
    }

    fn fg(&mut self, args: &[String]) -> Result<bool> {
        let jid = self.target(args)?;
        let job = self.jobs.find_by_id(jid).ok_or(ShellError::NoSuchJob)?;
        println!("{}", job.cmdline);
        self.control.run(&mut self.jobs, jid, true)?;
        Ok(true)
    }

    fn bg(&mut self, args: &[String]) -> Result<bool> {
        let jid = self.target(args)?;
        let job = self.jobs.find_by_id(jid).ok_or(ShellError::NoSuchJob)?;
        if job.state == JobState::Running {
            return Err(ShellError::AlreadyRunning);
        }
        killpg(job.pgid, Signal::SIGCONT).map_err(ShellError::Signal)?;
        let announcement = format!("[{}] {} &", job.jid, job.cmdline);
        self.jobs.set_state(jid, JobState::Running);
        println!("{}", announcement);
        Ok(true)
    }

    fn hop(&mut self, args: &[String]) -> Result<bool> {
        match &args[1..] {
            [] => self.dirs.hop("~")?,
            targets => {
                for target in targets {
                    self.dirs.hop(target)?;
                }
            }
        }
        Ok(true)
    }

    fn reveal(&mut self, args: &[String]) -> Result<bool> {
        let mut all = false;
        let mut one_per_line = false;
        let mut path = None;
        for arg in &args[1..] {
            match arg.strip_prefix('-') {
                Some(flags) if !flags.is_empty() => {
                    all |= flags.contains('a');
                    one_per_line |= flags.contains('l');
                }
                _ => {
                    path = Some(arg.as_str());
                    break;
                }
            }
        }

        let dir = self
            .dirs
            .resolve(path.unwrap_or("."))
            .ok_or(ShellError::NoSuchDirectory)?;
        let names = list_dir(&dir, all)?;
        if one_per_line {
            for name in &names {
                println!("{}", name);
            }
        } else {
            print!("{}", columns(&names, terminal_width()));
        }
        Ok(true)
    }

    fn log(&mut self, args: &[String]) -> Result<bool> {
        let history = self.history.clone();
        match &args[1..] {
            [] => {
                if let Some(history) = &history {
                    for entry in history.entries()? {
                        println!("{}", entry);
                    }
                }
                Ok(true)
            }
            [command] if command == "purge" => {
                if let Some(history) = &history {
                    history.purge()?;
                }
                Ok(true)
            }
            [command, index] if command == "execute" => {
                let line = history
                    .as_ref()
                    .ok_or(ShellError::InvalidIndex)?
                    .get(index)?;
                debug!("re-running `{}`", line);
                Ok(self.execute_line(&line))
            }
            _ => Err(ShellError::InvalidLogCommand),
        }
    }
}

fn ping(args: &[String]) -> Result<bool> {
    let [_, pid, number] = args else {
        return Err(ShellError::Usage("ping <pid> <signal_number>"));
    };
    let pid: i32 = pid.parse().map_err(|_| ShellError::InvalidArguments)?;
    let number: i32 = number.parse().map_err(|_| ShellError::InvalidArguments)?;
    // 0 and negative values would address process groups.
    if pid <= 0 {
        return Err(ShellError::InvalidArguments);
    }
    let signal = signal_for(number)?;
    let pid = Pid::from_raw(pid);

    kill(pid, None).map_err(|_| ShellError::NoSuchProcess)?;
    kill(pid, signal).map_err(ShellError::Signal)?;
    println!("Sent signal {} to process with pid {}", signal as i32, pid);
    Ok(true)
}

/// Entry names of `dir` in byte order, without `.` and `..`. Hidden entries
/// only with `all`.
fn list_dir(dir: &Path, all: bool) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|_| ShellError::NoSuchDirectory)?;
    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if all || !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Lays `names` out column by column in rows no wider than `width`.
fn columns(names: &[String], width: usize) -> String {
    let longest = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    let column = (longest + 1).max(10);
    let count = (width / column).max(1);
    let rows = (names.len() + count - 1) / count;

    let mut out = String::new();
    for row in 0..rows {
        for col in 0..count {
            if let Some(name) = names.get(col * rows + row) {
                out.push_str(&format!("{:<width$}", name, width = column));
            }
        }
        out.push('\n');
    }
    out
}

nix::ioctl_read_bad!(window_size, libc::TIOCGWINSZ, libc::winsize);

fn terminal_width() -> usize {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    match unsafe { window_size(STDOUT_FILENO, &mut size) } {
        Ok(_) if size.ws_col > 0 => usize::from(size.ws_col),
        _ => 80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_map_to_intrinsics() {
        assert_eq!(Intrinsic::from_name("hop"), Some(Intrinsic::Hop));
        assert_eq!(Intrinsic::from_name("activities"), Some(Intrinsic::Activities));
        assert_eq!(Intrinsic::from_name("bg"), Some(Intrinsic::Bg));
        assert_eq!(Intrinsic::from_name("ls"), None);
        assert_eq!(Intrinsic::from_name("jobs"), None);
    }

    #[test]
    fn signal_numbers_wrap_modulo_32() {
        assert_eq!(signal_for(0).unwrap(), Signal::SIGTERM);
        assert_eq!(signal_for(32).unwrap(), Signal::SIGTERM);
        assert_eq!(signal_for(9).unwrap(), Signal::SIGKILL);
        assert_eq!(signal_for(37).unwrap(), signal_for(5).unwrap());
        assert_eq!(signal_for(37).unwrap(), Signal::SIGTRAP);
    }

    #[test]
    fn activity_rows() {
        let row = Activity {
            pid: Pid::from_raw(4242),
            name: "sleep".into(),
            state: JobState::Stopped,
        };
        assert_eq!(row.to_string(), "[4242] : sleep - Stopped");
    }

    #[test]
    fn ping_argument_errors() {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(matches!(ping(&words(&["ping"])), Err(ShellError::Usage(_))));
        assert!(matches!(
            ping(&words(&["ping", "abc", "9"])),
            Err(ShellError::InvalidArguments)
        ));
        assert!(matches!(
            ping(&words(&["ping", "0", "9"])),
            Err(ShellError::InvalidArguments)
        ));
    }

    #[test]
    fn columns_fill_top_to_bottom() {
        let names: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        // Ten-character columns, two per row.
        let out = columns(&names, 25);
        assert_eq!(
            out,
            format!(
                "{:<10}{:<10}\n{:<10}{:<10}\n{:<10}\n",
                "a", "d", "b", "e", "c"
            )
        );
        assert_eq!(columns(&[], 80), "");
    }

    #[test]
    fn listing_skips_hidden_entries_unless_asked() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["beta", ".hidden", "Alpha", "alpha"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(list_dir(dir.path(), false).unwrap(), vec!["Alpha", "alpha", "beta"]);
        assert_eq!(
            list_dir(dir.path(), true).unwrap(),
            vec![".hidden", "Alpha", "alpha", "beta"]
        );
        assert!(matches!(
            list_dir(&dir.path().join("missing"), false),
            Err(ShellError::NoSuchDirectory)
        ));
    }
}

use nix::errno::Errno;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can make a shell operation fail.
///
/// Exec failures are absent on purpose: they happen inside a freshly
/// forked process and only ever reach the shell as a wait status.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Too many jobs: all {0} job slots are in use")]
    Capacity(usize),

    #[error("missing file operand after `{0}`")]
    MissingOperand(String),

    #[error("{}: {source}", .path.display())]
    Open { path: PathBuf, source: Errno },

    #[error("pipe failed: {0}")]
    Pipe(Errno),

    #[error("fork failed: {0}")]
    Spawn(Errno),

    #[error("No such job")]
    NoSuchJob,

    #[error("No jobs available")]
    NoJobs,

    #[error("No such process found")]
    NoSuchProcess,

    #[error("Invalid job ID")]
    InvalidJobId,

    #[error("Invalid arguments")]
    InvalidArguments,

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Job already running")]
    AlreadyRunning,

    #[error("No such directory!")]
    NoSuchDirectory,

    #[error("Invalid log command")]
    InvalidLogCommand,

    #[error("Invalid index")]
    InvalidIndex,

    #[error("argument contains an interior NUL byte")]
    Nul,

    #[error("wait failed: {0}")]
    Wait(Errno),

    #[error("failed to send signal: {0}")]
    Signal(Errno),

    #[error("terminal control failed: {0}")]
    Terminal(Errno),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Readline(#[from] rustyline::error::ReadlineError),
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_read_like_the_shell_output() {
        assert_eq!(ShellError::NoSuchJob.to_string(), "No such job");
        assert_eq!(
            ShellError::MissingOperand(">".into()).to_string(),
            "missing file operand after `>`"
        );
        let open = ShellError::Open {
            path: PathBuf::from("/nope/in.txt"),
            source: Errno::ENOENT,
        };
        assert!(open.to_string().starts_with("/nope/in.txt: "));
        assert_eq!(
            ShellError::Usage("ping <pid> <signal_number>").to_string(),
            "Usage: ping <pid> <signal_number>"
        );
    }
}

use crate::error::{Result, ShellError};
use crate::parser;
use crate::redirect::{self, Command};
use crate::signals;
use log::debug;
use nix::errno::Errno;
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, pipe, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::io::{self, Write};
use std::os::unix::io::RawFd;

/// Terminates the calling process immediately via `libc::_exit`.
fn _exit(code: i32) -> ! {
    unsafe { nix::libc::_exit(code) }
}

/// Where a top-level job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

/// One process of a pipeline with its arguments converted for `execvp`.
#[derive(Debug)]
pub struct Stage {
    pub command: Command,
    argv: Vec<CString>,
}

impl Stage {
    fn prepare(text: &str) -> Result<Stage> {
        let command = Command::resolve(&parser::split_words(text))?;
        let argv = command
            .argv
            .iter()
            .map(|word| CString::new(word.as_str()).map_err(|_| ShellError::Nul))
            .collect::<Result<Vec<_>>>()?;
        Ok(Stage { command, argv })
    }
}

/// A command segment split on `|`, resolved before anything is forked so
/// that resolution errors never leave a half-started job behind.
#[derive(Debug)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn parse(segment: &str) -> Result<Pipeline> {
        let stages = parser::split_stages(segment)
            .into_iter()
            .map(Stage::prepare)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }
}

/// What happened to one stage, as collected by the job leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub pid: Pid,
    pub status: Option<WaitStatus>,
}

impl StageOutcome {
    fn exit_code(&self) -> i32 {
        match self.status {
            Some(WaitStatus::Exited(_, code)) => code,
            Some(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
            _ => 1,
        }
    }
}

/// Every stage's outcome, in pipeline order. The job as a whole reports the
/// last stage's exit code; earlier stages are kept for inspection only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub stages: Vec<StageOutcome>,
}

impl PipelineOutcome {
    pub fn exit_code(&self) -> i32 {
        self.stages.last().map_or(0, StageOutcome::exit_code)
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Forks the leader of a top-level job and returns its pid.
///
/// The leader puts itself in a new process group before anything else, so
/// every stage it forks later inherits that group. The parent sets the same
/// group from its side as well; whichever runs first wins and the other call
/// is a no-op.
pub fn launch(pipeline: &Pipeline, placement: Placement) -> Result<Pid> {
    io::stdout().flush()?;
    match unsafe { fork() }.map_err(ShellError::Spawn)? {
        ForkResult::Child => lead(pipeline, placement),
        ForkResult::Parent { child } => {
            let _ = setpgid(child, child);
            debug!("launched leader {} ({:?})", child, placement);
            Ok(child)
        }
    }
}

fn lead(pipeline: &Pipeline, placement: Placement) -> ! {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    signals::restore_defaults();
    if placement == Placement::Background {
        if let Err(e) = redirect::detach_stdin() {
            eprintln!("{}", e);
            _exit(1);
        }
    }

    match pipeline.stages.as_slice() {
        [single] => exec_stage(single),
        stages => match run_stages(stages) {
            Ok(outcome) => _exit(outcome.exit_code()),
            Err(e) => {
                eprintln!("{}", e);
                _exit(1)
            }
        },
    }
}

/// Spawns every stage with its standard streams wired to the neighbouring
/// pipes, then waits for all of them.
///
/// Explicit redirections take precedence over the pipe on the same stream.
/// If a fork fails halfway, the stages already running are killed and
/// reaped before the error is returned.
pub fn run_stages(stages: &[Stage]) -> Result<PipelineOutcome> {
    let pipes = open_pipes(stages.len().saturating_sub(1))?;
    let mut pids = Vec::with_capacity(stages.len());

    for (i, stage) in stages.iter().enumerate() {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                wire(i, stage, &pipes);
                exec_stage(stage)
            }
            Ok(ForkResult::Parent { child }) => pids.push(child),
            Err(errno) => {
                close_pipes(&pipes);
                abandon(&pids);
                return Err(ShellError::Spawn(errno));
            }
        }
    }

    close_pipes(&pipes);
    let stages = pids
        .into_iter()
        .map(|pid| StageOutcome {
            pid,
            status: wait_stage(pid),
        })
        .collect();
    Ok(PipelineOutcome { stages })
}

fn open_pipes(count: usize) -> Result<Vec<(RawFd, RawFd)>> {
    let mut pipes = Vec::with_capacity(count);
    for _ in 0..count {
        match pipe() {
            Ok(ends) => pipes.push(ends),
            Err(errno) => {
                close_pipes(&pipes);
                return Err(ShellError::Pipe(errno));
            }
        }
    }
    Ok(pipes)
}

fn close_pipes(pipes: &[(RawFd, RawFd)]) {
    for &(read, write) in pipes {
        let _ = close(read);
        let _ = close(write);
    }
}

/// Runs in stage `i`'s child: connects stdin/stdout to the pipes unless the
/// stage redirects them itself, then closes every pipe descriptor.
fn wire(i: usize, stage: &Stage, pipes: &[(RawFd, RawFd)]) {
    let mut wired = Ok(());
    if i > 0 && !stage.command.has_input() {
        wired = wired.and(dup2(pipes[i - 1].0, STDIN_FILENO).map(drop));
    }
    if i < pipes.len() && !stage.command.has_output() {
        wired = wired.and(dup2(pipes[i].1, STDOUT_FILENO).map(drop));
    }
    close_pipes(pipes);
    if let Err(errno) = wired {
        eprintln!("dup2 failed: {}", errno);
        _exit(1);
    }
}

fn abandon(pids: &[Pid]) {
    for &pid in pids {
        let _ = kill(pid, Signal::SIGKILL);
        wait_stage(pid);
    }
}

fn wait_stage(pid: Pid) -> Option<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => return Some(status),
            Err(Errno::EINTR) => continue,
            Err(_) => return None,
        }
    }
}

/// Applies the stage's own redirections and replaces the process image.
/// Never returns; failures end the process with a non-zero status.
fn exec_stage(stage: &Stage) -> ! {
    if let Err(e) = stage.command.apply() {
        eprintln!("{}", e);
        _exit(1);
    }
    let Some(program) = stage.argv.first() else {
        _exit(0);
    };

    let errno = match execvp(program, &stage.argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    let name = &stage.command.argv[0];
    match errno {
        Errno::ENOENT => {
            eprintln!("{}: command not found", name);
            _exit(127)
        }
        Errno::EACCES => {
            eprintln!("{}: permission denied", name);
            _exit(126)
        }
        other => {
            eprintln!("{}: {}", name, other.desc());
            _exit(126)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_parse_resolves_every_stage() {
        let pipeline = Pipeline::parse("cat < in.txt | sort | uniq -c > out.txt").unwrap();
        let argvs: Vec<Vec<String>> = pipeline
            .stages
            .iter()
            .map(|s| s.command.argv.clone())
            .collect();
        assert_eq!(
            argvs,
            vec![
                vec!["cat".to_string()],
                vec!["sort".to_string()],
                vec!["uniq".to_string(), "-c".to_string()],
            ]
        );
        assert!(pipeline.stages[0].command.has_input());
        assert!(pipeline.stages[2].command.has_output());
    }

    #[test]
    fn resolution_errors_surface_before_fork() {
        let err = Pipeline::parse("ls | wc >").unwrap_err();
        assert!(matches!(err, ShellError::MissingOperand(_)));
    }

    #[test]
    fn outcome_follows_last_stage() {
        let pid = Pid::from_raw(1);
        let outcome = PipelineOutcome {
            stages: vec![
                StageOutcome {
                    pid,
                    status: Some(WaitStatus::Exited(pid, 3)),
                },
                StageOutcome {
                    pid,
                    status: Some(WaitStatus::Exited(pid, 0)),
                },
            ],
        };
        assert!(outcome.success());

        let killed = PipelineOutcome {
            stages: vec![StageOutcome {
                pid,
                status: Some(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
            }],
        };
        assert_eq!(killed.exit_code(), 128 + 15);
        assert!(!killed.success());
    }
}

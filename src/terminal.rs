use crate::error::{Result, ShellError};
use log::{debug, warn};
use nix::errno::Errno;
use nix::libc::STDIN_FILENO;
use nix::sys::signal::{self, killpg, SigHandler, Signal};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::unistd::{getpgrp, getpid, isatty, setpgid, tcgetpgrp, tcsetpgrp, Pid};
use std::os::unix::io::RawFd;

/// Ownership of the controlling terminal.
///
/// A detached terminal (standard input is not a tty, or the shell is used as
/// a library) turns every handoff into a no-op.
pub struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
    modes: Option<Termios>,
    interactive: bool,
}

impl Terminal {
    pub fn detached() -> Self {
        Terminal {
            fd: STDIN_FILENO,
            shell_pgid: getpgrp(),
            modes: None,
            interactive: false,
        }
    }

    /// Takes the controlling terminal if standard input is one.
    ///
    /// Waits until the shell is in the foreground, moves it into its own
    /// process group and makes that group the terminal's foreground group.
    pub fn acquire() -> Result<Self> {
        let fd = STDIN_FILENO;
        if !isatty(fd).unwrap_or(false) {
            return Ok(Self::detached());
        }

        loop {
            let pgrp = getpgrp();
            match tcgetpgrp(fd) {
                Ok(owner) if owner == pgrp => break,
                Ok(_) => {
                    let _ = killpg(pgrp, Signal::SIGTTIN);
                }
                Err(errno) => return Err(ShellError::Terminal(errno)),
            }
        }

        // Changing groups makes us a background group for a moment.
        unsafe { signal::signal(Signal::SIGTTOU, SigHandler::SigIgn) }
            .map_err(ShellError::Terminal)?;
        let pid = getpid();
        match setpgid(pid, pid) {
            // A session leader already leads its own group.
            Ok(()) | Err(Errno::EPERM) => {}
            Err(errno) => return Err(ShellError::Terminal(errno)),
        }
        let shell_pgid = getpgrp();
        tcsetpgrp(fd, shell_pgid).map_err(ShellError::Terminal)?;
        let modes = tcgetattr(fd).ok();
        debug!("acquired terminal for process group {}", shell_pgid);

        Ok(Terminal {
            fd,
            shell_pgid,
            modes,
            interactive: true,
        })
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Makes `pgid` the terminal's foreground process group.
    pub fn hand_to(&self, pgid: Pid) {
        if !self.interactive {
            return;
        }
        if let Err(errno) = tcsetpgrp(self.fd, pgid) {
            warn!("cannot hand terminal to process group {}: {}", pgid, errno);
        }
    }

    /// Takes the terminal back for the shell and restores the modes the
    /// shell started with, in case the job changed them.
    pub fn reclaim(&self) {
        if !self.interactive {
            return;
        }
        self.hand_to(self.shell_pgid);
        if let Some(modes) = &self.modes {
            if let Err(errno) = tcsetattr(self.fd, SetArg::TCSADRAIN, modes) {
                warn!("cannot restore terminal modes: {}", errno);
            }
        }
    }
}

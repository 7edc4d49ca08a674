//! Signal relay.
//!
//! Handlers registered here run in signal context. They only load and store
//! atomics in [`Relay`] and call async-signal-safe functions (`waitpid`,
//! `kill`, `getpid`, `_exit`, and the non-blocking socket send `signal-hook`
//! performs for the wake-up pipe). Everything else about a child's status is decided
//! on the main thread by [`crate::reap::Reaper`].

use crate::jobs::MAX_JOBS;
use nix::libc;
use nix::sys::signal::{self, killpg, SigHandler, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::{getpid, Pid};
use once_cell::sync::{Lazy, OnceCell};
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTERM, SIGTSTP};
use signal_hook::low_level;
use std::io::{self, Read};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

const BOARD_CELLS: usize = 128;

const FREE: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

struct Cell {
    state: AtomicU8,
    seq: AtomicU32,
    pid: AtomicI32,
    status: AtomicI32,
}

impl Cell {
    fn new() -> Self {
        Cell {
            state: AtomicU8::new(FREE),
            seq: AtomicU32::new(0),
            pid: AtomicI32::new(0),
            status: AtomicI32::new(0),
        }
    }
}

/// Lock-free mailbox of raw wait statuses posted by the child-status handler.
///
/// Cells go FREE -> WRITING -> READY in the handler and READY -> FREE on the
/// main thread, so neither side ever writes a cell the other one owns.
pub struct StatusBoard {
    cells: Box<[Cell]>,
    next_seq: AtomicU32,
}

impl StatusBoard {
    pub(crate) fn new(capacity: usize) -> Self {
        StatusBoard {
            cells: (0..capacity).map(|_| Cell::new()).collect(),
            next_seq: AtomicU32::new(0),
        }
    }

    /// Records one status. Returns false when every cell is occupied.
    pub(crate) fn post(&self, pid: libc::pid_t, status: libc::c_int) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        for cell in self.cells.iter() {
            if cell
                .state
                .compare_exchange(FREE, WRITING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                cell.seq.store(seq, Ordering::Relaxed);
                cell.pid.store(pid, Ordering::Relaxed);
                cell.status.store(status, Ordering::Relaxed);
                cell.state.store(READY, Ordering::Release);
                return true;
            }
        }
        false
    }

    fn release(&self, cell: &Cell) -> Option<(Pid, WaitStatus)> {
        let pid = Pid::from_raw(cell.pid.load(Ordering::Relaxed));
        let raw = cell.status.load(Ordering::Relaxed);
        cell.state.store(FREE, Ordering::Release);
        WaitStatus::from_raw(pid, raw).ok().map(|status| (pid, status))
    }

    /// Takes the oldest status recorded for `pid`.
    pub fn take(&self, pid: Pid) -> Option<WaitStatus> {
        let cell = self
            .cells
            .iter()
            .filter(|cell| {
                cell.state.load(Ordering::Acquire) == READY
                    && cell.pid.load(Ordering::Relaxed) == pid.as_raw()
            })
            .min_by_key(|cell| cell.seq.load(Ordering::Relaxed))?;
        self.release(cell).map(|(_, status)| status)
    }

    /// Takes every recorded status, oldest first.
    pub fn drain(&self) -> Vec<(Pid, WaitStatus)> {
        let mut ready: Vec<&Cell> = self
            .cells
            .iter()
            .filter(|cell| cell.state.load(Ordering::Acquire) == READY)
            .collect();
        ready.sort_by_key(|cell| cell.seq.load(Ordering::Relaxed));
        ready
            .into_iter()
            .filter_map(|cell| self.release(cell))
            .collect()
    }
}

/// Process groups of live jobs, indexed by job-table slot.
pub struct GroupMirror {
    groups: Box<[AtomicI32]>,
}

impl GroupMirror {
    pub(crate) fn new(slots: usize) -> Self {
        GroupMirror {
            groups: (0..slots).map(|_| AtomicI32::new(0)).collect(),
        }
    }

    pub fn publish(&self, slot: usize, pgid: Pid) {
        if let Some(group) = self.groups.get(slot) {
            group.store(pgid.as_raw(), Ordering::Release);
        }
    }

    pub fn retract(&self, slot: usize) {
        if let Some(group) = self.groups.get(slot) {
            group.store(0, Ordering::Release);
        }
    }

    pub fn live(&self) -> impl Iterator<Item = Pid> + '_ {
        self.groups
            .iter()
            .map(|group| group.load(Ordering::Acquire))
            .filter(|&pgid| pgid > 0)
            .map(Pid::from_raw)
    }
}

/// State shared between the shell and its signal handlers.
pub struct Relay {
    foreground: AtomicI32,
    interrupted: AtomicBool,
    installed: AtomicBool,
    owner: AtomicI32,
    board: StatusBoard,
    groups: GroupMirror,
    wake: OnceCell<UnixStream>,
}

static RELAY: Lazy<Relay> = Lazy::new(Relay::new);

/// The process-wide relay. Handlers are only attached by [`install`].
pub fn relay() -> &'static Relay {
    &RELAY
}

/// Installs the shell's handlers. Child-status, interrupt and termination
/// are always handled; the stop signal and terminal-background signals only
/// when the shell owns a controlling terminal.
pub fn install(interactive: bool) -> io::Result<&'static Relay> {
    let relay: &'static Relay = Lazy::force(&RELAY);
    if relay.installed.load(Ordering::Acquire) {
        return Ok(relay);
    }

    let (rx, tx) = UnixStream::pair()?;
    tx.set_nonblocking(true)?;
    if relay.wake.set(rx).is_err() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "signal relay wake-up pipe already initialised",
        ));
    }

    relay.owner.store(getpid().as_raw(), Ordering::Release);

    // Order matters: the board is filled before the waiter is woken.
    unsafe { low_level::register(SIGCHLD, move || relay.reap_children())? };
    low_level::pipe::register(SIGCHLD, tx)?;
    unsafe { low_level::register(SIGINT, move || relay.forward(Signal::SIGINT))? };
    unsafe { low_level::register(SIGTERM, move || relay.terminate())? };

    if interactive {
        unsafe { low_level::register(SIGTSTP, move || relay.forward(Signal::SIGTSTP))? };
        for sig in [Signal::SIGTTIN, Signal::SIGTTOU, Signal::SIGQUIT] {
            unsafe { signal::signal(sig, SigHandler::SigIgn) }.map_err(io::Error::from)?;
        }
    }

    relay.installed.store(true, Ordering::Release);
    log::debug!("signal relay installed (interactive: {})", interactive);
    Ok(relay)
}

/// Puts the dispositions the shell changed back to their defaults. Called in
/// freshly forked children before they run anything else.
pub fn restore_defaults() {
    for sig in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
        Signal::SIGTERM,
    ] {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
}

impl Relay {
    pub(crate) fn new() -> Self {
        Relay {
            foreground: AtomicI32::new(0),
            interrupted: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            owner: AtomicI32::new(0),
            board: StatusBoard::new(BOARD_CELLS),
            groups: GroupMirror::new(MAX_JOBS),
            wake: OnceCell::new(),
        }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn groups(&'static self) -> &'static GroupMirror {
        &self.groups
    }

    /// Tells the handlers which process group interactive signals go to.
    pub fn publish_foreground(&self, pgid: Option<Pid>) {
        let raw = pgid.map_or(0, Pid::as_raw);
        self.foreground.store(raw, Ordering::Release);
    }

    /// Returns whether an interactive signal arrived with no foreground job
    /// since the last call.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Blocks until the child-status handler has run at least once since the
    /// previous wake-up. Returns at once if the relay is not installed.
    pub fn park(&self) -> io::Result<()> {
        let Some(mut rx) = self.wake.get() else {
            return Ok(());
        };
        let mut buf = [0u8; 64];
        loop {
            match rx.read(&mut buf) {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    // Signal context from here on.

    fn reap_children(&self) {
        loop {
            let mut status: libc::c_int = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG | libc::WUNTRACED) };
            if pid <= 0 {
                break;
            }
            self.board.post(pid, status);
        }
    }

    pub(crate) fn forward(&self, sig: Signal) {
        let pgid = self.foreground.load(Ordering::Acquire);
        if pgid > 0 {
            let _ = killpg(Pid::from_raw(pgid), sig);
        } else {
            self.interrupted.store(true, Ordering::Release);
        }
    }

    /// Kills every mirrored job group and exits. A forked copy of the shell
    /// that has not reset its dispositions yet dies of the signal instead.
    fn terminate(&self) {
        if getpid().as_raw() != self.owner.load(Ordering::Acquire) {
            let _ = low_level::emulate_default_handler(SIGTERM);
            return;
        }
        for pgid in self.groups.live() {
            let _ = killpg(pgid, Signal::SIGKILL);
        }
        low_level::exit(0);
    }
}

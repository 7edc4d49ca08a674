use crate::error::{Result, ShellError};
use nix::fcntl::{self, OFlag};
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

/// Which standard stream a redirection replaces, and how the file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<file`
    Input,
    /// `>file`
    Truncate,
    /// `>>file`
    Append,
}

impl RedirectKind {
    fn operator(self) -> &'static str {
        match self {
            RedirectKind::Input => "<",
            RedirectKind::Truncate => ">",
            RedirectKind::Append => ">>",
        }
    }

    fn target_fd(self) -> RawFd {
        match self {
            RedirectKind::Input => STDIN_FILENO,
            RedirectKind::Truncate | RedirectKind::Append => STDOUT_FILENO,
        }
    }

    fn flags(self) -> OFlag {
        match self {
            RedirectKind::Input => OFlag::O_RDONLY,
            RedirectKind::Truncate => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            RedirectKind::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub path: PathBuf,
}

/// A command's argument vector with its redirections pulled out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    /// Words up to (not including) the first redirection token.
    pub argv: Vec<String>,
    /// Redirections in the order they appeared.
    pub redirects: Vec<Redirect>,
}

/// Recognises `<`, `>`, `>>` either standalone or glued to their target
/// (`>out.txt`). Returns the kind and the glued target, possibly empty.
fn classify(word: &str) -> Option<(RedirectKind, &str)> {
    if let Some(rest) = word.strip_prefix(">>") {
        Some((RedirectKind::Append, rest))
    } else if let Some(rest) = word.strip_prefix('>') {
        Some((RedirectKind::Truncate, rest))
    } else {
        word.strip_prefix('<').map(|rest| (RedirectKind::Input, rest))
    }
}

impl Command {
    /// Pulls the redirections out of `words`.
    ///
    /// The argument vector is cut at the first redirection token. Words that
    /// follow a redirection target and are not themselves redirections are
    /// dropped, so `sort < in.txt -r` runs plain `sort`.
    pub fn resolve(words: &[String]) -> Result<Command> {
        let mut argv_end = None;
        let mut redirects = Vec::new();
        let mut i = 0;
        while i < words.len() {
            if let Some((kind, glued)) = classify(&words[i]) {
                argv_end.get_or_insert(i);
                let path = if glued.is_empty() {
                    i += 1;
                    words
                        .get(i)
                        .ok_or_else(|| ShellError::MissingOperand(kind.operator().into()))?
                        .as_str()
                } else {
                    glued
                };
                redirects.push(Redirect {
                    kind,
                    path: PathBuf::from(path),
                });
            }
            i += 1;
        }

        let end = argv_end.unwrap_or(words.len());
        Ok(Command {
            argv: words[..end].to_vec(),
            redirects,
        })
    }

    pub fn has_input(&self) -> bool {
        self.redirects.iter().any(|r| r.kind == RedirectKind::Input)
    }

    pub fn has_output(&self) -> bool {
        self.redirects.iter().any(|r| r.kind != RedirectKind::Input)
    }

    /// Opens every target and duplicates it onto the matching standard
    /// stream of the calling process. Meant to run in a forked child.
    pub fn apply(&self) -> Result<()> {
        self.redirects.iter().try_for_each(attach)
    }
}

fn attach(redirect: &Redirect) -> Result<()> {
    open_onto(&redirect.path, redirect.kind.flags(), redirect.kind.target_fd())
}

/// Opens `path` and makes it descriptor `target`. The temporary descriptor
/// is closed on every path out.
fn open_onto(path: &Path, flags: OFlag, target: RawFd) -> Result<()> {
    let open_err = |source| ShellError::Open {
        path: path.to_path_buf(),
        source,
    };
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644)).map_err(open_err)?;
    if fd == target {
        return Ok(());
    }
    let duplicated = dup2(fd, target);
    let _ = close(fd);
    duplicated.map(drop).map_err(open_err)
}

/// Points standard input at `/dev/null`, for jobs that must never read the
/// terminal.
pub fn detach_stdin() -> Result<()> {
    open_onto(Path::new("/dev/null"), OFlag::O_RDONLY, STDIN_FILENO)
}

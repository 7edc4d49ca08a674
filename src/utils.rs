use crate::error::{Result, ShellError};
use nix::unistd::{gethostname, getuid, User};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

pub fn print_usage() -> ! {
    println!("Usage: jsh [-hvp]");
    println!("   -h   Print this help message");
    println!("   -v   Enable verbose mode");
    println!("   -p   Do not print a command prompt");
    process::exit(1);
}

/// Shows `cwd` relative to `home` as `~/...` when it lies inside it.
pub fn format_path(cwd: &Path, home: &Path) -> String {
    match cwd.strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => cwd.display().to_string(),
    }
}

/// The `<user@host:path> ` prompt.
pub fn prompt(home: &Path) -> String {
    let user = User::from_uid(getuid())
        .ok()
        .flatten()
        .map_or_else(|| "unknown".to_string(), |user| user.name);
    let host = gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cwd = env::current_dir()
        .map(|cwd| format_path(&cwd, home))
        .unwrap_or_default();
    format!("<{}@{}:{}> ", user, host, cwd)
}

/// Directory navigation relative to the shell's home and the previously
/// visited directory.
#[derive(Debug)]
pub struct Navigator {
    home: PathBuf,
    previous: Option<PathBuf>,
}

impl Navigator {
    pub fn new(home: PathBuf) -> Self {
        Navigator {
            home,
            previous: None,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Maps `~`, `~/...`, `.`, `..` and `-` to a directory. Anything else is
    /// taken as a path relative to the working directory. `None` only for `-`
    /// before any directory change, or when the working directory is gone.
    pub fn resolve(&self, arg: &str) -> Option<PathBuf> {
        match arg {
            "~" => Some(self.home.clone()),
            "-" => self.previous.clone(),
            "." => env::current_dir().ok(),
            ".." => env::current_dir()
                .ok()
                .map(|cwd| cwd.parent().map_or_else(|| cwd.clone(), Path::to_path_buf)),
            _ => match arg.strip_prefix("~/") {
                Some(rest) => Some(self.home.join(rest)),
                None => Some(PathBuf::from(arg)),
            },
        }
    }

    /// Changes the working directory to `arg`. A `-` with no previous
    /// directory is silently skipped.
    pub fn hop(&mut self, arg: &str) -> Result<()> {
        let current = env::current_dir()?;
        let target = match self.resolve(arg) {
            Some(target) => target,
            None if arg == "-" => return Ok(()),
            None => return Err(ShellError::NoSuchDirectory),
        };
        env::set_current_dir(&target).map_err(|_| ShellError::NoSuchDirectory)?;
        if arg != "-" {
            self.previous = Some(current);
        }
        Ok(())
    }
}

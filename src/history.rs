use crate::error::{Result, ShellError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Most entries kept in the log file.
pub const MAX_ENTRIES: usize = 15;

/// Returns whether `line` invokes the `log` intrinsic itself. Such lines are
/// never recorded.
pub fn is_log_command(line: &str) -> bool {
    line.split_whitespace().next() == Some("log")
}

/// The persisted command log, oldest entry first, one line per entry.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        History { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text
                .lines()
                .take(MAX_ENTRIES)
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &[String]) -> Result<()> {
        let mut file = fs::File::create(&self.path)?;
        for entry in entries {
            writeln!(file, "{}", entry)?;
        }
        Ok(())
    }

    /// Appends `line` unless it is a `log` command or repeats the newest
    /// entry. The oldest entry falls off once the log is full.
    pub fn record(&self, line: &str) -> Result<()> {
        if is_log_command(line) {
            return Ok(());
        }
        let mut entries = self.entries()?;
        if entries.last().map(String::as_str) == Some(line) {
            return Ok(());
        }
        if entries.len() == MAX_ENTRIES {
            entries.remove(0);
        }
        entries.push(line.to_string());
        self.store(&entries)
    }

    pub fn purge(&self) -> Result<()> {
        self.store(&[])
    }

    /// Entry `index` counted back from the newest, which is index 0.
    pub fn get(&self, index: &str) -> Result<String> {
        let index: usize = index.parse().map_err(|_| ShellError::InvalidIndex)?;
        let mut entries = self.entries()?;
        let position = entries
            .len()
            .checked_sub(index)
            .and_then(|n| n.checked_sub(1))
            .ok_or(ShellError::InvalidIndex)?;
        Ok(entries.swap_remove(position))
    }
}

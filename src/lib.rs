//! `jsh`, a small interactive shell with pipelines, redirection, process
//! groups and job control.

pub mod builtins;
pub mod config;
pub mod error;
pub mod exec;
pub mod foreground;
pub mod history;
pub mod input;
pub mod jobs;
pub mod parser;
pub mod reap;
pub mod redirect;
pub mod shell;
pub mod signals;
pub mod terminal;
pub mod utils;

pub use error::{Result, ShellError};
pub use shell::Shell;

use log::LevelFilter;
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable naming the `log` file.
pub const HISTORY_ENV: &str = "JSH_HISTORY";
/// Environment variable holding an `env_logger` filter.
pub const LOG_ENV: &str = "JSH_LOG";

const HISTORY_FILE: &str = ".jsh_history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Print a prompt before each line (still only on a terminal).
    pub prompt: bool,
    pub verbose: bool,
    /// Where `log` keeps its entries; `None` disables the log.
    pub history: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: true,
            verbose: false,
            history: None,
        }
    }
}

impl Config {
    /// Parses the command-line flags (without the program name). Returns
    /// `None` when usage should be printed instead.
    pub fn parse<I>(args: I, history_env: Option<OsString>) -> Option<Config>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config {
            history: history_path(history_env),
            ..Config::default()
        };
        for arg in args {
            let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty()) else {
                return None;
            };
            for flag in flags.chars() {
                match flag {
                    'v' => config.verbose = true,
                    'p' => config.prompt = false,
                    _ => return None,
                }
            }
        }
        Some(config)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }
}

fn history_path(env: Option<OsString>) -> Option<PathBuf> {
    match env {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => dirs_next::home_dir().map(|home| home.join(HISTORY_FILE)),
    }
}

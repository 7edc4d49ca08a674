use jsh::config::{Config, HISTORY_ENV, LOG_ENV};
use jsh::{utils, Shell};
use std::env;
use std::io::Write;
use std::process;

fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_env(LOG_ENV)
        .format(|buf, record| writeln!(buf, "jsh: {}", record.args()))
        .init();
}

fn main() {
    let config = Config::parse(env::args().skip(1), env::var_os(HISTORY_ENV))
        .unwrap_or_else(|| utils::print_usage());
    init_logging(&config);

    let mut shell = match Shell::attach(config) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("jsh: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = shell.run() {
        eprintln!("jsh: {}", e);
        shell.shutdown();
        process::exit(1);
    }
}

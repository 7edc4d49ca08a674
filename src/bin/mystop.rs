/*
 * mystop.rs - helper job for the shell's tests
 *
 * usage: mystop <secs>
 * Sleeps for <secs> seconds, then stops its own process group the way
 * Ctrl-Z would. Once continued it exits 0.
 */

use nix::sys::signal::{killpg, Signal};
use nix::unistd::getpgrp;
use std::env;
use std::process;
use std::thread;
use std::time::Duration;

fn main() {
    let args: Vec<String> = env::args().collect();
    let [_, secs] = args.as_slice() else {
        eprintln!("Usage: mystop <secs>");
        process::exit(2);
    };
    let Ok(secs) = secs.parse::<u64>() else {
        eprintln!("mystop: `{}` is not a number of seconds", secs);
        process::exit(2);
    };

    thread::sleep(Duration::from_secs(secs));
    if let Err(errno) = killpg(getpgrp(), Signal::SIGTSTP) {
        eprintln!("mystop: cannot stop process group: {}", errno);
        process::exit(1);
    }
}

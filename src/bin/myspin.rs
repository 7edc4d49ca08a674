/*
 * myspin.rs - helper job for the shell's tests
 *
 * usage: myspin <secs>
 * Sleeps for <secs> seconds in one-second steps, then exits 0.
 */

use std::env;
use std::process;
use std::thread;
use std::time::Duration;

fn seconds() -> u64 {
    let args: Vec<String> = env::args().collect();
    let [_, secs] = args.as_slice() else {
        eprintln!("Usage: myspin <secs>");
        process::exit(2);
    };
    secs.parse().unwrap_or_else(|_| {
        eprintln!("myspin: `{}` is not a number of seconds", secs);
        process::exit(2);
    })
}

fn main() {
    for _ in 0..seconds() {
        thread::sleep(Duration::from_secs(1));
    }
}

//! Status collection through the installed signal relay.
//!
//! Installing the handlers is process-wide: from here on the child-status
//! handler reaps every child of this test binary. Nothing in this file may
//! use `std::process::Command`, and the tests take turns because the board
//! is shared.

use jsh::exec::{self, Pipeline, Placement};
use jsh::foreground::{Controller, Outcome};
use jsh::jobs::{JobState, JobTable};
use jsh::reap::{Reaper, Settled};
use jsh::signals::{self, Relay};
use jsh::terminal::Terminal;
use nix::sys::signal::{self, kill, killpg, Signal};
use nix::sys::wait::WaitStatus;
use pretty_assertions::assert_eq;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

static TURN: Mutex<()> = Mutex::new(());

fn setup() -> (MutexGuard<'static, ()>, &'static Relay) {
    let guard = TURN.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let relay = signals::install(false).unwrap();
    (guard, relay)
}

fn controller(relay: &'static Relay) -> Controller {
    Controller::new(Terminal::detached(), Reaper::relayed(relay))
}

fn start(table: &mut JobTable, line: &str, placement: Placement) -> usize {
    let pipeline = Pipeline::parse(line).unwrap();
    let pid = exec::launch(&pipeline, placement).unwrap();
    table.add(pid, line).unwrap()
}

#[test]
fn foreground_status_comes_from_the_board() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let jid = start(&mut table, "true", Placement::Foreground);
    let pid = table.find_by_id(jid).unwrap().pid;
    match control.run(&mut table, jid, false).unwrap() {
        Outcome::Finished(job) => {
            assert!(job.completed);
            assert_eq!(job.status, Some(WaitStatus::Exited(pid, 0)));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(table.is_empty());

    let jid = start(&mut table, "false", Placement::Foreground);
    let outcome = control.run(&mut table, jid, false).unwrap();
    assert!(!outcome.success());
}

#[test]
fn pipelines_run_under_the_relay() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let jid = start(&mut table, "true | false | true", Placement::Foreground);
    assert!(control.run(&mut table, jid, false).unwrap().success());
}

#[test]
fn background_completion_is_collected() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let jid = start(&mut table, "true", Placement::Background);
    let pid = table.find_by_id(jid).unwrap().pid;

    let mut finished = Vec::new();
    for _ in 0..100 {
        finished.extend(control.reaper().collect(&mut table).unwrap());
        if table.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].pid, pid);
    assert_eq!(finished[0].status, Some(WaitStatus::Exited(pid, 0)));
    assert!(table.find_by_pid(pid).is_none());
}

#[test]
fn stop_and_resume_are_seen_through_the_board() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let line = format!("{} 1", env!("CARGO_BIN_EXE_mystop"));
    let jid = start(&mut table, &line, Placement::Foreground);
    assert!(matches!(
        control.run(&mut table, jid, false).unwrap(),
        Outcome::Stopped { jid: stopped } if stopped == jid
    ));
    assert_eq!(table.find_by_id(jid).unwrap().state, JobState::Stopped);
    assert!(table.foreground().is_none());

    let outcome = control.run(&mut table, jid, true).unwrap();
    assert!(outcome.success());
    assert!(table.is_empty());
}

#[test]
fn mirrored_groups_follow_the_table() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let jid = start(&mut table, "sleep 30", Placement::Background);
    let pgid = table.find_by_id(jid).unwrap().pgid;
    assert_eq!(relay.groups().live().collect::<Vec<_>>(), vec![pgid]);

    killpg(pgid, Signal::SIGKILL).unwrap();
    let pid = table.find_by_id(jid).unwrap().pid;
    control.reaper().wait(pid).unwrap();
    control.reaper().collect(&mut table).unwrap();
    assert!(table.is_empty());
    assert!(relay.groups().live().next().is_none());
}

#[test]
fn interrupt_goes_to_the_foreground_group() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let jid = start(&mut table, "sleep 30", Placement::Background);
    let job = table.find_by_id(jid).unwrap();
    let (pid, pgid) = (job.pid, job.pgid);

    relay.publish_foreground(Some(pgid));
    signal::raise(Signal::SIGINT).unwrap();
    let settled = control.reaper().wait(pid).unwrap();
    relay.publish_foreground(None);

    assert_eq!(
        settled,
        Settled::Finished(Some(WaitStatus::Signaled(pid, Signal::SIGINT, false)))
    );
    assert!(!relay.take_interrupt());
    table.complete(jid, None);
    assert!(table.is_empty());
}

#[test]
fn terminating_a_pipeline_leader_spares_other_jobs() {
    let (_turn, relay) = setup();
    let control = controller(relay);
    let mut table = JobTable::mirrored(relay.groups());

    let bystander = start(&mut table, "sleep 30", Placement::Background);
    let piped = start(&mut table, "sleep 30 | sleep 30", Placement::Background);
    let bystander = table.find_by_id(bystander).unwrap().clone();
    let piped = table.find_by_id(piped).unwrap().clone();

    kill(piped.pid, Signal::SIGTERM).unwrap();
    assert_eq!(
        control.reaper().wait(piped.pid).unwrap(),
        Settled::Finished(Some(WaitStatus::Signaled(
            piped.pid,
            Signal::SIGTERM,
            false
        )))
    );
    // The leader died of the signal; it did not kill the groups it inherited.
    assert!(kill(bystander.pid, None).is_ok());

    for job in [&bystander, &piped] {
        let _ = killpg(job.pgid, Signal::SIGKILL);
    }
    control.reaper().wait(bystander.pid).unwrap();
    table.complete(piped.jid, None);
    control.reaper().collect(&mut table).unwrap();
    assert!(table.is_empty());
}

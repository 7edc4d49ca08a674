use crate::error::{Result, ShellError};
use crate::signals::GroupMirror;
use log::debug;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Maximum number of jobs tracked at once.
pub const MAX_JOBS: usize = 100;

/// Represents the state of a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

/// One top-level command or pipeline launched from a single input segment.
#[derive(Debug, Clone)]
pub struct Job {
    pub jid: usize,
    /// Leader pid; for a pipeline, the process that forks the stages.
    pub pid: Pid,
    pub pgid: Pid,
    pub cmdline: String,
    pub state: JobState,
    pub completed: bool,
    pub status: Option<WaitStatus>,
}

impl Job {
    /// The command name, i.e. the first word of the command line.
    pub fn name(&self) -> &str {
        self.cmdline
            .split_whitespace()
            .next()
            .unwrap_or(&self.cmdline)
    }
}

/// Fixed-capacity registry of live jobs.
///
/// A slot is free when it holds `None`. Job ids come from a counter that
/// never resets, so an id is never handed out twice while its job is alive.
/// Completed jobs are handed back by [`JobTable::complete`] and never stay
/// resident.
pub struct JobTable {
    slots: [Option<Job>; MAX_JOBS],
    next_jid: usize,
    foreground: Option<usize>,
    mirror: Option<&'static GroupMirror>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    /// Creates a new, empty job table.
    pub fn new() -> Self {
        JobTable {
            slots: std::array::from_fn(|_| None),
            next_jid: 1,
            foreground: None,
            mirror: None,
        }
    }

    /// Creates a table that publishes the process group of every live job to
    /// `mirror`, so the termination handler can reach them without touching
    /// the table itself.
    pub fn mirrored(mirror: &'static GroupMirror) -> Self {
        JobTable {
            mirror: Some(mirror),
            ..Self::new()
        }
    }

    /// Registers a job whose leader is `pid`. Fails without side effects
    /// when every slot is taken.
    ///
    /// Nothing is printed here. The caller announces background jobs as
    /// `[id] pid` once this returns the id.
    pub fn add(&mut self, pid: Pid, cmdline: &str) -> Result<usize> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(ShellError::Capacity(MAX_JOBS));
        };

        let jid = self.next_jid;
        self.next_jid += 1;
        self.slots[index] = Some(Job {
            jid,
            pid,
            pgid: pid,
            cmdline: cmdline.to_string(),
            state: JobState::Running,
            completed: false,
            status: None,
        });
        if let Some(mirror) = self.mirror {
            mirror.publish(index, pid);
        }
        debug!("registered job [{}] pid {} `{}`", jid, pid, cmdline);
        Ok(jid)
    }

    fn index_of(&self, jid: usize) -> Option<usize> {
        if jid == 0 {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(job) if job.jid == jid))
    }

    pub fn find_by_id(&self, jid: usize) -> Option<&Job> {
        self.index_of(jid).and_then(|i| self.slots[i].as_ref())
    }

    pub fn find_by_id_mut(&mut self, jid: usize) -> Option<&mut Job> {
        self.index_of(jid).and_then(|i| self.slots[i].as_mut())
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.iter().find(|job| job.pid == pid && !job.completed)
    }

    /// Updates the state of a job; returns false if no such job exists.
    pub fn set_state(&mut self, jid: usize, state: JobState) -> bool {
        match self.find_by_id_mut(jid) {
            Some(job) => {
                job.state = state;
                true
            }
            None => false,
        }
    }

    pub fn foreground(&self) -> Option<&Job> {
        self.foreground.and_then(|i| self.slots[i].as_ref())
    }

    /// Designates `jid` as the foreground job, replacing any previous one.
    pub fn set_foreground(&mut self, jid: usize) -> bool {
        match self.index_of(jid) {
            Some(index) => {
                self.foreground = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn clear_foreground(&mut self) {
        self.foreground = None;
    }

    /// The live job with the numerically largest id.
    pub fn most_recent(&self) -> Option<usize> {
        self.iter().map(|job| job.jid).max()
    }

    /// Evicts a job that has been observed to finish and returns its final
    /// record. Clears the foreground designation if it pointed at this job.
    pub fn complete(&mut self, jid: usize, status: Option<WaitStatus>) -> Option<Job> {
        let index = self.index_of(jid)?;
        let mut job = self.slots[index].take()?;
        job.completed = true;
        job.status = status;
        if self.foreground == Some(index) {
            self.foreground = None;
        }
        if let Some(mirror) = self.mirror {
            mirror.retract(index);
        }
        debug!("evicted job [{}] pid {}", job.jid, job.pid);
        Some(job)
    }

    /// Evicts every job, e.g. on shell exit.
    pub fn drain(&mut self) -> Vec<Job> {
        let jids: Vec<usize> = self.iter().map(|job| job.jid).collect();
        jids.into_iter()
            .filter_map(|jid| self.complete(jid, None))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    #[test]
    fn ids_are_monotonic_and_pgid_matches_pid() {
        let mut table = JobTable::new();
        let a = table.add(pid(100), "sleep 5").unwrap();
        let b = table.add(pid(101), "cat | wc").unwrap();
        assert_eq!((a, b), (1, 2));

        table.complete(a, None);
        let c = table.add(pid(102), "echo hi").unwrap();
        assert_eq!(c, 3);

        let job = table.find_by_id(c).unwrap();
        assert_eq!(job.pgid, job.pid);
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn add_fails_at_capacity_and_leaves_table_unchanged() {
        let mut table = JobTable::new();
        for n in 0..MAX_JOBS {
            table.add(pid(1000 + n as i32), "sleep 100").unwrap();
        }
        let before: Vec<usize> = table.iter().map(|j| j.jid).collect();

        let err = table.add(pid(5000), "one too many").unwrap_err();
        assert!(matches!(err, ShellError::Capacity(MAX_JOBS)));
        assert_eq!(table.iter().map(|j| j.jid).collect::<Vec<_>>(), before);
        assert!(table.find_by_pid(pid(5000)).is_none());

        // Freeing one slot makes room again, with a fresh id.
        table.complete(50, None);
        let jid = table.add(pid(5000), "fits now").unwrap();
        assert_eq!(jid, MAX_JOBS + 1);
        assert_eq!(table.len(), MAX_JOBS);
    }

    #[test]
    fn completed_jobs_are_not_findable() {
        let mut table = JobTable::new();
        let jid = table.add(pid(42), "sleep 1").unwrap();
        table.set_foreground(jid);

        let done = table
            .complete(jid, Some(WaitStatus::Exited(pid(42), 0)))
            .unwrap();
        assert!(done.completed);
        assert_eq!(done.status, Some(WaitStatus::Exited(pid(42), 0)));

        assert!(table.find_by_id(jid).is_none());
        assert!(table.find_by_pid(pid(42)).is_none());
        assert_eq!(table.most_recent(), None);
        assert!(table.foreground().is_none());
        assert!(table.complete(jid, None).is_none());
    }

    #[test]
    fn most_recent_picks_largest_live_id() {
        let mut table = JobTable::new();
        let first = table.add(pid(1), "a").unwrap();
        let second = table.add(pid(2), "b").unwrap();
        assert_eq!(table.most_recent(), Some(second));
        table.complete(second, None);
        assert_eq!(table.most_recent(), Some(first));
    }

    #[test]
    fn foreground_designation_is_single() {
        let mut table = JobTable::new();
        let a = table.add(pid(10), "vim notes").unwrap();
        let b = table.add(pid(11), "top").unwrap();
        assert!(table.set_foreground(a));
        assert!(table.set_foreground(b));
        assert_eq!(table.foreground().map(|j| j.jid), Some(b));

        // Evicting a non-foreground job keeps the designation.
        table.complete(a, None);
        assert_eq!(table.foreground().map(|j| j.jid), Some(b));

        table.clear_foreground();
        assert!(table.foreground().is_none());
        assert!(!table.set_foreground(99));
    }

    #[test]
    fn set_state_and_name() {
        let mut table = JobTable::new();
        let jid = table.add(pid(7), "  sleep 30").unwrap();
        assert!(table.set_state(jid, JobState::Stopped));
        assert!(!table.set_state(jid + 1, JobState::Stopped));
        let job = table.find_by_id(jid).unwrap();
        assert_eq!(job.state.as_str(), "Stopped");
        assert_eq!(job.name(), "sleep");
    }

    #[test]
    fn drain_empties_table() {
        let mut table = JobTable::new();
        table.add(pid(1), "a").unwrap();
        table.add(pid(2), "b").unwrap();
        assert_eq!(table.drain().len(), 2);
        assert!(table.is_empty());
    }
}

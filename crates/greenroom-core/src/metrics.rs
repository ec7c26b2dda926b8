//! Process-wide counters for assessments and supervised processes.
//!
//! Incremented at the call site; [`Metrics::flush`] emits all values as one
//! `tracing::info!` event (the CLI does so after teardown).

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    assessments_started: AtomicU64,
    assessments_completed: AtomicU64,
    assessments_failed: AtomicU64,
    processes_spawned: AtomicU64,
    processes_stopped: AtomicU64,
    processes_killed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            assessments_started: AtomicU64::new(0),
            assessments_completed: AtomicU64::new(0),
            assessments_failed: AtomicU64::new(0),
            processes_spawned: AtomicU64::new(0),
            processes_stopped: AtomicU64::new(0),
            processes_killed: AtomicU64::new(0),
        }
    }

    pub fn inc_assessments_started(&self) {
        self.assessments_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_assessments_completed(&self) {
        self.assessments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_assessments_failed(&self) {
        self.assessments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_processes_spawned(&self) {
        self.processes_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// A supervised process was reaped; `forced` when it had to be killed.
    pub fn inc_processes_stopped(&self, forced: bool) {
        self.processes_stopped.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.processes_killed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            assessments_started = self.assessments_started(),
            assessments_completed = self.assessments_completed(),
            assessments_failed = self.assessments_failed(),
            processes_spawned = self.processes_spawned(),
            processes_stopped = self.processes_stopped(),
            processes_killed = self.processes_killed(),
        );
    }

    pub fn assessments_started(&self) -> u64 {
        self.assessments_started.load(Ordering::Relaxed)
    }

    pub fn assessments_completed(&self) -> u64 {
        self.assessments_completed.load(Ordering::Relaxed)
    }

    pub fn assessments_failed(&self) -> u64 {
        self.assessments_failed.load(Ordering::Relaxed)
    }

    pub fn processes_spawned(&self) -> u64 {
        self.processes_spawned.load(Ordering::Relaxed)
    }

    pub fn processes_stopped(&self) -> u64 {
        self.processes_stopped.load(Ordering::Relaxed)
    }

    pub fn processes_killed(&self) -> u64 {
        self.processes_killed.load(Ordering::Relaxed)
    }

    /// Spawned but not yet reaped.
    pub fn processes_live(&self) -> u64 {
        self.processes_spawned()
            .saturating_sub(self.processes_stopped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assessment_counters() {
        let m = Metrics::new();
        m.inc_assessments_started();
        m.inc_assessments_started();
        m.inc_assessments_completed();
        m.inc_assessments_failed();
        assert_eq!(m.assessments_started(), 2);
        assert_eq!(m.assessments_completed(), 1);
        assert_eq!(m.assessments_failed(), 1);
    }

    #[test]
    fn test_live_processes_track_spawn_and_stop() {
        let m = Metrics::new();
        m.inc_processes_spawned();
        m.inc_processes_spawned();
        m.inc_processes_stopped(false);
        assert_eq!(m.processes_live(), 1);
        m.inc_processes_stopped(true);
        assert_eq!(m.processes_live(), 0);
        assert_eq!(m.processes_killed(), 1);
    }
}

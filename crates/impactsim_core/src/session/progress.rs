use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Progress tracker for a running session.
///
/// Clones share the same counters, so a handle taken before `run` can be
/// polled from another thread while the session works.
#[derive(Debug, Clone)]
pub struct SessionProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl SessionProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
        }
    }

    /// Runs recorded so far
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Runs expected for the whole session
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Completed fraction in `[0, 1]`; zero when nothing is planned
    #[must_use]
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.completed() as f64 / total as f64).min(1.0),
        }
    }
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// What happened during a session, beyond the rows in the results file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Recorded runs per `sim_type` tag, in order of first occurrence
    pub runs: Vec<(String, usize)>,
    /// Substitutions applied that matched no exchange
    pub zero_match_substitutions: usize,
    /// Unit reconciliation problems reported while substituting
    pub reconciliation_issues: usize,
    /// Provider picks abandoned for an iteration (sheet left unassigned)
    pub skipped_picks: usize,
    /// Substitution rows not applied for an iteration
    pub skipped_substitutions: usize,
}

impl SessionSummary {
    pub(crate) fn record_run(&mut self, tag: &str) {
        match self.runs.iter_mut().find(|(t, _)| t == tag) {
            Some((_, count)) => *count += 1,
            None => self.runs.push((tag.to_string(), 1)),
        }
    }

    pub fn runs_for(&self, tag: &str) -> usize {
        self.runs
            .iter()
            .find(|(t, _)| t == tag)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_runs(&self) -> usize {
        self.runs.iter().map(|(_, n)| n).sum()
    }
}

/// Branch/user admission policy.
///
/// Decides which queued job, if any, may move to RUNNING next. The decision is
/// a pure function of a snapshot taken under the store lock; the store commits
/// the chosen job before the lock is released, so two decisions can never
/// jointly exceed a limit.
///
/// ## Eligibility
/// A branch head is eligible iff
/// - its branch has no RUNNING job,
/// - fewer than `max_running` jobs are RUNNING,
/// - its user already has a RUNNING job, or fewer than `max_active_users` users do.
///
/// ## Ordering
/// Among eligible heads the oldest `created_at` wins, ties broken by submission
/// sequence. Within a branch only the head is ever a candidate, which gives FIFO.

use crate::config::SchedulerConfig;
use crate::workflow::types::JobId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Caps enforced on every admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub max_running: usize,
    pub max_active_users: usize,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for AdmissionLimits {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_running: config.max_workers,
            max_active_users: config.max_active_users,
        }
    }
}

/// Head of one branch queue
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub job_id: &'a JobId,
    pub branch: &'a str,
    pub user_id: &'a str,
    pub created_at: DateTime<Utc>,
    pub seq: u64,
}

/// Derived running state the decision is made against
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSnapshot<'a> {
    /// RUNNING job count
    pub running: usize,
    /// branch -> its RUNNING job
    pub busy_branches: &'a HashMap<String, JobId>,
    /// user -> number of RUNNING jobs (only users with at least one)
    pub active_users: &'a HashMap<String, usize>,
}

pub fn is_eligible(
    candidate: &Candidate<'_>,
    snapshot: &AdmissionSnapshot<'_>,
    limits: &AdmissionLimits,
) -> bool {
    if snapshot.busy_branches.contains_key(candidate.branch) {
        return false;
    }
    if snapshot.running >= limits.max_running {
        return false;
    }
    snapshot.active_users.contains_key(candidate.user_id)
        || snapshot.active_users.len() < limits.max_active_users
}

/// Pick the oldest eligible candidate
pub fn select_candidate<'a, I>(
    candidates: I,
    snapshot: &AdmissionSnapshot<'_>,
    limits: &AdmissionLimits,
) -> Option<Candidate<'a>>
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    if snapshot.running >= limits.max_running {
        return None;
    }
    candidates
        .into_iter()
        .filter(|candidate| is_eligible(candidate, snapshot, limits))
        .min_by_key(|candidate| (candidate.created_at, candidate.seq))
}

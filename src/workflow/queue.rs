/// Per-branch FIFO queues of pending jobs
///
/// A branch's queue is created on first push and dropped as soon as it drains,
/// so iteration only ever visits branches with pending work.

use crate::workflow::types::JobId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct BranchQueues {
    queues: HashMap<String, VecDeque<JobId>>,
}

impl BranchQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail of its branch
    pub fn push(&mut self, branch: &str, job_id: JobId) {
        self.queues
            .entry(branch.to_string())
            .or_default()
            .push_back(job_id);
    }

    /// Head of every non-empty branch queue
    pub fn heads(&self) -> impl Iterator<Item = (&str, &JobId)> {
        self.queues
            .iter()
            .filter_map(|(branch, queue)| queue.front().map(|head| (branch.as_str(), head)))
    }

    #[cfg(test)]
    pub fn head(&self, branch: &str) -> Option<&JobId> {
        self.queues.get(branch).and_then(|queue| queue.front())
    }

    /// Remove and return the head of a branch
    pub fn pop_head(&mut self, branch: &str) -> Option<JobId> {
        let queue = self.queues.get_mut(branch)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(branch);
        }
        head
    }

    /// Remove a job from anywhere in its branch queue
    pub fn remove(&mut self, branch: &str, job_id: &JobId) -> bool {
        let Some(queue) = self.queues.get_mut(branch) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|queued| queued == job_id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            self.queues.remove(branch);
        }
        true
    }

    /// Total pending jobs across branches
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[cfg(test)]
    pub fn branch_count(&self) -> usize {
        self.queues.len()
    }
}

//! Registry of jobs currently in flight, so cleanup sweeps can skip them.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ActiveJobs {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `job_id` active until the returned guard is dropped.
    pub fn activate(&self, job_id: &str) -> ActiveJobGuard {
        self.inner.lock().insert(job_id.to_string());
        ActiveJobGuard {
            registry: self.clone(),
            job_id: job_id.to_string(),
        }
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.inner.lock().contains(job_id)
    }

    /// Copy of the current set of active job ids.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.lock().clone()
    }
}

/// Removes its job from the registry on drop.
#[derive(Debug)]
pub struct ActiveJobGuard {
    registry: ActiveJobs,
    job_id: String,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.registry.inner.lock().remove(&self.job_id);
    }
}

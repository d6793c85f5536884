//! Active-job registry
//!
//! Maps running job ids to their cancellation tokens. This is the only state
//! shared between concurrently running jobs; status lives in the job store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    tokens: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned map is still consistent: every operation is a single insert/remove
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a job and return the token its worker should watch
    pub fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(job_id, token.clone());
        token
    }

    pub fn deregister(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    /// Signal cancellation; false if the job is not active
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.lock().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    pub fn active_jobs(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_cancel_deregister() {
        let registry = JobRegistry::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id);

        assert_eq!(registry.active_jobs(), vec![job_id]);
        assert!(registry.cancel(job_id));
        assert!(token.is_cancelled());

        registry.deregister(job_id);
        assert!(registry.active_jobs().is_empty());
        assert!(!registry.cancel(job_id));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = JobRegistry::new();
        let other = registry.clone();
        let job_id = Uuid::new_v4();
        registry.register(job_id);
        assert_eq!(other.active_jobs(), vec![job_id]);
    }
}

//! Deferred supervisor reload: debounce timer plus one-shot hook lists.
//!
//! Mutations that affect persisted configuration never reload the
//! supervisor synchronously. They mutate in-memory state, optionally
//! register hooks, and call [`ReloadCoordinator::schedule`]; the daemon
//! loop fires once the quiet period elapses with no further schedules.

use std::time::Duration;

use tokio::time::Instant;

use crate::registry::{Manager, Result};

/// Debounce window between the last schedule and the reload firing.
pub const QUIET_PERIOD: Duration = Duration::from_secs(3);

/// A one-shot reload hook. Runs against the registry on the next firing
/// only; failures are logged by the firing path and never abort the
/// sequence.
pub type Hook = Box<dyn FnOnce(&mut Manager) -> Result<()> + Send>;

/// Debounced reload trigger with ordered pre/post hook lists.
pub struct ReloadCoordinator {
    quiet_period: Duration,
    deadline: Option<Instant>,
    pre_hooks: Vec<Hook>,
    post_hooks: Vec<Hook>,
}

impl ReloadCoordinator {
    /// Create a coordinator with the given quiet period.
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    /// (Re)arm the timer to fire once, a quiet period from now.
    ///
    /// Successive calls within the quiet period collapse into a single
    /// firing.
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet_period);
    }

    /// The pending firing time, if a reload is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Register a hook to run before the next supervisor reload.
    pub fn add_pre_hook<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut Manager) -> Result<()> + Send + 'static,
    {
        self.pre_hooks.push(Box::new(hook));
    }

    /// Register a hook to run after the next successful supervisor reload.
    pub fn add_post_hook<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut Manager) -> Result<()> + Send + 'static,
    {
        self.post_hooks.push(Box::new(hook));
    }

    /// Begin a firing: disarm the timer and take both hook lists.
    ///
    /// Hooks registered after this point belong to the next firing.
    pub(crate) fn take_firing(&mut self) -> (Vec<Hook>, Vec<Hook>) {
        self.deadline = None;
        (
            std::mem::take(&mut self.pre_hooks),
            std::mem::take(&mut self.post_hooks),
        )
    }
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::new(QUIET_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_rearms_deadline() {
        let mut reload = ReloadCoordinator::new(QUIET_PERIOD);
        assert!(reload.deadline().is_none());

        reload.schedule();
        let first = reload.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        reload.schedule();
        let second = reload.deadline().unwrap();

        assert_eq!(second - first, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_firing_clears_state() {
        let mut reload = ReloadCoordinator::new(QUIET_PERIOD);
        reload.schedule();
        reload.add_pre_hook(|_| Ok(()));
        reload.add_post_hook(|_| Ok(()));

        let (pre, post) = reload.take_firing();
        assert_eq!(pre.len(), 1);
        assert_eq!(post.len(), 1);
        assert!(reload.deadline().is_none());

        let (pre, post) = reload.take_firing();
        assert!(pre.is_empty());
        assert!(post.is_empty());
    }
}

//! Configuration for the state machine and the leader.

/// What happens to the rollback tail after an upstream rebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackTailPolicy {
    /// Keep the confirmed events before the rollback point and append the
    /// replacement events.
    #[default]
    RetainConfirmed,
    /// Start over with an empty tail; the rebase consumed it.
    ResetOnRebase,
}

/// Options for [`update_sync_state`](crate::update_sync_state).
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Skip local-only pending events while matching pending against an
    /// upstream batch. Upstream never echoes them back.
    pub ignore_local_events: bool,
    /// Rollback tail handling after an upstream rebase.
    pub rollback_tail: RollbackTailPolicy,
    /// Verify state invariants after every transition.
    pub check_invariants: bool,
}

impl UpdateOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self {
            ignore_local_events: false,
            rollback_tail: RollbackTailPolicy::default(),
            check_invariants: cfg!(debug_assertions),
        }
    }

    /// Sets whether local-only pending events are skipped during matching.
    pub fn with_ignore_local_events(mut self, ignore: bool) -> Self {
        self.ignore_local_events = ignore;
        self
    }

    /// Sets the rollback tail policy.
    pub fn with_rollback_tail(mut self, policy: RollbackTailPolicy) -> Self {
        self.rollback_tail = policy;
        self
    }

    /// Enables or disables invariant checks.
    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of a [`SyncLeader`](crate::SyncLeader).
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    /// Options passed to every transition.
    pub options: UpdateOptions,
    /// How often a rejected local push is re-minted before giving up.
    pub max_reject_retries: u32,
}

impl LeaderConfig {
    /// Creates a leader configuration with default options.
    pub fn new() -> Self {
        Self {
            options: UpdateOptions::default(),
            max_reject_retries: 3,
        }
    }

    /// Sets the transition options.
    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the maximum number of re-mint attempts for rejected pushes.
    pub fn with_max_reject_retries(mut self, retries: u32) -> Self {
        self.max_reject_retries = retries;
        self
    }
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

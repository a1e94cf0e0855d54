use std::time::Duration;

/// Engine constants and tunables shared by the store, deduplicator and
/// cooldown tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rolling round log size (newest first).
    pub log_capacity: usize,
    /// Extra round ids remembered by the deduplicator beyond the log window.
    pub dedup_grace: usize,
    /// Interval of the polling driver. Also bounds how often an id-less
    /// record may be admitted.
    pub poll_interval: Duration,
    /// Cooldown applied to skills missing from the catalog.
    pub default_skill_cooldown: Duration,
}

impl EngineConfig {
    pub const DEFAULT_LOG_CAPACITY: usize = 100;
    pub const DEFAULT_DEDUP_GRACE: usize = 32;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);
    pub const DEFAULT_SKILL_COOLDOWN: Duration = Duration::from_secs(3);
    /// One cooldown round is displayed as one second.
    pub const COOLDOWN_ROUND: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            log_capacity: Self::DEFAULT_LOG_CAPACITY,
            dedup_grace: Self::DEFAULT_DEDUP_GRACE,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            default_skill_cooldown: Self::DEFAULT_SKILL_COOLDOWN,
        }
    }

    /// Number of round ids the deduplicator keeps.
    pub fn dedup_capacity(&self) -> usize {
        self.log_capacity.max(1) + self.dedup_grace
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

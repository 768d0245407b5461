//! Configuration for the sync engine.

use std::time::Duration;
use zonesync_protocol::{DatabaseScope, ZoneId};

/// Default cap on records per upload batch; the remote service rejects
/// oversized batches.
pub const DEFAULT_MAX_BATCH: usize = 260;

/// Default ceiling on change-scan pages per fetch.
pub const DEFAULT_MAX_SCAN_PAGES: u32 = 100;

/// Default ceiling on push rounds before the hierarchy is considered
/// misconfigured.
pub const DEFAULT_MAX_PUSH_ROUNDS: u32 = 100;

/// Declares one syncable record type and its push ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTypeDescriptor {
    /// The record type tag used by the remote schema, e.g. `"Note"`.
    pub record_type: String,
    /// Push-ordering level; types referenced as parents must have a
    /// strictly lower level than their children.
    pub hierarchy_level: u32,
}

impl RecordTypeDescriptor {
    /// Creates a record type descriptor.
    pub fn new(record_type: impl Into<String>, hierarchy_level: u32) -> Self {
        Self {
            record_type: record_type.into(),
            hierarchy_level,
        }
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Custom remote container identifier, or `None` for the default.
    pub container_id: Option<String>,
    /// Name of the custom zone all pushed records live in.
    pub zone_name: String,
    /// Database scopes this engine synchronizes.
    pub databases: Vec<DatabaseScope>,
    /// The statically registered record types.
    pub record_types: Vec<RecordTypeDescriptor>,
    /// Maximum records per upload batch.
    pub max_batch: usize,
    /// Ceiling on change-scan pages per fetch.
    pub max_scan_pages: u32,
    /// Ceiling on push rounds.
    pub max_push_rounds: u32,
    /// Retry configuration for callers that retry temporary failures.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for the given zone name.
    pub fn new(zone_name: impl Into<String>) -> Self {
        Self {
            container_id: None,
            zone_name: zone_name.into(),
            databases: vec![DatabaseScope::Private, DatabaseScope::Shared],
            record_types: Vec::new(),
            max_batch: DEFAULT_MAX_BATCH,
            max_scan_pages: DEFAULT_MAX_SCAN_PAGES,
            max_push_rounds: DEFAULT_MAX_PUSH_ROUNDS,
            retry: RetryConfig::default(),
        }
    }

    /// Sets a custom container identifier.
    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// Sets the synchronized database scopes.
    pub fn with_databases(mut self, databases: Vec<DatabaseScope>) -> Self {
        self.databases = databases;
        self
    }

    /// Registers a record type.
    pub fn with_record_type(mut self, descriptor: RecordTypeDescriptor) -> Self {
        self.record_types.push(descriptor);
        self
    }

    /// Sets the upload batch cap.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Sets the change-scan page ceiling.
    pub fn with_max_scan_pages(mut self, pages: u32) -> Self {
        self.max_scan_pages = pages;
        self
    }

    /// Sets the push round ceiling.
    pub fn with_max_push_rounds(mut self, rounds: u32) -> Self {
        self.max_push_rounds = rounds;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The zone all pushed records are created in.
    pub fn zone(&self) -> ZoneId {
        ZoneId::own(&self.zone_name)
    }

    /// Looks up the registered hierarchy level for a record type.
    pub fn level_for(&self, record_type: &str) -> Option<u32> {
        self.record_types
            .iter()
            .find(|d| d.record_type == record_type)
            .map(|d| d.hierarchy_level)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("zonesync")
    }
}

/// Configuration for retry behavior.
///
/// The engine itself does not schedule retries; callers use this to compute
/// backoff delays for errors where `is_retryable()` holds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * pseudo_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap clock-derived jitter; avoids pulling in an RNG dependency.
fn pseudo_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("notes")
            .with_container_id("com.example.notes")
            .with_record_type(RecordTypeDescriptor::new("Folder", 0))
            .with_record_type(RecordTypeDescriptor::new("Note", 1))
            .with_max_batch(50);

        assert_eq!(config.zone_name, "notes");
        assert_eq!(config.container_id.as_deref(), Some("com.example.notes"));
        assert_eq!(config.max_batch, 50);
        assert_eq!(config.level_for("Folder"), Some(0));
        assert_eq!(config.level_for("Note"), Some(1));
        assert_eq!(config.level_for("Tag"), None);
    }

    #[test]
    fn default_scopes_exclude_public() {
        let config = SyncConfig::new("notes");
        assert!(!config.databases.contains(&DatabaseScope::Public));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(150)); // with jitter

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250)); // 5s + 25% jitter
    }

    #[test]
    fn no_retry_config() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }
}

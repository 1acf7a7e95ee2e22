use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::configuration::LockConfiguration;
use crate::duration::DurationResolver;
use crate::error::ConfigurationError;
use crate::intent::LockIntent;
use crate::lookup::{IntentLookup, default_lookups};
use crate::resolver::{NameResolver, ValueResolver};
use crate::task::{ScheduledMethod, ScheduledTask};

/// Process-wide defaults used when a task does not declare a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorDefaults {
    pub lock_at_most_for: Duration,
    pub lock_at_least_for: Duration,
}

impl Default for ExtractorDefaults {
    fn default() -> Self {
        Self {
            lock_at_most_for: Duration::from_secs(30 * 60),
            lock_at_least_for: Duration::ZERO,
        }
    }
}

/// Turns a scheduled task into the lock configuration it should run under.
pub trait LockConfigurationExtractor: Send + Sync {
    /// Returns `Ok(None)` when the task carries no lock intent and should run
    /// unlocked.
    fn get_lock_configuration(
        &self,
        task: &ScheduledTask,
    ) -> Result<Option<LockConfiguration>, ConfigurationError>;
}

/// [`LockConfigurationExtractor`] that reads declared [`LockIntent`] through an
/// ordered list of [`IntentLookup`] strategies.
#[derive(Debug)]
pub struct IntentConfigurationExtractor {
    defaults: ExtractorDefaults,
    names: NameResolver,
    durations: DurationResolver,
    lookups: Vec<Box<dyn IntentLookup>>,
    clock: Arc<dyn Clock>,
}

impl IntentConfigurationExtractor {
    pub fn new(defaults: ExtractorDefaults) -> Self {
        Self {
            defaults,
            names: NameResolver::passthrough(),
            durations: DurationResolver::default(),
            lookups: default_lookups(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Resolve placeholders in lock names and duration texts with `resolver`.
    #[must_use]
    pub fn with_value_resolver(mut self, resolver: Arc<dyn ValueResolver>) -> Self {
        self.names = NameResolver::new(resolver);
        self.durations = DurationResolver::new(self.names.clone());
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the lookup strategies; they are tried in order.
    #[must_use]
    pub fn with_lookups(mut self, lookups: Vec<Box<dyn IntentLookup>>) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn defaults(&self) -> ExtractorDefaults {
        self.defaults
    }

    /// Locate the lock intent for a method-backed task.
    pub fn find_intent(&self, task: &ScheduledMethod) -> Option<LockIntent> {
        self.lookups.iter().find_map(|l| l.find_lock_intent(task))
    }

    /// Resolve `intent` into a configuration anchored at `now`.
    pub fn configuration_for(
        &self,
        intent: &LockIntent,
        now: DateTime<Utc>,
    ) -> Result<LockConfiguration, ConfigurationError> {
        let name = self.names.resolve(&intent.name);
        let at_most_for = self.durations.resolve(
            &intent.lock_at_most_for,
            self.defaults.lock_at_most_for,
            "lock_at_most_for_string",
        )?;
        let at_least_for = self.durations.resolve(
            &intent.lock_at_least_for,
            self.defaults.lock_at_least_for,
            "lock_at_least_for_string",
        )?;
        LockConfiguration::new(now, name, at_most_for, at_least_for)
    }
}

impl LockConfigurationExtractor for IntentConfigurationExtractor {
    fn get_lock_configuration(
        &self,
        task: &ScheduledTask,
    ) -> Result<Option<LockConfiguration>, ConfigurationError> {
        let ScheduledTask::Method(method) = task else {
            debug!(task = %task, "unknown task type, not locking");
            return Ok(None);
        };
        let Some(intent) = self.find_intent(method) else {
            return Ok(None);
        };
        // One instant for both expiries.
        let now = self.clock.now();
        self.configuration_for(&intent, now).map(Some)
    }
}

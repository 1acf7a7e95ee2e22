//! Core types for cronlock.
//!
//! A scheduled task declares lock intent (a name plus two durations). The
//! [`IntentConfigurationExtractor`] turns that intent into a concrete
//! [`LockConfiguration`] anchored at the moment of resolution, which a lock
//! provider then tries to obtain in the shared store.

pub mod clock;
pub mod configuration;
pub mod duration;
pub mod error;
pub mod extractor;
pub mod intent;
pub mod lookup;
pub mod resolver;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use configuration::LockConfiguration;
pub use duration::{DurationResolver, parse_iso8601};
pub use error::ConfigurationError;
pub use extractor::{ExtractorDefaults, IntentConfigurationExtractor, LockConfigurationExtractor};
pub use intent::{
    Declaration, IntentShape, LockIntent, RawDuration, SchedulerLock, TextSchedulerLock,
};
pub use lookup::{IntentLookup, MethodLookup, TargetLookup, default_lookups};
pub use resolver::{NameResolver, PlaceholderResolver, ValueResolver};
pub use task::{MethodDescriptor, ScheduledMethod, ScheduledTask, TaskTarget, TypeDescriptor};

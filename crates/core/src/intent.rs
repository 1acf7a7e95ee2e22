use serde::Deserialize;

/// A declared duration: a raw millisecond value, a textual value, or neither.
///
/// A negative `millis` means "not set".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDuration {
    pub millis: i64,
    pub text: String,
}

impl RawDuration {
    pub fn new(millis: i64, text: impl Into<String>) -> Self {
        Self {
            millis,
            text: text.into(),
        }
    }

    /// Neither raw nor textual value declared; the default applies.
    pub fn unset() -> Self {
        Self::new(-1, "")
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(-1, text)
    }

    pub fn millis(millis: i64) -> Self {
        Self::new(millis, "")
    }
}

/// Lock intent with separate raw-millisecond and textual fields per duration.
///
/// This is the canonical declaration shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerLock {
    pub name: String,
    #[serde(default = "unset_millis")]
    pub lock_at_most_for: i64,
    #[serde(default)]
    pub lock_at_most_for_string: String,
    #[serde(default = "unset_millis")]
    pub lock_at_least_for: i64,
    #[serde(default)]
    pub lock_at_least_for_string: String,
}

impl SchedulerLock {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock_at_most_for: -1,
            lock_at_most_for_string: String::new(),
            lock_at_least_for: -1,
            lock_at_least_for_string: String::new(),
        }
    }
}

/// Legacy lock intent: durations are declared as text only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextSchedulerLock {
    pub name: String,
    #[serde(default)]
    pub lock_at_most_for: String,
    #[serde(default)]
    pub lock_at_least_for: String,
}

fn unset_millis() -> i64 {
    -1
}

/// A lock declaration attached to a task method, in either supported shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    SchedulerLock(SchedulerLock),
    Text(TextSchedulerLock),
}

/// Which declaration shape a [`LockIntent`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentShape {
    Canonical,
    Legacy,
}

/// Normalized lock intent, independent of the declaration shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIntent {
    pub shape: IntentShape,
    pub name: String,
    pub lock_at_most_for: RawDuration,
    pub lock_at_least_for: RawDuration,
}

impl LockIntent {
    /// Pick the intent from a set of declarations on one element.
    ///
    /// The canonical shape wins over the legacy one regardless of order.
    pub fn from_declarations(declarations: &[Declaration]) -> Option<Self> {
        declarations
            .iter()
            .find(|d| matches!(d, Declaration::SchedulerLock(_)))
            .or_else(|| declarations.first())
            .map(Self::from)
    }
}

impl From<&Declaration> for LockIntent {
    fn from(declaration: &Declaration) -> Self {
        match declaration {
            Declaration::SchedulerLock(lock) => Self {
                shape: IntentShape::Canonical,
                name: lock.name.clone(),
                lock_at_most_for: RawDuration::new(
                    lock.lock_at_most_for,
                    lock.lock_at_most_for_string.clone(),
                ),
                lock_at_least_for: RawDuration::new(
                    lock.lock_at_least_for,
                    lock.lock_at_least_for_string.clone(),
                ),
            },
            Declaration::Text(lock) => Self {
                shape: IntentShape::Legacy,
                name: lock.name.clone(),
                lock_at_most_for: RawDuration::text(lock.lock_at_most_for.clone()),
                lock_at_least_for: RawDuration::text(lock.lock_at_least_for.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy(name: &str) -> Declaration {
        Declaration::Text(TextSchedulerLock {
            name: name.into(),
            lock_at_most_for: "PT1M".into(),
            lock_at_least_for: String::new(),
        })
    }

    #[test]
    fn canonical_shape_wins() {
        let declarations = vec![
            legacy("legacy"),
            Declaration::SchedulerLock(SchedulerLock::named("canonical")),
        ];
        let intent = LockIntent::from_declarations(&declarations).unwrap();
        assert_eq!(intent.shape, IntentShape::Canonical);
        assert_eq!(intent.name, "canonical");
    }

    #[test]
    fn legacy_shape_has_no_raw_override() {
        let intent = LockIntent::from_declarations(&[legacy("legacy")]).unwrap();
        assert_eq!(intent.shape, IntentShape::Legacy);
        assert_eq!(intent.lock_at_most_for, RawDuration::new(-1, "PT1M"));
        assert_eq!(intent.lock_at_least_for, RawDuration::unset());
    }

    #[test]
    fn no_declarations_no_intent() {
        assert!(LockIntent::from_declarations(&[]).is_none());
    }
}

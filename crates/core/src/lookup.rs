use crate::intent::LockIntent;
use crate::task::ScheduledMethod;

/// A strategy for locating lock intent on a scheduled method.
///
/// The extractor tries its strategies in order and uses the first hit.
pub trait IntentLookup: Send + Sync + std::fmt::Debug {
    fn find_lock_intent(&self, task: &ScheduledMethod) -> Option<LockIntent>;
}

/// Reads the declarations on the method exactly as the scheduler sees it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodLookup;

impl IntentLookup for MethodLookup {
    fn find_lock_intent(&self, task: &ScheduledMethod) -> Option<LockIntent> {
        LockIntent::from_declarations(&task.method.declarations)
    }
}

/// Resolves the concrete target type, then reads the declarations on its
/// method of the same name.
///
/// Covers intent attached to an implementation rather than to the wrapper the
/// scheduler holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetLookup;

impl IntentLookup for TargetLookup {
    fn find_lock_intent(&self, task: &ScheduledMethod) -> Option<LockIntent> {
        task.target
            .target_type()
            .method(&task.method.name)
            .and_then(|m| LockIntent::from_declarations(&m.declarations))
    }
}

/// The default lookup order: the method first, then the proxy target.
pub fn default_lookups() -> Vec<Box<dyn IntentLookup>> {
    vec![Box::new(MethodLookup), Box::new(TargetLookup)]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::intent::{Declaration, SchedulerLock};
    use crate::task::{MethodDescriptor, TaskTarget, TypeDescriptor};

    fn annotated(method: &str, lock: &str) -> MethodDescriptor {
        MethodDescriptor::new(method)
            .with_declaration(Declaration::SchedulerLock(SchedulerLock::named(lock)))
    }

    #[test]
    fn method_lookup_reads_visible_method() {
        let task = ScheduledMethod {
            target: TaskTarget::Direct(Arc::new(TypeDescriptor::new("Jobs"))),
            method: annotated("run", "visible"),
        };
        assert_eq!(MethodLookup.find_lock_intent(&task).unwrap().name, "visible");
    }

    #[test]
    fn target_lookup_unwraps_proxy() {
        let concrete = TypeDescriptor::new("JobsImpl").with_method(annotated("run", "on-impl"));
        let task = ScheduledMethod {
            target: TaskTarget::Proxy {
                target: Arc::new(concrete),
            },
            method: MethodDescriptor::new("run"),
        };
        assert!(MethodLookup.find_lock_intent(&task).is_none());
        assert_eq!(TargetLookup.find_lock_intent(&task).unwrap().name, "on-impl");
    }

    #[test]
    fn target_lookup_misses_unknown_method() {
        let concrete = TypeDescriptor::new("JobsImpl").with_method(annotated("other", "x"));
        let task = ScheduledMethod {
            target: TaskTarget::Proxy {
                target: Arc::new(concrete),
            },
            method: MethodDescriptor::new("run"),
        };
        assert!(TargetLookup.find_lock_intent(&task).is_none());
    }
}

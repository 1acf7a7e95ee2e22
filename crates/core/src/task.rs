//! Descriptors of the tasks a scheduler triggers.
//!
//! A scheduler hands the extractor a [`ScheduledTask`]. Only method-backed
//! tasks can carry lock intent; anything else runs unlocked.

use std::fmt;
use std::sync::Arc;

use crate::intent::Declaration;

/// A task method together with the lock declarations attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub declarations: Vec<Declaration>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_declaration(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }
}

/// A concrete type exposing task methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// The object a scheduled method is invoked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    /// The scheduler holds the concrete type itself.
    Direct(Arc<TypeDescriptor>),
    /// The scheduler holds a wrapper; `target` is the wrapped concrete type.
    Proxy { target: Arc<TypeDescriptor> },
}

impl TaskTarget {
    /// The concrete type behind this target, unwrapping one proxy level.
    pub fn target_type(&self) -> &Arc<TypeDescriptor> {
        match self {
            Self::Direct(ty) | Self::Proxy { target: ty } => ty,
        }
    }
}

/// A method-backed scheduled task: a target plus the method as the scheduler
/// sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMethod {
    pub target: TaskTarget,
    pub method: MethodDescriptor,
}

/// Anything a scheduler may trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTask {
    Method(ScheduledMethod),
    /// A task the extractor does not know how to inspect.
    Opaque(String),
}

impl fmt::Display for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(m) => write!(f, "{}.{}", m.target.target_type().name, m.method.name),
            Self::Opaque(description) => f.write_str(description),
        }
    }
}

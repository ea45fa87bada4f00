//! Task construction
//!
//! A [`Task`] is built by the caller and handed to
//! [`TaskQueue::add_task`](crate::TaskQueue::add_task), which takes ownership
//! of it. A task either runs an [`Operation`] (a leaf) or coordinates its
//! children (a group). Groups never touch the network themselves; their
//! outcome is derived from their children and an optional finalizer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::{PlatformError, Result};
use crate::platform::Operation;
use crate::types::{TaskId, TaskKind};

/// Runs once every child of a group has completed
///
/// Receives the children's outputs in child order. Its result becomes the
/// group's output, and a rejection puts the group in `error`.
#[async_trait]
pub trait GroupFinalizer: Send + Sync {
    /// Derive the group's output from its children's
    async fn finalize(
        &self,
        outputs: Vec<serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, PlatformError>;
}

/// Follow-up work run after a task completes
///
/// Runs after the task's `end` event, outside the registry lock. Failures
/// are logged and do not change the task's status.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    /// Called with the completed task's output
    async fn on_complete(&self, id: TaskId, output: &serde_json::Value) -> Result<()>;
}

/// What a task does when admitted
#[derive(Clone)]
pub(crate) enum Work {
    Leaf(Arc<dyn Operation>),
    Group(Option<Arc<dyn GroupFinalizer>>),
}

impl Work {
    pub(crate) fn is_group(&self) -> bool {
        matches!(self, Work::Group(_))
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Leaf(_) => f.write_str("Leaf"),
            Work::Group(finalizer) => write!(f, "Group(finalizer: {})", finalizer.is_some()),
        }
    }
}

/// A unit of work not yet registered with the queue
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) kind: TaskKind,
    pub(crate) work: Work,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    pub(crate) hook: Option<Arc<dyn CompletionHook>>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Task {
    /// Task running a single operation
    pub fn new(name: impl Into<String>, kind: TaskKind, operation: Arc<dyn Operation>) -> Self {
        Self::build(name.into(), kind, Work::Leaf(operation))
    }

    /// Task coordinating children
    ///
    /// Without a finalizer the group's output is the array of its children's
    /// outputs.
    pub fn group(
        name: impl Into<String>,
        kind: TaskKind,
        finalizer: Option<Arc<dyn GroupFinalizer>>,
    ) -> Self {
        Self::build(name.into(), kind, Work::Group(finalizer))
    }

    fn build(name: String, kind: TaskKind, work: Work) -> Self {
        Self {
            id: TaskId::next(),
            name,
            kind,
            work,
            parent: None,
            children: Vec::new(),
            hook: None,
            created_at: Utc::now(),
        }
    }

    /// Name this task's owner
    ///
    /// When the owner is already registered and still pending, the queue
    /// appends this task to the owner's children on registration.
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Attach this task to an unregistered group, in order
    pub fn child_of(mut self, parent: &mut Task) -> Self {
        self.parent = Some(parent.id);
        if !parent.children.contains(&self.id) {
            parent.children.push(self.id);
        }
        self
    }

    /// Run `hook` after the task completes
    pub fn with_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Id assigned at creation
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning task, if any
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Owned tasks in order
    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    /// Whether this task coordinates children instead of running an operation
    pub fn is_group(&self) -> bool {
        self.work.is_group()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("work", &self.work)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}

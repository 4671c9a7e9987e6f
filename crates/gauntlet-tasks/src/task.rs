//! Task types and definitions

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// The unit of work behind a task.
///
/// `Ok(())` means the verification passed; `Err` carries a human-readable
/// failure reason. Panics inside `run` are contained by the executor.
#[async_trait]
pub trait Check: Send + Sync {
    async fn run(&self) -> Result<(), String>;
}

/// Adapts a closure returning a future into a [`Check`]
pub struct CheckFn<F>(F);

impl<F> CheckFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Check for CheckFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    async fn run(&self) -> Result<(), String> {
        (self.0)().await
    }
}

/// Definition of a task handed to the orchestrator
#[derive(Clone)]
pub struct TaskDefinition {
    /// Task name, unique within a run
    pub name: String,

    /// Free-form grouping label
    pub category: String,

    /// Higher priorities are enqueued earlier
    pub priority: i32,

    /// Whether a terminal failure aborts the run
    pub required: bool,

    /// Overrides the run-wide retry budget
    pub max_retries: Option<u32>,

    /// Overrides the run-wide per-attempt timeout
    pub timeout: Option<Duration>,

    /// Work to execute
    pub check: Arc<dyn Check>,
}

impl TaskDefinition {
    /// Create a new task definition
    pub fn new(name: impl Into<String>, check: impl Check + 'static) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            priority: 0,
            required: false,
            max_retries: None,
            timeout: None,
            check: Arc::new(check),
        }
    }

    /// Create a task from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self::new(name, CheckFn::new(f))
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the task as required
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry budget after applying the run default
    pub fn effective_max_retries(&self, default: u32) -> u32 {
        self.max_retries.unwrap_or(default)
    }

    /// Timeout after applying the run default
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("required", &self.required)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#![forbid(unsafe_code)]

//! Cooperative, single-threaded batching scheduler.
//!
//! Mutations never deliver notifications synchronously. Instead they enqueue
//! a task here, and a later [`Scheduler::drain`] runs everything that piled
//! up. N writes in one synchronous burst therefore collapse into a single
//! notification pass.
//!
//! # Lanes
//!
//! Two priority lanes, [`Priority::High`] and [`Priority::Normal`]. Every
//! time the drain picks its next task it looks at the high lane first, so
//! all high tasks queued so far run before any normal task.
//!
//! # Invariants
//!
//! 1. Within a lane, tasks run in enqueue order.
//! 2. Tasks enqueued while a drain is running join that same drain.
//! 3. A task whose [`CancelToken`] is cancelled when it reaches the front
//!    of its lane is skipped without error. Running tasks are never
//!    interrupted.
//! 4. A failing task never corrupts the queue: every other task still runs
//!    and the failures are returned to the caller of `drain`.
//! 5. A drain never runs more than
//!    [`SchedulerConfig::max_tasks_per_drain`] tasks; tasks that would
//!    exceed the limit stay queued and the drain reports
//!    [`DrainError::Overflow`].
//!
//! # Hosting
//!
//! There is no event loop here. A host either calls [`Scheduler::drain`]
//! itself, awaits [`Scheduler::execution`], or installs a drain request
//! hook that fires whenever the queue goes from idle to non-empty and
//! schedules a drain on its own loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::cancel::CancelToken;

/// Environment variable read by [`SchedulerConfig::from_env`].
pub const MAX_TASKS_ENV: &str = "PATHWIRE_MAX_TASKS_PER_DRAIN";

/// Configuration for a [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on tasks executed by one drain. Guards against
    /// notification loops that keep re-enqueueing themselves.
    /// Default: 100_000.
    pub max_tasks_per_drain: usize,

    /// Emit a `debug` event summarising every non-empty drain.
    /// Default: true.
    pub log_drain_summary: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_drain: 100_000,
            log_drain_summary: true,
        }
    }
}

impl SchedulerConfig {
    /// Defaults, overridden by `PATHWIRE_MAX_TASKS_PER_DRAIN` when it holds
    /// a positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_value(std::env::var(MAX_TASKS_ENV).ok().as_deref())
    }

    fn with_env_value(self, raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => self,
            Some(raw) => match raw.parse::<usize>() {
                Ok(limit) if limit > 0 => self.with_max_tasks_per_drain(limit),
                _ => {
                    tracing::warn!(value = raw, "ignoring invalid {}", MAX_TASKS_ENV);
                    self
                }
            },
        }
    }

    /// Set the per-drain task limit.
    #[must_use]
    pub fn with_max_tasks_per_drain(mut self, limit: usize) -> Self {
        self.max_tasks_per_drain = limit.max(1);
        self
    }

    /// Enable or disable the drain summary event.
    #[must_use]
    pub fn with_drain_summary(mut self, enabled: bool) -> Self {
        self.log_drain_summary = enabled;
        self
    }
}

/// Priority lane of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Regular notification delivery.
    #[default]
    Normal,
    /// Runs before every queued normal task.
    High,
}

/// Identifier handed out by [`Scheduler::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned by a task body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    /// Create a task error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Capture another error's display text.
    #[must_use]
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::new(err.to_string())
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a task body.
pub type TaskResult = Result<(), TaskError>;

/// A task that failed during a drain or step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {id} ({label}) failed: {error}")]
pub struct TaskFailure {
    /// Which task failed.
    pub id: TaskId,
    /// Label given at enqueue time.
    pub label: &'static str,
    /// The error the task returned.
    #[source]
    pub error: TaskError,
}

/// Counters for one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Tasks that ran to completion (successfully or not).
    pub executed: usize,
    /// Tasks skipped because their token was cancelled.
    pub skipped: usize,
    /// Tasks that returned an error.
    pub failed: usize,
}

impl DrainReport {
    /// Tasks taken off the queue, whether they ran or not.
    #[must_use]
    pub fn dequeued(&self) -> usize {
        self.executed + self.skipped
    }
}

/// Error returned by [`Scheduler::drain`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    /// One or more tasks failed. Every other task still ran.
    #[error("{} task(s) failed during drain", .failures.len())]
    TasksFailed {
        /// Failures in execution order.
        failures: Vec<TaskFailure>,
        /// Counters for the drain.
        report: DrainReport,
    },
    /// The per-drain task limit was hit with work still queued.
    #[error("drain stopped after {limit} tasks with work still queued")]
    Overflow {
        /// The configured limit.
        limit: usize,
        /// Failures seen before the limit was hit.
        failures: Vec<TaskFailure>,
        /// Counters for the drain.
        report: DrainReport,
    },
}

impl DrainError {
    /// Task failures collected by the drain.
    #[must_use]
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            Self::TasksFailed { failures, .. } | Self::Overflow { failures, .. } => failures,
        }
    }

    /// Counters for the drain.
    #[must_use]
    pub fn report(&self) -> DrainReport {
        match self {
            Self::TasksFailed { report, .. } | Self::Overflow { report, .. } => *report,
        }
    }
}

/// What a single [`Scheduler::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The task ran and succeeded.
    Ran(TaskId),
    /// The task's token was cancelled; it did not run.
    Skipped(TaskId),
    /// The task ran and returned an error.
    Failed(TaskFailure),
}

/// Lifetime counters for a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    /// Completed drains (including empty ones).
    pub drains: u64,
    /// Tasks that ran.
    pub executed: u64,
    /// Tasks skipped due to cancellation.
    pub skipped: u64,
    /// Tasks that returned an error.
    pub failed: u64,
}

struct QueuedTask {
    id: TaskId,
    label: &'static str,
    token: Option<CancelToken>,
    run: Box<dyn FnOnce() -> TaskResult>,
}

struct SchedulerState {
    config: SchedulerConfig,
    high: VecDeque<QueuedTask>,
    normal: VecDeque<QueuedTask>,
    next_id: u64,
    draining: bool,
    waiters: Vec<Waker>,
    drain_request: Option<Rc<dyn Fn()>>,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        !self.draining && self.high.is_empty() && self.normal.is_empty()
    }

    fn pop_next(&mut self) -> Option<QueuedTask> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }
}

/// Handle to a cooperative task queue.
///
/// Cloning creates a new handle to the **same** queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

thread_local! {
    static CURRENT: Scheduler = Scheduler::new(SchedulerConfig::from_env());
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("high", &state.high.len())
            .field("normal", &state.normal.len())
            .field("draining", &state.draining)
            .field("stats", &state.stats)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    /// Create an independent scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerState {
                config,
                high: VecDeque::new(),
                normal: VecDeque::new(),
                next_id: 1,
                draining: false,
                waiters: Vec::new(),
                drain_request: None,
                stats: SchedulerStats::default(),
            })),
        }
    }

    /// The scheduler owned by the current thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Scheduler::clone)
    }

    /// Whether two handles refer to the same queue.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.inner.borrow().config.clone()
    }

    /// Replace the configuration. Takes effect at the next drain.
    pub fn set_config(&self, config: SchedulerConfig) {
        self.inner.borrow_mut().config = config;
    }

    /// Install the hook fired when the queue goes from idle to non-empty.
    ///
    /// The hook must not drain synchronously; it should arrange for a drain
    /// on the host loop.
    pub fn set_drain_request_hook(&self, hook: impl Fn() + 'static) {
        self.inner.borrow_mut().drain_request = Some(Rc::new(hook));
    }

    /// Remove the drain request hook.
    pub fn clear_drain_request_hook(&self) {
        self.inner.borrow_mut().drain_request = None;
    }

    /// Queue a task.
    pub fn enqueue(
        &self,
        task: impl FnOnce() -> TaskResult + 'static,
        priority: Priority,
        token: Option<&CancelToken>,
    ) -> TaskId {
        self.enqueue_labeled("task", task, priority, token)
    }

    /// Queue a task with a label used in logs and failure reports.
    pub fn enqueue_labeled(
        &self,
        label: &'static str,
        task: impl FnOnce() -> TaskResult + 'static,
        priority: Priority,
        token: Option<&CancelToken>,
    ) -> TaskId {
        let (id, request) = {
            let mut state = self.inner.borrow_mut();
            let was_idle = state.is_idle();
            let id = TaskId(state.next_id);
            state.next_id += 1;
            let queued = QueuedTask {
                id,
                label,
                token: token.cloned(),
                run: Box::new(task),
            };
            match priority {
                Priority::High => state.high.push_back(queued),
                Priority::Normal => state.normal.push_back(queued),
            }
            let request = if was_idle {
                state.drain_request.clone()
            } else {
                None
            };
            (id, request)
        };
        tracing::trace!(task = id.0, label, ?priority, "task enqueued");
        if let Some(request) = request {
            request();
        }
        id
    }

    /// Number of queued tasks across both lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.borrow();
        state.high.len() + state.normal.len()
    }

    /// Whether both lanes are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a drain is in progress.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.borrow().draining
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.inner.borrow().stats
    }

    fn pop_next(&self) -> Option<QueuedTask> {
        self.inner.borrow_mut().pop_next()
    }

    fn run_task(&self, task: QueuedTask) -> StepOutcome {
        let QueuedTask {
            id,
            label,
            token,
            run,
        } = task;
        if token.as_ref().is_some_and(CancelToken::is_cancelled) {
            tracing::trace!(task = id.0, label, "task skipped: token cancelled");
            self.inner.borrow_mut().stats.skipped += 1;
            return StepOutcome::Skipped(id);
        }
        // The state borrow is released here so the task may enqueue freely.
        let result = run();
        let mut state = self.inner.borrow_mut();
        state.stats.executed += 1;
        match result {
            Ok(()) => StepOutcome::Ran(id),
            Err(error) => {
                state.stats.failed += 1;
                drop(state);
                tracing::warn!(task = id.0, label, %error, "task failed");
                StepOutcome::Failed(TaskFailure { id, label, error })
            }
        }
    }

    /// Run exactly one task (high lane first).
    ///
    /// Returns `None` when the queue is empty or a drain is in progress.
    pub fn step(&self) -> Option<StepOutcome> {
        if self.is_draining() {
            return None;
        }
        let task = self.pop_next()?;
        Some(self.run_task(task))
    }

    /// Run queued tasks until both lanes are empty.
    ///
    /// Calling `drain` from inside a task is a no-op returning an empty
    /// report; the outer drain picks up whatever the task enqueued.
    pub fn drain(&self) -> Result<DrainReport, DrainError> {
        let (limit, log_summary) = {
            let mut state = self.inner.borrow_mut();
            if state.draining {
                return Ok(DrainReport::default());
            }
            state.draining = true;
            (state.config.max_tasks_per_drain, state.config.log_drain_summary)
        };
        let guard = DrainGuard { scheduler: self };

        let mut report = DrainReport::default();
        let mut failures = Vec::new();
        let overflowed = loop {
            if report.dequeued() >= limit && !self.is_empty() {
                break true;
            }
            let Some(task) = self.pop_next() else {
                break false;
            };
            match self.run_task(task) {
                StepOutcome::Ran(_) => report.executed += 1,
                StepOutcome::Skipped(_) => report.skipped += 1,
                StepOutcome::Failed(failure) => {
                    report.executed += 1;
                    report.failed += 1;
                    failures.push(failure);
                }
            }
        };
        drop(guard);

        if log_summary && report.dequeued() > 0 {
            tracing::debug!(
                executed = report.executed,
                skipped = report.skipped,
                failed = report.failed,
                "drain complete"
            );
        }

        if overflowed {
            tracing::warn!(limit, remaining = self.len(), "drain limit reached");
            Err(DrainError::Overflow {
                limit,
                failures,
                report,
            })
        } else if !failures.is_empty() {
            Err(DrainError::TasksFailed { failures, report })
        } else {
            Ok(report)
        }
    }

    /// A future that resolves once every task queued at call time has run.
    ///
    /// When polled outside a drain it performs the drain itself. Polled from
    /// inside a task, it waits for the running drain to finish.
    #[must_use]
    pub fn execution(&self) -> Execution {
        let target = self.inner.borrow().next_id;
        Execution {
            scheduler: self.clone(),
            target,
        }
    }

    fn has_pending_before(&self, target: u64) -> bool {
        let state = self.inner.borrow();
        state
            .high
            .iter()
            .chain(state.normal.iter())
            .any(|task| task.id.0 < target)
    }
}

/// Clears the draining flag even if a task panics.
struct DrainGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.scheduler.inner.borrow_mut();
            state.draining = false;
            state.stats.drains += 1;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter.wake();
        }
    }
}

/// Future returned by [`Scheduler::execution`].
#[must_use = "futures do nothing unless polled"]
pub struct Execution {
    scheduler: Scheduler,
    target: u64,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("target", &self.target)
            .finish()
    }
}

impl Future for Execution {
    type Output = Result<(), DrainError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.scheduler.has_pending_before(self.target) {
            return Poll::Ready(Ok(()));
        }
        if self.scheduler.is_draining() {
            self.scheduler
                .inner
                .borrow_mut()
                .waiters
                .push(cx.waker().clone());
            return Poll::Pending;
        }
        Poll::Ready(self.scheduler.drain().map(|_| ()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

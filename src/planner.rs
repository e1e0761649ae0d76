//! # Planner Module for Goal-Oriented Action Planning (GOAP)
//!
//! The planner is the per-run scheduler. It is responsible for:
//! - Tracking the run's [`RunStatus`] and its current [`WorldState`]
//! - Selecting the next [`Action`](crate::Action) from the shared catalog
//! - Handing the action to the [`ActionExecutor`] and retrying transient
//!   failures
//! - Applying effects, and only after they have been persisted, committing
//!   them as the new state
//!
//! ## Selection policy
//!
//! Planning is greedy and one step deep. Each [`Planner::step`]:
//!
//! 1. completes the run if the goal predicate holds,
//! 2. filters the catalog down to the actions whose preconditions hold,
//! 3. stalls the run if none do,
//! 4. picks the cheapest applicable action, the first declared on ties,
//! 5. executes it and applies its effects on success.
//!
//! The planner never schedules itself. Something else (usually the
//! [`RunController`](crate::RunController)) calls `step` until the run leaves
//! `Running`.
//!
//! ## Basic Usage
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use novel_goap::{
//!     Action, ActionExecutor, Catalog, ContentGenerator, ExecutionError, GenerationRequest,
//!     NoopSink, Planner, RetryPolicy, RunStatus, StepOutcome, WorldState,
//! };
//! use novel_goap::collaborator::ProjectContext;
//!
//! struct Stub;
//!
//! #[async_trait]
//! impl ContentGenerator for Stub {
//!     async fn generate(&self, _request: &GenerationRequest) -> Result<String, ExecutionError> {
//!         Ok("text".to_string())
//!     }
//! }
//!
//! let mut set_title = Action::new("set_title", 1).unwrap();
//! set_title.effects.set("has_title", true);
//!
//! let catalog = Arc::new(Catalog::new(vec![set_title]).unwrap());
//! let executor = Arc::new(ActionExecutor::new(Arc::new(Stub)));
//! let mut planner = Planner::new(catalog, executor, RetryPolicy::immediate(0));
//!
//! let goal = |state: &WorldState| state.get_bool("has_title") == Some(true);
//! planner.start(WorldState::from_facts([("has_title", false)]), Arc::new(goal)).unwrap();
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let first = planner.step(ProjectContext::default(), &NoopSink).await.unwrap();
//! assert!(matches!(first, StepOutcome::Advanced { .. }));
//!
//! let second = planner.step(ProjectContext::default(), &NoopSink).await.unwrap();
//! assert_eq!(second, StepOutcome::Completed);
//! assert_eq!(planner.status(), RunStatus::Completed);
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::{Action, Preconditions};
use crate::catalog::{select_from, Catalog};
use crate::collaborator::ProjectContext;
use crate::config::RetryPolicy;
use crate::error::{ExecutionError, GoapError, Result};
use crate::executor::{ActionExecutor, ExecutionOutcome};
use crate::log_entry::{FacadeSink, LogEntry, LogLevel, LogSink};
use crate::world_state::{keys, WorldState};

const PLANNER_ACTOR: &str = "planner";

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Built but not started
    Created,
    Running,
    /// Suspended between steps, state retained
    Paused,
    /// The goal predicate holds
    Completed,
    /// No action applies and the goal does not hold
    Stalled,
    /// Halted by the user, a fatal error or the step budget
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Stalled | RunStatus::Stopped
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Stalled => "stalled",
            RunStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decides whether a run is done.
pub trait GoalPredicate: Send + Sync {
    fn is_satisfied(&self, state: &WorldState) -> bool;
}

impl<F> GoalPredicate for F
where
    F: Fn(&WorldState) -> bool + Send + Sync,
{
    fn is_satisfied(&self, state: &WorldState) -> bool {
        self(state)
    }
}

/// A goal written as a set of required facts.
impl GoalPredicate for Preconditions {
    fn is_satisfied(&self, state: &WorldState) -> bool {
        self.is_satisfied_by(state)
    }
}

/// The goal of a full novel run: the manuscript is published.
pub fn publication_goal() -> Preconditions {
    let mut goal = Preconditions::default();
    goal.require(keys::IS_PUBLISHED, true);
    goal
}

/// Durable write of a step's result, performed before the planner commits
/// the new state. An error keeps the planner on the old state.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn persist(&self, state: &WorldState, outcome: &ExecutionOutcome) -> Result<()>;
}

/// Sink that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl StateSink for NoopSink {
    async fn persist(&self, _state: &WorldState, _outcome: &ExecutionOutcome) -> Result<()> {
        Ok(())
    }
}

/// Pause and stop requests that arrive while a step is in flight.
///
/// Requests are only honored by [`Planner::honor_signals`], which the
/// planner calls at step boundaries.
#[derive(Debug, Default)]
pub struct RunSignals {
    pause: AtomicBool,
    stop: AtomicBool,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn take_pause(&self) -> bool {
        self.pause.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }
}

/// What one call to [`Planner::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The goal held; nothing was executed.
    Completed,
    /// No action applied; nothing was executed.
    Stalled,
    /// The action ran and its effects were persisted and committed.
    Advanced {
        action: String,
        attempts: u32,
        outcome: ExecutionOutcome,
    },
    /// The action failed with a content error or ran out of retries. The
    /// state is unchanged and the run is still running.
    Failed {
        action: String,
        attempts: u32,
        error: ExecutionError,
    },
    /// A pause or stop requested during the previous step landed before
    /// this one began; nothing was executed.
    Interrupted,
}

impl StepOutcome {
    pub fn action(&self) -> Option<&str> {
        match self {
            StepOutcome::Advanced { action, .. } | StepOutcome::Failed { action, .. } => {
                Some(action)
            }
            StepOutcome::Completed | StepOutcome::Stalled | StepOutcome::Interrupted => None,
        }
    }
}

/// The per-run GOAP scheduler.
///
/// A planner owns the run's world state and is its only writer. The catalog
/// and the executor are shared with other runs.
pub struct Planner {
    catalog: Arc<Catalog>,
    executor: Arc<ActionExecutor>,
    retry: RetryPolicy,
    status: RunStatus,
    state: WorldState,
    goal: Arc<dyn GoalPredicate>,
    log: Arc<dyn LogSink>,
    signals: Arc<RunSignals>,
    steps_taken: u32,
}

impl Planner {
    /// Creates a planner in the `Created` status.
    ///
    /// Until [`start`](Self::start) installs one, the goal is
    /// [`publication_goal`].
    pub fn new(catalog: Arc<Catalog>, executor: Arc<ActionExecutor>, retry: RetryPolicy) -> Self {
        Self {
            catalog,
            executor,
            retry,
            status: RunStatus::Created,
            state: WorldState::for_new_project(),
            goal: Arc::new(publication_goal()),
            log: Arc::new(FacadeSink),
            signals: Arc::new(RunSignals::new()),
            steps_taken: 0,
        }
    }

    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn with_signals(mut self, signals: Arc<RunSignals>) -> Self {
        self.signals = signals;
        self
    }

    pub fn signals(&self) -> Arc<RunSignals> {
        Arc::clone(&self.signals)
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn world_state(&self) -> &WorldState {
        &self.state
    }

    /// Number of actions dispatched to the executor, successful or not.
    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn goal_satisfied(&self) -> bool {
        self.goal.is_satisfied(&self.state)
    }

    /// Starts the run.
    ///
    /// From `Created` the initial state and goal are installed. From `Paused`
    /// only the goal is replaced; the retained state is kept and
    /// `initial_state` is ignored.
    ///
    /// # Errors
    ///
    /// [`GoapError::InvalidTransition`] if the run is already running or has
    /// ended.
    pub fn start(&mut self, initial_state: WorldState, goal: Arc<dyn GoalPredicate>) -> Result<()> {
        match self.status {
            RunStatus::Created => {
                self.state = initial_state;
                self.goal = goal;
                self.signals.clear();
                self.emit(LogLevel::Info, PLANNER_ACTOR, format!("run started at {}", self.state));
            }
            RunStatus::Paused => {
                self.goal = goal;
                self.signals.clear();
                self.emit(
                    LogLevel::Info,
                    PLANNER_ACTOR,
                    format!("run restarted from pause at {}", self.state),
                );
            }
            from => {
                return Err(GoapError::InvalidTransition {
                    from,
                    operation: "start",
                })
            }
        }
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Resumes a paused run with its current goal.
    pub fn resume(&mut self) -> Result<()> {
        if self.status != RunStatus::Paused {
            return Err(GoapError::InvalidTransition {
                from: self.status,
                operation: "resume",
            });
        }
        self.signals.clear();
        self.status = RunStatus::Running;
        self.emit(LogLevel::Info, PLANNER_ACTOR, "run resumed");
        Ok(())
    }

    /// Suspends the run. A no-op on a paused run.
    pub fn pause(&mut self) -> Result<()> {
        match self.status {
            RunStatus::Running => {
                self.status = RunStatus::Paused;
                self.emit(LogLevel::Info, PLANNER_ACTOR, "run paused");
                Ok(())
            }
            RunStatus::Paused => Ok(()),
            from => Err(GoapError::InvalidTransition {
                from,
                operation: "pause",
            }),
        }
    }

    /// Halts the run. Allowed from any status and idempotent.
    pub fn stop(&mut self) {
        if self.status != RunStatus::Stopped {
            self.status = RunStatus::Stopped;
            self.emit(LogLevel::Info, PLANNER_ACTOR, "run stopped");
        }
    }

    /// Applies pending pause or stop requests. Returns true if the status
    /// changed.
    pub fn honor_signals(&mut self) -> bool {
        if self.signals.stop_requested() {
            let changed = self.status != RunStatus::Stopped;
            self.stop();
            self.signals.clear();
            return changed;
        }
        if self.signals.take_pause() && self.status == RunStatus::Running {
            self.status = RunStatus::Paused;
            self.emit(LogLevel::Info, PLANNER_ACTOR, "run paused at step boundary");
            return true;
        }
        false
    }

    /// Runs one planning step.
    ///
    /// `context` is the read-only project snapshot for this step; its world
    /// state is replaced with the planner's own before dispatch. On success
    /// the new state is handed to `sink` and only committed if that write
    /// succeeds.
    ///
    /// Pending pause or stop requests are applied on every exit. One that is
    /// still pending on entry ends the step with
    /// [`StepOutcome::Interrupted`].
    ///
    /// # Errors
    ///
    /// - [`GoapError::InvalidTransition`] if the run is not running
    /// - [`GoapError::Fatal`] if the executor reported a fatal error; the run
    ///   is stopped
    /// - errors from applying effects or from `sink`; the state is unchanged
    pub async fn step(&mut self, mut context: ProjectContext, sink: &dyn StateSink) -> Result<StepOutcome> {
        if self.honor_signals() {
            return Ok(StepOutcome::Interrupted);
        }
        if self.status != RunStatus::Running {
            return Err(GoapError::InvalidTransition {
                from: self.status,
                operation: "step",
            });
        }

        if self.goal.is_satisfied(&self.state) {
            self.status = RunStatus::Completed;
            self.emit(
                LogLevel::Info,
                PLANNER_ACTOR,
                format!("goal reached at {}", self.state),
            );
            return Ok(StepOutcome::Completed);
        }

        let catalog = Arc::clone(&self.catalog);
        let action = match select_from(catalog.applicable(&self.state)) {
            Some(action) => action,
            None => {
                self.status = RunStatus::Stalled;
                self.emit(
                    LogLevel::Warn,
                    PLANNER_ACTOR,
                    format!("no applicable action at {}", self.state),
                );
                return Ok(StepOutcome::Stalled);
            }
        };

        self.emit(
            LogLevel::Info,
            PLANNER_ACTOR,
            format!("selected {}", action),
        );
        self.steps_taken += 1;

        context.world_state = self.state.clone();
        let context = Arc::new(context);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.executor.execute(action, Arc::clone(&context)).await {
                Ok(outcome) => {
                    let committed = self.commit(action, attempts, outcome, sink).await;
                    self.honor_signals();
                    return committed;
                }
                Err(error) => {
                    self.log_failure(action, attempts, &error);

                    if error.is_fatal() {
                        self.stop();
                        self.signals.clear();
                        return Err(GoapError::Fatal {
                            action: action.name.clone(),
                            message: error.message().to_string(),
                        });
                    }

                    let retries_used = attempts - 1;
                    let interrupted = self.signals.stop_requested() || self.signals.pause_requested();
                    if error.is_retryable() && retries_used < self.retry.max_retries && !interrupted {
                        let delay = self.retry.backoff(retries_used);
                        self.emit(
                            LogLevel::Info,
                            &action.label,
                            format!(
                                "retrying {} in {:?} ({}/{})",
                                action.name,
                                delay,
                                retries_used + 1,
                                self.retry.max_retries
                            ),
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    self.emit(
                        LogLevel::Error,
                        &action.label,
                        format!("{} failed after {} attempt(s)", action.name, attempts),
                    );
                    self.honor_signals();
                    return Ok(StepOutcome::Failed {
                        action: action.name.clone(),
                        attempts,
                        error,
                    });
                }
            }
        }
    }

    async fn commit(
        &mut self,
        action: &Action,
        attempts: u32,
        outcome: ExecutionOutcome,
        sink: &dyn StateSink,
    ) -> Result<StepOutcome> {
        let next = action.apply_effects(&self.state)?;
        next.check_invariants()?;

        if let Err(err) = sink.persist(&next, &outcome).await {
            self.emit(
                LogLevel::Error,
                &action.label,
                format!("{} not committed, persisting failed: {}", action.name, err),
            );
            return Err(err);
        }

        self.state = next;
        self.emit(
            LogLevel::Info,
            &action.label,
            format!(
                "{} succeeded with {} output(s), state now {}",
                action.name,
                outcome.outputs.len(),
                self.state
            ),
        );

        Ok(StepOutcome::Advanced {
            action: action.name.clone(),
            attempts,
            outcome,
        })
    }

    fn log_failure(&self, action: &Action, attempt: u32, error: &ExecutionError) {
        self.emit(
            LogLevel::Warn,
            &action.label,
            format!(
                "{} attempt {} failed with {} error: {} | state {}",
                action.name,
                attempt,
                error.kind(),
                error.message(),
                self.state
            ),
        );
    }

    fn emit(&self, level: LogLevel, actor: &str, message: impl Into<String>) {
        self.log.emit(LogEntry::new(level, actor, message));
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("status", &self.status)
            .field("state", &self.state)
            .field("catalog_len", &self.catalog.len())
            .field("steps_taken", &self.steps_taken)
            .finish()
    }
}

//! # Run Controller
//!
//! The controller owns every run of the application. A run is addressed by a
//! [`RunHandle`], an explicit value the caller passes back to each operation;
//! there is no ambient "current run".
//!
//! Per run the controller:
//! - loads the starting [`WorldState`] from the [`ProjectStore`]
//! - takes a project-context snapshot before each step
//! - saves generated content and the new state before the step is committed
//! - fans log entries out to subscribers
//! - stops the run once its step budget is used up
//!
//! One step at a time per run is guaranteed by an async mutex around the
//! planner. Different runs share the catalog and executor and otherwise do
//! not interact.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::collaborator::{ProjectContextProvider, ProjectId, ProjectStore};
use crate::config::PlannerConfig;
use crate::error::{GoapError, Result};
use crate::executor::{ActionExecutor, ExecutionOutcome};
use crate::log_entry::{LogEntry, LogHub, LogLevel, LogSink};
use crate::planner::{GoalPredicate, Planner, RunSignals, RunStatus, StateSink, StepOutcome};
use crate::world_state::WorldState;

const CONTROLLER_ACTOR: &str = "controller";

/// Identifier of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a run ended up `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    UserRequested,
    StepBudgetExhausted { max_steps: u32 },
    Fatal(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::UserRequested => f.write_str("stopped by user"),
            StopReason::StepBudgetExhausted { max_steps } => {
                write!(f, "step budget of {} exhausted", max_steps)
            }
            StopReason::Fatal(message) => write!(f, "fatal error: {}", message),
        }
    }
}

/// Observable summary of a run, published after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub world_state: WorldState,
    pub steps_taken: u32,
    pub stop_reason: Option<StopReason>,
}

/// Result of one [`RunController::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// `None` when the run was stopped before a step could begin
    pub outcome: Option<StepOutcome>,
    pub status: RunStatus,
    pub steps_taken: u32,
    pub stop_reason: Option<StopReason>,
}

struct PendingStart {
    initial_state: WorldState,
    goal: Arc<dyn GoalPredicate>,
}

struct RunInner {
    planner: Mutex<Planner>,
    signals: Arc<RunSignals>,
    log: Arc<LogHub>,
    pending_start: StdMutex<Option<PendingStart>>,
    stop_reason: StdMutex<Option<StopReason>>,
    snapshots: watch::Sender<RunSnapshot>,
}

/// Handle to one run. Cheap to clone; all clones address the same run.
#[derive(Clone)]
pub struct RunHandle {
    id: RunId,
    project_id: ProjectId,
    inner: Arc<RunInner>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Latest published snapshot. Does not wait for an in-flight step.
    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receiver that is notified of every published snapshot.
    pub fn watch(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner
            .stop_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_stop_reason(&self, reason: StopReason) {
        let mut slot = self
            .inner
            .stop_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    fn publish(&self, planner: &Planner) {
        let snapshot = RunSnapshot {
            status: planner.status(),
            world_state: planner.world_state().clone(),
            steps_taken: planner.steps_taken(),
            stop_reason: self.stop_reason(),
        };
        self.inner.snapshots.send_replace(snapshot);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.inner
            .log
            .emit(LogEntry::new(level, CONTROLLER_ACTOR, message));
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Persists a step through the project store: content first, then state.
struct ProjectSink<'a> {
    store: &'a dyn ProjectStore,
    project: &'a ProjectId,
}

#[async_trait]
impl StateSink for ProjectSink<'_> {
    async fn persist(&self, state: &WorldState, outcome: &ExecutionOutcome) -> Result<()> {
        self.store.save_content(self.project, outcome).await?;
        self.store.save_world_state(self.project, state).await
    }
}

/// Creates, drives and observes runs.
pub struct RunController {
    catalog: Arc<Catalog>,
    executor: Arc<ActionExecutor>,
    store: Arc<dyn ProjectStore>,
    context: Arc<dyn ProjectContextProvider>,
    config: PlannerConfig,
    runs: StdMutex<HashMap<RunId, RunHandle>>,
}

impl RunController {
    pub fn new(
        catalog: Arc<Catalog>,
        executor: Arc<ActionExecutor>,
        store: Arc<dyn ProjectStore>,
        context: Arc<dyn ProjectContextProvider>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            executor,
            store,
            context,
            config,
            runs: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Creates a run in the `Created` status.
    ///
    /// The starting state is the project's last saved state, or
    /// [`WorldState::for_new_project`] if nothing was saved yet.
    pub async fn create_run(
        &self,
        project_id: ProjectId,
        goal: Arc<dyn GoalPredicate>,
    ) -> Result<RunHandle> {
        let initial_state = match self.store.load_world_state(&project_id).await? {
            Some(state) => state,
            None => WorldState::for_new_project(),
        };

        let log = Arc::new(LogHub::new());
        let signals = Arc::new(RunSignals::new());
        let planner = Planner::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.executor),
            self.config.retry.clone(),
        )
        .with_log_sink(log.clone())
        .with_signals(Arc::clone(&signals));

        let (snapshots, _) = watch::channel(RunSnapshot {
            status: RunStatus::Created,
            world_state: initial_state.clone(),
            steps_taken: 0,
            stop_reason: None,
        });

        let handle = RunHandle {
            id: RunId::new(),
            project_id,
            inner: Arc::new(RunInner {
                planner: Mutex::new(planner),
                signals,
                log,
                pending_start: StdMutex::new(Some(PendingStart {
                    initial_state,
                    goal,
                })),
                stop_reason: StdMutex::new(None),
                snapshots,
            }),
        };

        log::info!("created run {} for project {}", handle.id, handle.project_id);
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, handle.clone());
        Ok(handle)
    }

    /// Looks up a run by id.
    pub fn handle(&self, id: RunId) -> Result<RunHandle> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| GoapError::UnknownRun(id.to_string()))
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Forgets a run. Existing handles keep working.
    pub fn remove_run(&self, id: RunId) -> Result<RunHandle> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or_else(|| GoapError::UnknownRun(id.to_string()))
    }

    /// Starts a created run with its loaded state, or restarts a paused one.
    pub async fn start(&self, handle: &RunHandle) -> Result<()> {
        let mut planner = handle.inner.planner.lock().await;
        let result = match planner.status() {
            RunStatus::Created => {
                let pending = handle
                    .inner
                    .pending_start
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match pending {
                    Some(PendingStart {
                        initial_state,
                        goal,
                    }) => planner.start(initial_state, goal),
                    None => Err(GoapError::InvalidTransition {
                        from: RunStatus::Created,
                        operation: "start",
                    }),
                }
            }
            RunStatus::Paused => planner.resume(),
            from => Err(GoapError::InvalidTransition {
                from,
                operation: "start",
            }),
        };
        handle.publish(&planner);
        result
    }

    /// Runs one planning step.
    ///
    /// The step budget only ends a run that would otherwise dispatch another
    /// action; a run whose goal already holds still completes.
    ///
    /// # Errors
    ///
    /// Everything [`Planner::step`] returns, plus context and persistence
    /// failures. A fatal executor error records [`StopReason::Fatal`].
    pub async fn advance(&self, handle: &RunHandle) -> Result<StepReport> {
        let mut planner = handle.inner.planner.lock().await;

        if planner.status() == RunStatus::Running
            && planner.steps_taken() >= self.config.max_steps
            && !planner.goal_satisfied()
            && self.catalog.select(planner.world_state()).is_some()
        {
            let reason = StopReason::StepBudgetExhausted {
                max_steps: self.config.max_steps,
            };
            handle.set_stop_reason(reason.clone());
            planner.stop();
            handle.log(LogLevel::Warn, reason.to_string());
            handle.publish(&planner);
            return Ok(StepReport {
                outcome: None,
                status: planner.status(),
                steps_taken: planner.steps_taken(),
                stop_reason: Some(reason),
            });
        }

        let mut context = self
            .context
            .snapshot(&handle.project_id, planner.world_state())
            .await
            .map_err(|err| match err {
                GoapError::Context(_) => err,
                other => GoapError::Context(other.to_string()),
            })?;
        context.project_id = Some(handle.project_id.clone());

        let sink = ProjectSink {
            store: self.store.as_ref(),
            project: &handle.project_id,
        };
        let result = planner.step(context, &sink).await;

        match &result {
            Err(GoapError::Fatal { message, .. }) => {
                handle.set_stop_reason(StopReason::Fatal(message.clone()));
            }
            Err(err) => handle.log(LogLevel::Error, format!("step failed: {}", err)),
            Ok(_) => {}
        }
        if planner.status() == RunStatus::Stopped {
            handle.set_stop_reason(StopReason::UserRequested);
        }
        handle.publish(&planner);

        let outcome = result?;
        Ok(StepReport {
            outcome: Some(outcome),
            status: planner.status(),
            steps_taken: planner.steps_taken(),
            stop_reason: handle.stop_reason(),
        })
    }

    /// Pauses the run, at the next step boundary if a step is in flight.
    pub fn pause(&self, handle: &RunHandle) -> Result<()> {
        match handle.inner.planner.try_lock() {
            Ok(mut planner) => {
                let result = planner.pause();
                handle.publish(&planner);
                result
            }
            Err(_) => {
                handle.inner.signals.request_pause();
                handle.log(LogLevel::Info, "pause requested, waiting for step to end");
                Ok(())
            }
        }
    }

    /// Stops the run, at the next step boundary if a step is in flight.
    pub fn stop(&self, handle: &RunHandle) {
        handle.set_stop_reason(StopReason::UserRequested);
        match handle.inner.planner.try_lock() {
            Ok(mut planner) => {
                planner.stop();
                handle.publish(&planner);
            }
            Err(_) => {
                handle.inner.signals.request_stop();
                handle.log(LogLevel::Info, "stop requested, waiting for step to end");
            }
        }
    }

    /// Registers a callback for every log entry of the run.
    pub fn subscribe<F>(&self, handle: &RunHandle, on_log: F)
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        handle.inner.log.subscribe(on_log);
    }

    /// Advances the run until it is no longer running, waiting
    /// `tick_interval` between steps.
    ///
    /// Also returns after a step fails with a content error, since retrying
    /// the same prompt would fail again. Transient failures that ran out of
    /// retries are re-attempted on the next tick.
    pub async fn run_until_settled(&self, handle: &RunHandle) -> Result<RunStatus> {
        let tick = self.config.tick_interval();
        loop {
            let report = self.advance(handle).await?;
            if report.status != RunStatus::Running {
                return Ok(report.status);
            }
            if let Some(StepOutcome::Failed { action, error, .. }) = &report.outcome {
                if !error.is_retryable() {
                    handle.log(
                        LogLevel::Warn,
                        format!("{} needs attention: {}", action, error),
                    );
                    return Ok(report.status);
                }
            }
            if !tick.is_zero() {
                tokio::time::sleep(tick).await;
            }
        }
    }

    /// Current status. Waits for an in-flight step to finish.
    pub async fn status(&self, handle: &RunHandle) -> RunStatus {
        handle.inner.planner.lock().await.status()
    }

    /// Current world state. Waits for an in-flight step to finish.
    pub async fn world_state(&self, handle: &RunHandle) -> WorldState {
        handle.inner.planner.lock().await.world_state().clone()
    }
}

impl fmt::Debug for RunController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("catalog_len", &self.catalog.len())
            .field("config", &self.config)
            .field("runs", &self.run_ids().len())
            .finish()
    }
}

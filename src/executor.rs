//! # Action Executor
//!
//! The executor turns one selected [`Action`] into calls to the
//! [`ContentGenerator`]. How many calls are made, and how their outputs are
//! merged, is decided by an [`ExecutionStrategy`]:
//!
//! | mode       | strategy             | calls                                   |
//! |------------|----------------------|-----------------------------------------|
//! | `SINGLE`   | [`SingleStrategy`]   | one                                     |
//! | `PARALLEL` | [`ParallelStrategy`] | one per fan-out unit, concurrently      |
//! | `HYBRID`   | [`HybridStrategy`]   | prelude calls in order, then a fan-out  |
//! | `SWARM`    | [`SwarmStrategy`]    | same as parallel, logged as swarm       |
//!
//! Strategies are looked up first by action name, then by execution mode, so
//! a single action can be given bespoke behaviour without touching the
//! planner.
//!
//! A fan-out succeeds only if every unit succeeds. Units that did succeed are
//! kept in an [`OutputCache`] and reused when the step is retried.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::action::{Action, ExecutionMode, PromptTemplate, WorkUnit};
use crate::collaborator::{ContentGenerator, GenerationRequest, ProjectContext, ProjectId};
use crate::config::GenerationOptions;
use crate::error::ExecutionError;

type ExecResult<T> = std::result::Result<T, ExecutionError>;

/// One piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub template: PromptTemplate,
    pub unit: WorkUnit,
    pub text: String,
}

/// Result of a successful action execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub action: String,
    pub mode: ExecutionMode,
    /// Label of the strategy that ran the action
    pub strategy: String,
    pub outputs: Vec<GeneratedContent>,
    /// Units served from the cache instead of a fresh call
    pub reused: usize,
}

type CacheKey = (String, String, String, WorkUnit);

/// Outputs of fan-out units that succeeded while their action as a whole
/// failed. Keyed by project, action, template and unit.
#[derive(Clone, Default)]
pub struct OutputCache {
    entries: Arc<Mutex<HashMap<CacheKey, String>>>,
}

impl OutputCache {
    fn key(project: &str, action: &str, template: &PromptTemplate, unit: &WorkUnit) -> CacheKey {
        (
            project.to_string(),
            action.to_string(),
            template.id().to_string(),
            unit.clone(),
        )
    }

    fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: CacheKey, text: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, text);
    }

    /// Drops every cached unit for one action of one project.
    pub fn clear_action(&self, project: &str, action: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(p, a, _, _), _| !(p == project && a == action));
    }

    pub fn len_for(&self, project: &str, action: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(p, a, _, _)| p == project && a == action)
            .count()
    }
}

impl fmt::Debug for OutputCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("OutputCache").field("entries", &len).finish()
    }
}

/// Everything a strategy needs besides the action itself.
#[derive(Clone)]
pub struct ExecutionContext {
    pub project: Arc<ProjectContext>,
    pub generator: Arc<dyn ContentGenerator>,
    pub options: GenerationOptions,
    pub cache: OutputCache,
}

impl ExecutionContext {
    /// Cache scope of this execution. Without a project id nothing is
    /// cached, so units never leak between projects.
    fn project_key(&self) -> Option<&str> {
        self.project.project_id.as_ref().map(ProjectId::as_str)
    }

    /// Issues one generation call, honouring the action's timeout.
    ///
    /// A timeout is reported as transient; blank output as a content error.
    pub async fn call(
        &self,
        action: &Action,
        template: &PromptTemplate,
        unit: WorkUnit,
        prior_outputs: Vec<String>,
    ) -> ExecResult<GeneratedContent> {
        let timeout = action.timeout.unwrap_or_else(|| self.options.timeout());
        let request = GenerationRequest {
            action: action.name.clone(),
            template: template.clone(),
            unit: unit.clone(),
            context: Arc::clone(&self.project),
            prior_outputs,
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            timeout,
        };

        let text = match tokio::time::timeout(timeout, self.generator.generate(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecutionError::Transient(format!(
                    "{} ({}) timed out after {:?}",
                    template, unit, timeout
                )))
            }
        };

        if text.trim().is_empty() {
            return Err(ExecutionError::Content(format!(
                "{} ({}) returned empty output",
                template, unit
            )));
        }

        Ok(GeneratedContent {
            template: template.clone(),
            unit,
            text,
        })
    }

    /// Runs one call per unit concurrently and waits for all of them.
    ///
    /// Cached units are not re-issued. On failure the most severe error is
    /// returned and the successful units stay cached, provided the context
    /// names a project.
    pub async fn fan_out(
        &self,
        action: &Action,
        template: &PromptTemplate,
        units: Vec<WorkUnit>,
        prior_outputs: &[String],
    ) -> ExecResult<(Vec<GeneratedContent>, usize)> {
        let project = self.project_key();
        let calls = units.into_iter().map(|unit| {
            let key = project.map(|p| OutputCache::key(p, &action.name, template, &unit));
            let prior = prior_outputs.to_vec();
            async move {
                if let Some(text) = key.as_ref().and_then(|k| self.cache.get(k)) {
                    log::debug!("{}: reusing cached output for {}", action.name, unit);
                    let content = GeneratedContent {
                        template: template.clone(),
                        unit,
                        text,
                    };
                    return (key, Ok(content), true);
                }
                let result = self.call(action, template, unit.clone(), prior).await;
                (key, result.map_err(|err| (unit, err)), false)
            }
        });

        let mut outputs = Vec::new();
        let mut reused = 0;
        let mut failure: Option<ExecutionError> = None;
        for (key, result, from_cache) in join_all(calls).await {
            match result {
                Ok(content) => {
                    if from_cache {
                        reused += 1;
                    } else if let Some(key) = key {
                        self.cache.insert(key, content.text.clone());
                    }
                    outputs.push(content);
                }
                Err((unit, err)) => {
                    log::warn!("{}: unit {} failed: {}", action.name, unit, err);
                    failure = Some(match failure {
                        Some(prev) if severity(&prev) >= severity(&err) => prev,
                        _ => err,
                    });
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok((outputs, reused)),
        }
    }
}

fn severity(err: &ExecutionError) -> u8 {
    match err {
        ExecutionError::Transient(_) => 0,
        ExecutionError::Content(_) => 1,
        ExecutionError::Fatal(_) => 2,
    }
}

/// How an action's generation calls are issued and merged.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn label(&self) -> &str;

    async fn run(&self, action: &Action, ctx: &ExecutionContext) -> ExecResult<ExecutionOutcome>;
}

fn outcome(
    action: &Action,
    strategy: &str,
    outputs: Vec<GeneratedContent>,
    reused: usize,
) -> ExecutionOutcome {
    ExecutionOutcome {
        action: action.name.clone(),
        mode: action.execution_mode,
        strategy: strategy.to_string(),
        outputs,
        reused,
    }
}

/// One call, one output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleStrategy;

#[async_trait]
impl ExecutionStrategy for SingleStrategy {
    fn label(&self) -> &str {
        "single"
    }

    async fn run(&self, action: &Action, ctx: &ExecutionContext) -> ExecResult<ExecutionOutcome> {
        let content = ctx
            .call(action, &action.prompt_template, WorkUnit::Whole, Vec::new())
            .await?;
        Ok(outcome(action, self.label(), vec![content], 0))
    }
}

/// One concurrent call per fan-out unit; all must succeed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelStrategy;

impl ParallelStrategy {
    async fn run_labeled(
        &self,
        label: &str,
        action: &Action,
        ctx: &ExecutionContext,
    ) -> ExecResult<ExecutionOutcome> {
        let units = action.fan_out.units(&ctx.project.world_state);
        if units.is_empty() {
            log::warn!("{}: fan-out has no units, nothing to generate", action.name);
        }
        log::debug!("{}: {} fan-out over {} units", action.name, label, units.len());
        let (outputs, reused) = ctx
            .fan_out(action, &action.prompt_template, units, &[])
            .await?;
        Ok(outcome(action, label, outputs, reused))
    }
}

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn label(&self) -> &str {
        "parallel"
    }

    async fn run(&self, action: &Action, ctx: &ExecutionContext) -> ExecResult<ExecutionOutcome> {
        self.run_labeled(self.label(), action, ctx).await
    }
}

/// Sequential prelude calls, each seeing the outputs before it, followed by a
/// parallel fan-out that sees all prelude outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HybridStrategy;

#[async_trait]
impl ExecutionStrategy for HybridStrategy {
    fn label(&self) -> &str {
        "hybrid"
    }

    async fn run(&self, action: &Action, ctx: &ExecutionContext) -> ExecResult<ExecutionOutcome> {
        let mut outputs = Vec::new();
        let mut prior: Vec<String> = Vec::new();
        let mut reused = 0;

        for template in &action.prelude {
            let (mut lead, hits) = ctx
                .fan_out(action, template, vec![WorkUnit::Whole], &prior)
                .await?;
            reused += hits;
            prior.extend(lead.iter().map(|c| c.text.clone()));
            outputs.append(&mut lead);
        }

        let units = action.fan_out.units(&ctx.project.world_state);
        let (mut rest, hits) = ctx
            .fan_out(action, &action.prompt_template, units, &prior)
            .await?;
        reused += hits;
        outputs.append(&mut rest);

        Ok(outcome(action, self.label(), outputs, reused))
    }
}

/// Placeholder for multi-agent fan-out; behaves like [`ParallelStrategy`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SwarmStrategy {
    inner: ParallelStrategy,
}

#[async_trait]
impl ExecutionStrategy for SwarmStrategy {
    fn label(&self) -> &str {
        "swarm"
    }

    async fn run(&self, action: &Action, ctx: &ExecutionContext) -> ExecResult<ExecutionOutcome> {
        log::info!("{}: swarm mode running as parallel fan-out", action.name);
        self.inner.run_labeled(self.label(), action, ctx).await
    }
}

/// Dispatches actions to strategies and owns the partial-output cache.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use novel_goap::{Action, ActionExecutor, ContentGenerator, ExecutionError, GenerationRequest};
/// use novel_goap::collaborator::{ProjectContext, ProjectId};
/// use novel_goap::WorldState;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ContentGenerator for Echo {
///     async fn generate(&self, request: &GenerationRequest) -> Result<String, ExecutionError> {
///         Ok(format!("{} for {}", request.template, request.unit))
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let executor = ActionExecutor::new(Arc::new(Echo));
/// let action = Action::new("generate_title", 1).unwrap();
/// let context = Arc::new(ProjectContext::new(ProjectId::new("p"), WorldState::new()));
///
/// let outcome = executor.execute(&action, context).await.unwrap();
/// assert_eq!(outcome.outputs[0].text, "generate_title for whole");
/// # });
/// ```
pub struct ActionExecutor {
    generator: Arc<dyn ContentGenerator>,
    options: GenerationOptions,
    modes: HashMap<ExecutionMode, Arc<dyn ExecutionStrategy>>,
    by_action: HashMap<String, Arc<dyn ExecutionStrategy>>,
    cache: OutputCache,
}

impl ActionExecutor {
    /// Creates an executor with the built-in strategy for every mode.
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        let mut modes: HashMap<ExecutionMode, Arc<dyn ExecutionStrategy>> = HashMap::new();
        modes.insert(ExecutionMode::Single, Arc::new(SingleStrategy));
        modes.insert(ExecutionMode::Parallel, Arc::new(ParallelStrategy));
        modes.insert(ExecutionMode::Hybrid, Arc::new(HybridStrategy));
        modes.insert(ExecutionMode::Swarm, Arc::new(SwarmStrategy::default()));

        Self {
            generator,
            options: GenerationOptions::default(),
            modes,
            by_action: HashMap::new(),
            cache: OutputCache::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the strategy used for every action of `mode`.
    pub fn register_mode(&mut self, mode: ExecutionMode, strategy: Arc<dyn ExecutionStrategy>) {
        self.modes.insert(mode, strategy);
    }

    /// Uses `strategy` for the action named `name`, whatever its mode.
    pub fn register_action(&mut self, name: impl Into<String>, strategy: Arc<dyn ExecutionStrategy>) {
        self.by_action.insert(name.into(), strategy);
    }

    pub fn strategy_for(&self, action: &Action) -> Option<Arc<dyn ExecutionStrategy>> {
        self.by_action
            .get(&action.name)
            .or_else(|| self.modes.get(&action.execution_mode))
            .cloned()
    }

    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }

    /// Runs `action` against a context snapshot.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ExecutionError`]; a missing strategy is
    /// reported as fatal since it is a wiring mistake.
    pub async fn execute(
        &self,
        action: &Action,
        project: Arc<ProjectContext>,
    ) -> ExecResult<ExecutionOutcome> {
        let strategy = self.strategy_for(action).ok_or_else(|| {
            ExecutionError::Fatal(format!(
                "no strategy registered for {} ({})",
                action.name, action.execution_mode
            ))
        })?;

        let ctx = ExecutionContext {
            project,
            generator: Arc::clone(&self.generator),
            options: self.options.clone(),
            cache: self.cache.clone(),
        };

        log::debug!("{}: executing with {} strategy", action.name, strategy.label());
        let result = strategy.run(action, &ctx).await;
        if let (Ok(_), Some(project)) = (&result, ctx.project_key()) {
            self.cache.clear_action(project, &action.name);
        }
        result
    }

    pub fn default_timeout(&self) -> Duration {
        self.options.timeout()
    }
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("options", &self.options)
            .field("action_overrides", &self.by_action.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FanOut;
    use crate::world_state::{keys, WorldState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that fails a configurable set of units a number of times.
    #[derive(Default)]
    struct ScriptedGenerator {
        calls: AtomicUsize,
        fail_units: Mutex<HashMap<WorkUnit, (usize, ExecutionError)>>,
        seen_prior: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedGenerator {
        fn fail(&self, unit: WorkUnit, times: usize, err: ExecutionError) {
            self.fail_units.lock().unwrap().insert(unit, (times, err));
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> ExecResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_prior
                .lock()
                .unwrap()
                .push(request.prior_outputs.clone());
            let mut fails = self.fail_units.lock().unwrap();
            if let Some((remaining, err)) = fails.get_mut(&request.unit) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
            Ok(format!("{}:{}", request.template, request.unit))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl ContentGenerator for SlowGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> ExecResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn context(state: WorldState) -> Arc<ProjectContext> {
        Arc::new(ProjectContext::new(ProjectId::new("p-1"), state))
    }

    fn chapters_state(count: i64, completed: i64) -> WorldState {
        WorldState::from_facts([
            (keys::CHAPTERS_COUNT, count),
            (keys::CHAPTERS_COMPLETED, completed),
        ])
    }

    fn draft_action() -> Action {
        Action::new("draft_chapters", 5)
            .unwrap()
            .with_mode(ExecutionMode::Parallel)
            .with_template(PromptTemplate::new("chapter_draft"))
            .with_fan_out(FanOut::PendingChapters)
    }

    #[tokio::test]
    async fn test_single_issues_one_call() {
        let generator = Arc::new(ScriptedGenerator::default());
        let executor = ActionExecutor::new(generator.clone());
        let action = Action::new("generate_title", 1).unwrap();

        let outcome = executor
            .execute(&action, context(WorldState::new()))
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.strategy, "single");
        assert_eq!(outcome.outputs.len(), 1);
        assert_eq!(outcome.outputs[0].unit, WorkUnit::Whole);
    }

    #[tokio::test]
    async fn test_parallel_covers_pending_chapters() {
        let generator = Arc::new(ScriptedGenerator::default());
        let executor = ActionExecutor::new(generator.clone());

        let outcome = executor
            .execute(&draft_action(), context(chapters_state(5, 2)))
            .await
            .unwrap();
        let units: Vec<_> = outcome.outputs.iter().map(|o| o.unit.clone()).collect();
        assert_eq!(
            units,
            vec![
                WorkUnit::Chapter(3),
                WorkUnit::Chapter(4),
                WorkUnit::Chapter(5)
            ]
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parallel_partial_failure_caches_successes() {
        let generator = Arc::new(ScriptedGenerator::default());
        generator.fail(
            WorkUnit::Chapter(2),
            1,
            ExecutionError::Transient("rate limited".into()),
        );
        let executor = ActionExecutor::new(generator.clone());
        let action = draft_action();

        let err = executor
            .execute(&action, context(chapters_state(3, 0)))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(executor.cache().len_for("p-1", "draft_chapters"), 2);

        let outcome = executor
            .execute(&action, context(chapters_state(3, 0)))
            .await
            .unwrap();
        assert_eq!(outcome.reused, 2);
        assert_eq!(outcome.outputs.len(), 3);
        // 3 first attempt + 1 retry of the failed chapter
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
        assert_eq!(executor.cache().len_for("p-1", "draft_chapters"), 0);
    }

    #[tokio::test]
    async fn test_anonymous_context_never_reuses_outputs() {
        let generator = Arc::new(ScriptedGenerator::default());
        generator.fail(
            WorkUnit::Chapter(2),
            1,
            ExecutionError::Transient("rate limited".into()),
        );
        let executor = ActionExecutor::new(generator.clone());
        let action = draft_action();
        let anonymous = || {
            Arc::new(ProjectContext {
                world_state: chapters_state(2, 0),
                ..ProjectContext::default()
            })
        };

        assert!(executor.execute(&action, anonymous()).await.is_err());
        assert_eq!(executor.cache().len_for("", "draft_chapters"), 0);

        let outcome = executor.execute(&action, anonymous()).await.unwrap();
        assert_eq!(outcome.reused, 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cached_units_stay_with_their_project() {
        let generator = Arc::new(ScriptedGenerator::default());
        generator.fail(
            WorkUnit::Chapter(2),
            1,
            ExecutionError::Transient("rate limited".into()),
        );
        let executor = ActionExecutor::new(generator.clone());
        let action = draft_action();

        let first = Arc::new(ProjectContext::new(ProjectId::new("a"), chapters_state(2, 0)));
        assert!(executor.execute(&action, first).await.is_err());
        assert_eq!(executor.cache().len_for("a", "draft_chapters"), 1);

        let second = Arc::new(ProjectContext::new(ProjectId::new("b"), chapters_state(2, 0)));
        let outcome = executor.execute(&action, second).await.unwrap();
        assert_eq!(outcome.reused, 0);
        assert_eq!(executor.cache().len_for("a", "draft_chapters"), 1);
    }

    #[tokio::test]
    async fn test_fan_out_reports_most_severe_error() {
        let generator = Arc::new(ScriptedGenerator::default());
        generator.fail(WorkUnit::Chapter(1), 1, ExecutionError::Transient("slow".into()));
        generator.fail(WorkUnit::Chapter(2), 1, ExecutionError::Content("unsafe".into()));
        let executor = ActionExecutor::new(generator);

        let err = executor
            .execute(&draft_action(), context(chapters_state(2, 0)))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Content("unsafe".into()));
    }

    #[tokio::test]
    async fn test_hybrid_runs_prelude_before_fan_out() {
        let generator = Arc::new(ScriptedGenerator::default());
        let executor = ActionExecutor::new(generator.clone());
        let action = Action::new("revise_manuscript", 4)
            .unwrap()
            .with_mode(ExecutionMode::Hybrid)
            .with_prelude(vec![PromptTemplate::new("manuscript_review")])
            .with_template(PromptTemplate::new("chapter_revision"))
            .with_fan_out(FanOut::AllChapters);

        let outcome = executor
            .execute(&action, context(chapters_state(2, 2)))
            .await
            .unwrap();
        assert_eq!(outcome.strategy, "hybrid");
        assert_eq!(outcome.outputs.len(), 3);
        assert_eq!(outcome.outputs[0].template.id(), "manuscript_review");

        let prior = generator.seen_prior.lock().unwrap().clone();
        assert!(prior[0].is_empty());
        assert_eq!(prior[1], vec!["manuscript_review:whole".to_string()]);
        assert_eq!(prior[2], vec!["manuscript_review:whole".to_string()]);
    }

    #[tokio::test]
    async fn test_swarm_behaves_like_parallel_with_own_label() {
        let generator = Arc::new(ScriptedGenerator::default());
        let executor = ActionExecutor::new(generator);
        let action = Action::new("build_world", 2)
            .unwrap()
            .with_mode(ExecutionMode::Swarm)
            .with_fan_out(FanOut::Fixed(vec!["geography".into(), "history".into()]));

        let outcome = executor
            .execute(&action, context(WorldState::new()))
            .await
            .unwrap();
        assert_eq!(outcome.strategy, "swarm");
        assert_eq!(outcome.outputs.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let executor = ActionExecutor::new(Arc::new(SlowGenerator));
        let action = Action::new("generate_title", 1)
            .unwrap()
            .with_timeout(Duration::from_millis(10));

        let err = executor
            .execute(&action, context(WorldState::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Transient(_)));
    }

    #[tokio::test]
    async fn test_blank_output_is_content_error() {
        struct Blank;

        #[async_trait]
        impl ContentGenerator for Blank {
            async fn generate(&self, _request: &GenerationRequest) -> ExecResult<String> {
                Ok("   ".to_string())
            }
        }

        let executor = ActionExecutor::new(Arc::new(Blank));
        let action = Action::new("generate_title", 1).unwrap();
        let err = executor
            .execute(&action, context(WorldState::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Content(_)));
    }

    #[tokio::test]
    async fn test_action_override_beats_mode_strategy() {
        struct Canned;

        #[async_trait]
        impl ExecutionStrategy for Canned {
            fn label(&self) -> &str {
                "canned"
            }

            async fn run(
                &self,
                action: &Action,
                _ctx: &ExecutionContext,
            ) -> ExecResult<ExecutionOutcome> {
                Ok(outcome(action, self.label(), Vec::new(), 0))
            }
        }

        let generator = Arc::new(ScriptedGenerator::default());
        let mut executor = ActionExecutor::new(generator.clone());
        executor.register_action("generate_title", Arc::new(Canned));

        let title = Action::new("generate_title", 1).unwrap();
        let style = Action::new("define_style", 1).unwrap();

        let outcome = executor
            .execute(&title, context(WorldState::new()))
            .await
            .unwrap();
        assert_eq!(outcome.strategy, "canned");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        let outcome = executor
            .execute(&style, context(WorldState::new()))
            .await
            .unwrap();
        assert_eq!(outcome.strategy, "single");
    }
}

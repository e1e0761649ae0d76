//! # Action Module
//!
//! An [`Action`] is one named unit of content-generation work: it has a
//! cost, preconditions that must hold in the current [`WorldState`], effects
//! that are written to the state once the work succeeds, an
//! [`ExecutionMode`] describing how the underlying generation calls fan out,
//! and an opaque [`PromptTemplate`] handed to the content generator.
//!
//! ## Basic Usage
//!
//! ```
//! use novel_goap::{Action, WorldState};
//! use novel_goap::action::{apply_effects, matches_preconditions};
//!
//! let mut outline = Action::new("generate_outline", 2).unwrap();
//! outline.preconditions.require("has_title", true);
//! outline.effects.set("has_outline", true);
//! outline.effects.set("chapters_count", 5);
//!
//! let mut state = WorldState::new();
//! state.set("has_title", true);
//!
//! assert!(matches_preconditions(&state, &outline));
//! let next = apply_effects(&state, &outline).unwrap();
//! assert_eq!(next.get_number("chapters_count"), Some(5));
//! // the input state is left untouched
//! assert_eq!(state.get_number("chapters_count"), None);
//! ```
//!
//! ## Preconditions
//!
//! A precondition is a `(key, Condition)` pair. [`Condition::Equals`] is the
//! default and compares booleans, numbers and text by exact equality. The
//! numeric comparisons ([`Condition::AtLeast`], [`Condition::LessThanFact`],
//! [`Condition::EqualsFact`]) exist for chapter bookkeeping and are opted into
//! explicitly per key; a missing key never satisfies any condition.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GoapError, Result};
use crate::world_state::{Fact, WorldState};

/// How an action's generation calls are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    /// One call, one output.
    Single,
    /// One call per fan-out unit, issued concurrently.
    Parallel,
    /// The action's prelude calls in order, then a parallel fan-out.
    Hybrid,
    /// Reserved for multi-agent fan-out. Runs like `Parallel` for now.
    Swarm,
}

impl ExecutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Single => "SINGLE",
            ExecutionMode::Parallel => "PARALLEL",
            ExecutionMode::Hybrid => "HYBRID",
            ExecutionMode::Swarm => "SWARM",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque reference to a prompt template. The planner never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkUnit {
    /// The action as a whole (single calls and hybrid preludes).
    Whole,
    /// A named slot such as a character role.
    Named(String),
    /// A 1-based chapter number.
    Chapter(u32),
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Whole => f.write_str("whole"),
            WorkUnit::Named(name) => write!(f, "{}", name),
            WorkUnit::Chapter(n) => write!(f, "chapter-{}", n),
        }
    }
}

/// Which units a fan-out covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOut {
    One,
    Fixed(Vec<String>),
    /// Chapters `chapters_completed + 1 ..= chapters_count`.
    PendingChapters,
    /// Chapters `1 ..= chapters_count`.
    AllChapters,
}

impl FanOut {
    /// Expands the fan-out against a state. Missing counters count as zero.
    pub fn units(&self, state: &WorldState) -> Vec<WorkUnit> {
        use crate::world_state::keys;

        let count = state.get_number(keys::CHAPTERS_COUNT).unwrap_or(0).max(0);
        let completed = state
            .get_number(keys::CHAPTERS_COMPLETED)
            .unwrap_or(0)
            .max(0);
        let chapters = |from: i64| {
            (from..=count)
                .filter_map(|n| u32::try_from(n).ok())
                .map(WorkUnit::Chapter)
                .collect()
        };

        match self {
            FanOut::One => vec![WorkUnit::Whole],
            FanOut::Fixed(names) => names.iter().cloned().map(WorkUnit::Named).collect(),
            FanOut::PendingChapters => chapters(completed + 1),
            FanOut::AllChapters => chapters(1),
        }
    }
}

/// A requirement on a single fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The fact equals the value exactly.
    Equals(Fact),
    /// The fact is a number greater than or equal to the bound.
    AtLeast(i64),
    /// The fact is a number strictly lower than the named numeric fact.
    LessThanFact(String),
    /// The fact equals the named fact.
    EqualsFact(String),
}

impl Condition {
    pub fn holds(&self, key: &str, state: &WorldState) -> bool {
        let Some(value) = state.get(key) else {
            return false;
        };
        match self {
            Condition::Equals(expected) => value == expected,
            Condition::AtLeast(bound) => value.as_number().is_some_and(|n| n >= *bound),
            Condition::LessThanFact(other) => {
                match (value.as_number(), state.get_number(other)) {
                    (Some(a), Some(b)) => a < b,
                    _ => false,
                }
            }
            Condition::EqualsFact(other) => state.get(other) == Some(value),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(v) => write!(f, "= {}", v),
            Condition::AtLeast(n) => write!(f, ">= {}", n),
            Condition::LessThanFact(k) => write!(f, "< {}", k),
            Condition::EqualsFact(k) => write!(f, "= {}", k),
        }
    }
}

/// A write to a single fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Overwrite the fact.
    Set(Fact),
    /// Add to a numeric fact. Not idempotent.
    Increment(i64),
    /// Copy the value another fact had before the effects were applied.
    CopyFrom(String),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Set(v) => write!(f, ":= {}", v),
            Effect::Increment(n) => write!(f, "+= {}", n),
            Effect::CopyFrom(k) => write!(f, ":= {}", k),
        }
    }
}

/// Ordered set of preconditions, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    entries: Vec<(String, Condition)>,
}

impl Preconditions {
    /// Requires `key` to equal `value` exactly.
    pub fn require(&mut self, key: impl Into<String>, value: impl Into<Fact>) {
        self.require_condition(key, Condition::Equals(value.into()));
    }

    pub fn require_condition(&mut self, key: impl Into<String>, condition: Condition) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = condition,
            None => self.entries.push((key, condition)),
        }
    }

    pub fn is_satisfied_by(&self, state: &WorldState) -> bool {
        self.entries
            .iter()
            .all(|(key, condition)| condition.holds(key, state))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Condition)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Ordered set of effects, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    entries: Vec<(String, Effect)>,
}

impl Effects {
    /// Overwrites `key` with `value` on success.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Fact>) {
        self.insert(key, Effect::Set(value.into()));
    }

    pub fn increment(&mut self, key: impl Into<String>, by: i64) {
        self.insert(key, Effect::Increment(by));
    }

    pub fn copy_from(&mut self, key: impl Into<String>, source: impl Into<String>) {
        self.insert(key, Effect::CopyFrom(source.into()));
    }

    pub fn insert(&mut self, key: impl Into<String>, effect: Effect) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = effect,
            None => self.entries.push((key, effect)),
        }
    }

    /// Applies every effect against `state`, returning the new state.
    ///
    /// All reads see the state as it was before any effect was written, so
    /// the order of entries does not matter.
    pub fn apply_to(&self, state: &WorldState) -> Result<WorldState> {
        let mut next = state.clone();
        for (key, effect) in &self.entries {
            let value = match effect {
                Effect::Set(value) => value.clone(),
                Effect::Increment(by) => {
                    let current = state.get_number(key).ok_or_else(|| GoapError::EffectFailed {
                        key: key.clone(),
                        reason: "increment needs an existing numeric fact".to_string(),
                    })?;
                    Fact::Number(current + by)
                }
                Effect::CopyFrom(source) => {
                    state
                        .get(source)
                        .cloned()
                        .ok_or_else(|| GoapError::EffectFailed {
                            key: key.clone(),
                            reason: format!("source fact {} is missing", source),
                        })?
                }
            };
            next.set(key.clone(), value);
        }
        Ok(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Effect)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Represents one cataloged unit of work.
///
/// Two actions with identical preconditions and effects are still distinct
/// as long as their names differ; which one runs is decided by cost and then
/// catalog order.
///
/// # Examples
///
/// ```
/// use novel_goap::{Action, ExecutionMode, WorldState};
/// use novel_goap::action::{FanOut, PromptTemplate};
///
/// let mut draft = Action::new("draft_chapters", 5)
///     .unwrap()
///     .with_label("Draft chapters")
///     .with_mode(ExecutionMode::Parallel)
///     .with_template(PromptTemplate::new("chapter_draft"))
///     .with_fan_out(FanOut::PendingChapters);
/// draft.preconditions.require("has_outline", true);
/// draft.effects.copy_from("chapters_completed", "chapters_count");
///
/// assert_eq!(draft.execution_mode, ExecutionMode::Parallel);
/// assert_eq!(draft.prompt_template.id(), "chapter_draft");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Unique key within a catalog
    pub name: String,
    /// Human readable name, used as the log actor
    pub label: String,
    pub description: String,
    /// Lower cost wins when several actions apply
    pub cost: u32,
    pub preconditions: Preconditions,
    pub effects: Effects,
    pub execution_mode: ExecutionMode,
    pub prompt_template: PromptTemplate,
    pub fan_out: FanOut,
    /// Sequential calls a `Hybrid` action makes before its fan-out
    pub prelude: Vec<PromptTemplate>,
    /// Per-call timeout overriding the generator default
    pub timeout: Option<Duration>,
}

impl Action {
    /// Creates a new `Single` action with the given name and cost.
    ///
    /// The label and template default to the name.
    ///
    /// # Errors
    ///
    /// Returns [`GoapError::InvalidAction`] if the name is blank or the cost
    /// is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use novel_goap::Action;
    ///
    /// let action = Action::new("generate_title", 1).unwrap();
    /// assert_eq!(action.label, "generate_title");
    ///
    /// assert!(Action::new("free_lunch", 0).is_err());
    /// ```
    pub fn new(name: impl Into<String>, cost: u32) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GoapError::InvalidAction {
                name,
                reason: "name must not be empty".to_string(),
            });
        }
        if cost == 0 {
            return Err(GoapError::InvalidAction {
                name,
                reason: "cost must be positive".to_string(),
            });
        }

        Ok(Self {
            label: name.clone(),
            description: String::new(),
            prompt_template: PromptTemplate::new(name.clone()),
            name,
            cost,
            preconditions: Preconditions::default(),
            effects: Effects::default(),
            execution_mode: ExecutionMode::Single,
            fan_out: FanOut::One,
            prelude: Vec::new(),
            timeout: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_prelude(mut self, prelude: Vec<PromptTemplate>) -> Self {
        self.prelude = prelude;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Checks if this action can run in the given state.
    pub fn can_perform(&self, state: &WorldState) -> bool {
        self.preconditions.is_satisfied_by(state)
    }

    /// Returns the state produced by this action's effects. `state` is not
    /// modified.
    pub fn apply_effects(&self, state: &WorldState) -> Result<WorldState> {
        self.effects.apply_to(state)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cost {}, {})", self.name, self.cost, self.execution_mode)
    }
}

/// True iff every precondition of `action` holds in `state`. Empty
/// preconditions always match.
pub fn matches_preconditions(state: &WorldState, action: &Action) -> bool {
    action.can_perform(state)
}

/// Returns a new state with `action`'s effects applied; unspecified keys are
/// carried over unchanged.
pub fn apply_effects(state: &WorldState, action: &Action) -> Result<WorldState> {
    action.apply_effects(state)
}

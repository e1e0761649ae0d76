//! # novel-goap
//!
//! A Goal-Oriented Action Planning engine that decides which
//! content-generation step of a novel project runs next.
//!
//! The pieces, leaf first:
//!
//! - [`WorldState`]: the flat record of facts about a project
//! - [`Action`] and [`Catalog`]: what can be done, when, and at what cost
//! - [`ActionExecutor`]: runs one action through a [`ContentGenerator`]
//! - [`Planner`]: the per-run state machine and greedy step algorithm
//! - [`RunController`]: owns runs, persistence, logs and the step budget
//!
//! ```
//! use novel_goap::{Catalog, WorldState};
//!
//! let catalog = Catalog::standard();
//! let next = catalog.select(&WorldState::for_new_project()).unwrap();
//! assert_eq!(next.name, "generate_title");
//! ```

pub mod action;
pub mod catalog;
pub mod collaborator;
pub mod config;
pub mod controller;
mod error;
pub mod executor;
pub mod log_entry;
pub mod planner;
pub mod preview;
pub mod store;
pub mod visualizer;
pub mod world_state;

pub use action::{Action, ExecutionMode};
pub use catalog::Catalog;
pub use collaborator::{
    ContentGenerator, GenerationRequest, ProjectContext, ProjectContextProvider, ProjectId,
    ProjectStore, StaticContextProvider,
};
pub use config::{GenerationOptions, PlannerConfig, RetryPolicy};
pub use controller::{RunController, RunHandle, RunId, StepReport, StopReason};
pub use error::{ExecutionError, GoapError, Result};
pub use executor::{ActionExecutor, ExecutionOutcome, ExecutionStrategy};
pub use log_entry::{LogEntry, LogHub, LogLevel, LogSink};
pub use planner::{GoalPredicate, NoopSink, Planner, RunStatus, StateSink, StepOutcome};
pub use store::{JsonFileStore, MemoryStore};
pub use visualizer::CatalogVisualizer;
pub use world_state::{Fact, WorldState};

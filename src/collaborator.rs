//! Interfaces to the systems the planner drives but does not implement:
//! the content generator, the project store and the project context
//! provider.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::{PromptTemplate, WorkUnit};
use crate::error::{ExecutionError, Result};
use crate::executor::ExecutionOutcome;
use crate::world_state::WorldState;

/// Identifier of a novel project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub number: u32,
    pub title: String,
    pub summary: String,
}

/// Read-only snapshot of everything an action may need: chapters,
/// characters, style, and the world state the step started from.
///
/// Taken once per step, before dispatch, so edits made while the step runs
/// do not leak into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: Option<ProjectId>,
    pub title: Option<String>,
    pub style: Option<String>,
    pub characters: Vec<String>,
    pub chapters: Vec<ChapterSummary>,
    pub world_state: WorldState,
}

impl ProjectContext {
    pub fn new(project_id: ProjectId, world_state: WorldState) -> Self {
        Self {
            project_id: Some(project_id),
            world_state,
            ..Self::default()
        }
    }
}

/// One call to the content generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Name of the action issuing the call
    pub action: String,
    pub template: PromptTemplate,
    pub unit: WorkUnit,
    pub context: Arc<ProjectContext>,
    /// Outputs of earlier calls in the same action (hybrid preludes)
    pub prior_outputs: Vec<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

/// Produces text for a prompt template. Implementations classify their own
/// failures into transient, content and fatal errors.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<String, ExecutionError>;
}

/// Durable storage for world-state snapshots and generated content.
///
/// A failed save must surface as an error: the run does not advance past a
/// step whose state could not be stored.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn save_world_state(&self, project: &ProjectId, state: &WorldState) -> Result<()>;

    /// Returns `None` for a project that has never been saved.
    async fn load_world_state(&self, project: &ProjectId) -> Result<Option<WorldState>>;

    async fn save_content(&self, project: &ProjectId, outcome: &ExecutionOutcome) -> Result<()>;
}

/// Assembles the [`ProjectContext`] for a step.
#[async_trait]
pub trait ProjectContextProvider: Send + Sync {
    async fn snapshot(&self, project: &ProjectId, state: &WorldState) -> Result<ProjectContext>;
}

/// Context provider that serves a fixed template, stamped with the project id
/// and current world state.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    template: ProjectContext,
}

impl StaticContextProvider {
    pub fn new(template: ProjectContext) -> Self {
        Self { template }
    }
}

#[async_trait]
impl ProjectContextProvider for StaticContextProvider {
    async fn snapshot(&self, project: &ProjectId, state: &WorldState) -> Result<ProjectContext> {
        let mut context = self.template.clone();
        context.project_id = Some(project.clone());
        context.world_state = state.clone();
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_stamps_project_and_state() {
        let provider = StaticContextProvider::new(ProjectContext {
            title: Some("Salt and Iron".to_string()),
            characters: vec!["Mara".to_string()],
            ..ProjectContext::default()
        });
        let mut state = WorldState::new();
        state.set("has_title", true);

        let context = provider
            .snapshot(&ProjectId::new("p-1"), &state)
            .await
            .unwrap();
        assert_eq!(context.project_id, Some(ProjectId::new("p-1")));
        assert_eq!(context.title.as_deref(), Some("Salt and Iron"));
        assert_eq!(context.world_state, state);
    }
}

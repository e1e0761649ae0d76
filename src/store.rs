//! Project stores: where world-state snapshots and generated content go.
//!
//! [`MemoryStore`] keeps everything in process and is what tests use.
//! [`JsonFileStore`] writes one directory per project:
//!
//! ```text
//! <root>/<project>/world_state.json
//! <root>/<project>/content/<action>/<template>--<unit>.json
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into
//! place, so a crash never leaves a half-written snapshot behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborator::{ProjectId, ProjectStore};
use crate::error::{GoapError, Result};
use crate::executor::ExecutionOutcome;
use crate::world_state::WorldState;

const WORLD_STATE_FILE: &str = "world_state.json";
const CONTENT_DIR: &str = "content";

/// A stored piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub action: String,
    pub template: String,
    pub unit: String,
    pub text: String,
}

fn flatten(outcome: &ExecutionOutcome) -> Vec<StoredContent> {
    outcome
        .outputs
        .iter()
        .map(|output| StoredContent {
            action: outcome.action.clone(),
            template: output.template.id().to_string(),
            unit: output.unit.to_string(),
            text: output.text.clone(),
        })
        .collect()
}

/// In-process store. Later saves for the same unit overwrite earlier ones.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<ProjectId, WorldState>>,
    content: Mutex<HashMap<ProjectId, Vec<StoredContent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a project's state, as if it had been saved earlier.
    pub fn with_state(self, project: ProjectId, state: WorldState) -> Self {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project, state);
        self
    }

    pub fn content(&self, project: &ProjectId) -> Vec<StoredContent> {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn save_world_state(&self, project: &ProjectId, state: &WorldState) -> Result<()> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project.clone(), state.clone());
        Ok(())
    }

    async fn load_world_state(&self, project: &ProjectId) -> Result<Option<WorldState>> {
        Ok(self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project)
            .cloned())
    }

    async fn save_content(&self, project: &ProjectId, outcome: &ExecutionOutcome) -> Result<()> {
        let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = content.entry(project.clone()).or_default();
        for item in flatten(outcome) {
            stored.retain(|s| {
                !(s.action == item.action && s.template == item.template && s.unit == item.unit)
            });
            stored.push(item);
        }
        Ok(())
    }
}

/// Store backed by JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &ProjectId) -> Result<PathBuf> {
        Ok(self.root.join(path_segment(project.as_str())?))
    }

    /// Loads every content file saved for a project.
    pub async fn load_content(&self, project: &ProjectId) -> Result<Vec<StoredContent>> {
        let content_dir = self.project_dir(project)?.join(CONTENT_DIR);
        if !tokio::fs::try_exists(&content_dir).await? {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        let mut actions = tokio::fs::read_dir(&content_dir).await?;
        while let Some(action_dir) = actions.next_entry().await? {
            if !action_dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(action_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let raw = tokio::fs::read(&path).await?;
                items.push(serde_json::from_slice::<StoredContent>(&raw)?);
            }
        }
        items.sort_by(|a, b| {
            (&a.action, &a.template, &a.unit).cmp(&(&b.action, &b.template, &b.unit))
        });
        Ok(items)
    }
}

/// Rejects ids that would escape the store root or are not portable file
/// names.
fn path_segment(raw: &str) -> Result<String> {
    let valid = !raw.is_empty()
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(raw.to_string())
    } else {
        Err(GoapError::Persistence(format!(
            "{:?} is not a valid path segment",
            raw
        )))
    }
}

/// Unit labels may contain characters that do not belong in a file name.
/// A label that had to be rewritten gets a short hash of the original, so
/// two labels never share a file.
fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned == raw {
        return cleaned;
    }
    let digest = Sha256::digest(raw.as_bytes());
    format!("{}-{}", cleaned, hex::encode(&digest[..4]))
}

async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn save_world_state(&self, project: &ProjectId, state: &WorldState) -> Result<()> {
        let path = self.project_dir(project)?.join(WORLD_STATE_FILE);
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&path, bytes).await.map_err(|err| {
            GoapError::Persistence(format!("saving {}: {}", path.display(), err))
        })
    }

    async fn load_world_state(&self, project: &ProjectId) -> Result<Option<WorldState>> {
        let path = self.project_dir(project)?.join(WORLD_STATE_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save_content(&self, project: &ProjectId, outcome: &ExecutionOutcome) -> Result<()> {
        let action_dir = self
            .project_dir(project)?
            .join(CONTENT_DIR)
            .join(sanitize(&outcome.action));
        for item in flatten(outcome) {
            let file = format!("{}--{}.json", sanitize(&item.template), sanitize(&item.unit));
            let path = action_dir.join(file);
            let bytes = serde_json::to_vec_pretty(&item)?;
            write_atomic(&path, bytes).await.map_err(|err| {
                GoapError::Persistence(format!("saving {}: {}", path.display(), err))
            })?;
        }
        log::debug!(
            "stored {} output(s) of {} for {}",
            outcome.outputs.len(),
            outcome.action,
            project
        );
        Ok(())
    }
}

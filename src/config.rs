//! Planner configuration, optionally loaded from a TOML file.
//!
//! ```toml
//! max_steps = 50
//! tick_interval_ms = 0
//!
//! [retry]
//! max_retries = 3
//! initial_backoff_ms = 500
//! max_backoff_ms = 8000
//!
//! [generation]
//! model = "story-large"
//! temperature = 0.8
//! timeout_secs = 120
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GoapError, Result};

/// Retry behaviour for transient executor failures.
///
/// `max_retries` counts retries after the first attempt, so a step makes at
/// most `max_retries + 1` attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_retries` times without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-based), doubling each time and
    /// capped at `max_backoff_ms`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use novel_goap::RetryPolicy;
    ///
    /// let policy = RetryPolicy { max_retries: 5, initial_backoff_ms: 100, max_backoff_ms: 350 };
    /// assert_eq!(policy.backoff(0), Duration::from_millis(100));
    /// assert_eq!(policy.backoff(1), Duration::from_millis(200));
    /// assert_eq!(policy.backoff(2), Duration::from_millis(350));
    /// ```
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Defaults passed to the content generator with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Provider model; `None` lets the generator choose.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Per-call timeout. Actions may override it.
    pub timeout_secs: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            timeout_secs: 120,
        }
    }
}

impl GenerationOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top level configuration for planners and the run controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Executed steps allowed per run before it is stopped.
    pub max_steps: u32,
    /// Pause between automatic steps in `run_until_settled`.
    pub tick_interval_ms: u64,
    pub retry: RetryPolicy,
    pub generation: GenerationOptions,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            tick_interval_ms: 0,
            retry: RetryPolicy::default(),
            generation: GenerationOptions::default(),
        }
    }
}

impl PlannerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(GoapError::Config("max_steps must be > 0".to_string()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(GoapError::Config(
                "generation.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(GoapError::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GoapError::Config(
                    "generation.temperature must be within 0.0..=2.0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parses and validates a TOML document. Missing fields take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: PlannerConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlannerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlannerConfig> {
    if !path.exists() {
        return Ok(PlannerConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    PlannerConfig::from_toml_str(&contents)
}

/// Write config to disk atomically (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlannerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg)?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, buf)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_default() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = load_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, PlannerConfig::default());
    }

    #[test]
    fn test_write_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("planner.toml");
        let mut cfg = PlannerConfig::default();
        cfg.max_steps = 7;
        cfg.generation.model = Some("story-large".to_string());
        write_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg = PlannerConfig::from_toml_str("max_steps = 9\n[retry]\nmax_retries = 1\n").unwrap();
        assert_eq!(cfg.max_steps, 9);
        assert_eq!(cfg.retry.max_retries, 1);
        assert_eq!(cfg.retry.max_backoff_ms, RetryPolicy::default().max_backoff_ms);
        assert_eq!(cfg.generation, GenerationOptions::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            PlannerConfig::from_toml_str("max_steps = 0"),
            Err(GoapError::Config(_))
        ));
        assert!(matches!(
            PlannerConfig::from_toml_str("[generation]\ntemperature = 3.5"),
            Err(GoapError::Config(_))
        ));
        assert!(matches!(
            PlannerConfig::from_toml_str("max_steps = \"many\""),
            Err(GoapError::TomlParse(_))
        ));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy {
            max_retries: 100,
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff(70), Duration::from_millis(1_000));
        assert_eq!(RetryPolicy::immediate(3).backoff(2), Duration::ZERO);
    }
}

//! World state representation for the novel planning engine.
//!
//! This module provides the [`WorldState`] structure, a flat record of named
//! facts describing how far a project has progressed:
//! - whether a title, style, cast, setting and outline exist
//! - how many chapters the outline calls for and how many are drafted
//! - whether the manuscript has been revised and published
//!
//! Facts are typed ([`Fact`]) so that numeric conditions such as
//! "fewer chapters completed than planned" can be evaluated without parsing
//! strings.
//!
//! # Example
//!
//! ```
//! use novel_goap::world_state::{keys, Fact, WorldState};
//!
//! let mut state = WorldState::for_new_project();
//! assert_eq!(state.get_bool(keys::HAS_TITLE), Some(false));
//!
//! state.set(keys::HAS_TITLE, true);
//! state.set(keys::CHAPTERS_COUNT, 12);
//!
//! assert_eq!(state.get(keys::CHAPTERS_COUNT), Some(&Fact::Number(12)));
//! assert!(state.check_invariants().is_ok());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GoapError, Result};

/// Well-known fact names used by the standard catalog.
pub mod keys {
    pub const HAS_TITLE: &str = "has_title";
    pub const STYLE_DEFINED: &str = "style_defined";
    pub const HAS_CHARACTERS: &str = "has_characters";
    pub const HAS_WORLD: &str = "has_world";
    pub const HAS_OUTLINE: &str = "has_outline";
    pub const CHAPTERS_COUNT: &str = "chapters_count";
    pub const CHAPTERS_COMPLETED: &str = "chapters_completed";
    pub const IS_REVISED: &str = "is_revised";
    pub const IS_PUBLISHED: &str = "is_published";
}

/// A single typed value in a [`WorldState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fact {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl Fact {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Fact::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Fact::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Fact::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Fact {
    fn from(value: bool) -> Self {
        Fact::Bool(value)
    }
}

impl From<i64> for Fact {
    fn from(value: i64) -> Self {
        Fact::Number(value)
    }
}

impl From<i32> for Fact {
    fn from(value: i32) -> Self {
        Fact::Number(i64::from(value))
    }
}

impl From<u32> for Fact {
    fn from(value: u32) -> Self {
        Fact::Number(i64::from(value))
    }
}

impl From<&str> for Fact {
    fn from(value: &str) -> Self {
        Fact::Text(value.to_string())
    }
}

impl From<String> for Fact {
    fn from(value: String) -> Self {
        Fact::Text(value)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Bool(b) => write!(f, "{}", b),
            Fact::Number(n) => write!(f, "{}", n),
            Fact::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// `WorldState` is the per-project record of progress facts.
///
/// Keys are kept ordered so that snapshots, log lines and DOT exports are
/// stable from one run to the next. The planner treats a `WorldState` as a
/// value: applying an action's effects produces a new state, the previous
/// one is left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    facts: BTreeMap<String, Fact>,
}

impl WorldState {
    /// Creates an empty WorldState with no facts at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use novel_goap::WorldState;
    ///
    /// let state = WorldState::new();
    /// assert!(state.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            facts: BTreeMap::new(),
        }
    }

    /// Creates the state a freshly created project starts from: every
    /// boolean fact false, every counter zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use novel_goap::world_state::{keys, WorldState};
    ///
    /// let state = WorldState::for_new_project();
    /// assert_eq!(state.get_bool(keys::HAS_OUTLINE), Some(false));
    /// assert_eq!(state.get_number(keys::CHAPTERS_COMPLETED), Some(0));
    /// ```
    pub fn for_new_project() -> Self {
        let mut state = Self::new();
        for key in [
            keys::HAS_TITLE,
            keys::STYLE_DEFINED,
            keys::HAS_CHARACTERS,
            keys::HAS_WORLD,
            keys::HAS_OUTLINE,
            keys::IS_REVISED,
            keys::IS_PUBLISHED,
        ] {
            state.set(key, false);
        }
        state.set(keys::CHAPTERS_COUNT, 0);
        state.set(keys::CHAPTERS_COMPLETED, 0);
        state
    }

    /// Builds a state from `(key, fact)` pairs.
    pub fn from_facts<K, F, I>(facts: I) -> Self
    where
        K: Into<String>,
        F: Into<Fact>,
        I: IntoIterator<Item = (K, F)>,
    {
        Self {
            facts: facts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a fact, replacing any previous value under the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Fact>) {
        self.facts.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Fact> {
        self.facts.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Fact::as_bool)
    }

    pub fn get_number(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Fact::as_number)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.facts.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Fact)> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Checks the invariants every reachable state must hold.
    ///
    /// Currently: `chapters_completed` never exceeds `chapters_count`, and
    /// neither counter is negative. States that carry neither counter pass.
    ///
    /// # Errors
    ///
    /// Returns [`GoapError::InvariantViolation`] describing the first broken
    /// invariant.
    ///
    /// # Examples
    ///
    /// ```
    /// use novel_goap::world_state::{keys, WorldState};
    ///
    /// let mut state = WorldState::for_new_project();
    /// state.set(keys::CHAPTERS_COUNT, 3);
    /// state.set(keys::CHAPTERS_COMPLETED, 4);
    /// assert!(state.check_invariants().is_err());
    /// ```
    pub fn check_invariants(&self) -> Result<()> {
        let count = self.get_number(keys::CHAPTERS_COUNT);
        let completed = self.get_number(keys::CHAPTERS_COMPLETED);

        for (key, value) in [
            (keys::CHAPTERS_COUNT, count),
            (keys::CHAPTERS_COMPLETED, completed),
        ] {
            if let Some(n) = value {
                if n < 0 {
                    return Err(GoapError::InvariantViolation(format!(
                        "{} is negative ({})",
                        key, n
                    )));
                }
            }
        }

        if let Some(completed) = completed {
            let count = count.unwrap_or(0);
            if completed > count {
                return Err(GoapError::InvariantViolation(format!(
                    "{} ({}) exceeds {} ({})",
                    keys::CHAPTERS_COMPLETED,
                    completed,
                    keys::CHAPTERS_COUNT,
                    count
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.facts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = WorldState::new();
        assert!(state.is_empty());
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_new_project_defaults() {
        let state = WorldState::for_new_project();
        assert_eq!(state.get_bool(keys::HAS_TITLE), Some(false));
        assert_eq!(state.get_bool(keys::IS_PUBLISHED), Some(false));
        assert_eq!(state.get_number(keys::CHAPTERS_COUNT), Some(0));
        assert_eq!(state.get_number(keys::CHAPTERS_COMPLETED), Some(0));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_set_and_get() {
        let mut state = WorldState::new();
        state.set("has_title", true);
        assert_eq!(state.get("has_title"), Some(&Fact::Bool(true)));
        state.set("has_title", false);
        assert_eq!(state.get_bool("has_title"), Some(false));
        state.set("genre", "noir");
        assert_eq!(state.get("genre").and_then(Fact::as_text), Some("noir"));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn test_typed_accessors_do_not_coerce() {
        let mut state = WorldState::new();
        state.set("chapters_count", 3);
        assert_eq!(state.get_bool("chapters_count"), None);
        assert_eq!(state.get_number("chapters_count"), Some(3));
    }

    #[test]
    fn test_invariant_completed_exceeds_count() {
        let state = WorldState::from_facts([
            (keys::CHAPTERS_COUNT, 2),
            (keys::CHAPTERS_COMPLETED, 3),
        ]);
        assert!(matches!(
            state.check_invariants(),
            Err(GoapError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_invariant_negative_counter() {
        let state = WorldState::from_facts([(keys::CHAPTERS_COUNT, -1)]);
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn test_display_is_ordered() {
        let state = WorldState::from_facts([("b", Fact::Bool(true)), ("a", Fact::Number(2))]);
        assert_eq!(format!("{}", state), "{a: 2, b: true}");
    }

    #[test]
    fn test_json_snapshot_shape() {
        let mut state = WorldState::new();
        state.set("has_title", true);
        state.set("chapters_count", 5);
        state.set("title", "The Long Night");
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(
            json,
            r#"{"chapters_count":5,"has_title":true,"title":"The Long Night"}"#
        );
        let back: WorldState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}

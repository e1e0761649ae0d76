//! The action catalog: a fixed, ordered collection of actions shared
//! read-only by every run.
//!
//! Declaration order matters. When several applicable actions share the
//! lowest cost, the one declared first is selected, which keeps two runs with
//! the same inputs on the same path.

use std::collections::HashSet;

use crate::action::{Action, Condition, ExecutionMode, FanOut, PromptTemplate};
use crate::error::{GoapError, Result};
use crate::world_state::{keys, WorldState};

/// Number of chapters the standard outline plans for.
pub const DEFAULT_CHAPTER_COUNT: u32 = 12;

/// An ordered, validated list of actions.
///
/// # Examples
///
/// ```
/// use novel_goap::{Action, Catalog, WorldState};
///
/// let mut set_title = Action::new("set_title", 1).unwrap();
/// set_title.effects.set("has_title", true);
///
/// let mut outline = Action::new("generate_outline", 2).unwrap();
/// outline.preconditions.require("has_title", true);
/// outline.effects.set("has_outline", true);
///
/// let catalog = Catalog::new(vec![set_title, outline]).unwrap();
///
/// let state = WorldState::from_facts([("has_title", false)]);
/// assert_eq!(catalog.select(&state).unwrap().name, "set_title");
/// ```
#[derive(Debug, Clone)]
pub struct Catalog {
    actions: Vec<Action>,
}

impl Catalog {
    /// Builds a catalog, keeping the given declaration order.
    ///
    /// # Errors
    ///
    /// - [`GoapError::DuplicateAction`] if two actions share a name
    /// - [`GoapError::InvalidAction`] if a `Hybrid` action has no prelude
    pub fn new(actions: Vec<Action>) -> Result<Self> {
        let mut seen = HashSet::new();
        for action in &actions {
            if !seen.insert(action.name.as_str()) {
                return Err(GoapError::DuplicateAction(action.name.clone()));
            }
            if action.execution_mode == ExecutionMode::Hybrid && action.prelude.is_empty() {
                return Err(GoapError::InvalidAction {
                    name: action.name.clone(),
                    reason: "hybrid actions need at least one prelude template".to_string(),
                });
            }
        }
        Ok(Self { actions })
    }

    /// The catalog used by novel projects, planning
    /// [`DEFAULT_CHAPTER_COUNT`] chapters.
    pub fn standard() -> Self {
        Self::standard_with_chapters(DEFAULT_CHAPTER_COUNT)
    }

    /// The standard novel catalog with a custom outline length.
    pub fn standard_with_chapters(chapters: u32) -> Self {
        Self {
            actions: standard_actions(chapters),
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions whose preconditions hold in `state`, in declaration order.
    pub fn applicable<'a>(&'a self, state: &WorldState) -> Vec<&'a Action> {
        self.actions
            .iter()
            .filter(|action| action.can_perform(state))
            .collect()
    }

    /// Picks the next action: lowest cost among the applicable ones, ties
    /// going to the earliest declared. `None` means the state is stalled.
    pub fn select(&self, state: &WorldState) -> Option<&Action> {
        select_from(self.applicable(state))
    }
}

/// Selection policy over an already filtered, declaration-ordered list.
pub(crate) fn select_from<'a>(applicable: Vec<&'a Action>) -> Option<&'a Action> {
    let mut best: Option<&Action> = None;
    for action in applicable {
        // strict comparison keeps the first declared on ties
        if best.map_or(true, |b| action.cost < b.cost) {
            best = Some(action);
        }
    }
    best
}

fn standard_actions(chapters: u32) -> Vec<Action> {
    // Every constructor below uses a positive cost and a non-empty name.
    let action = |name: &str, cost: u32| Action {
        name: name.to_string(),
        label: name.to_string(),
        description: String::new(),
        cost,
        preconditions: Default::default(),
        effects: Default::default(),
        execution_mode: ExecutionMode::Single,
        prompt_template: PromptTemplate::new(name),
        fan_out: FanOut::One,
        prelude: Vec::new(),
        timeout: None,
    };

    let mut title = action("generate_title", 1)
        .with_label("Title")
        .with_description("Propose a working title for the novel")
        .with_template(PromptTemplate::new("title"));
    title.preconditions.require(keys::HAS_TITLE, false);
    title.effects.set(keys::HAS_TITLE, true);

    let mut style = action("define_style", 1)
        .with_label("Style")
        .with_description("Settle narrative voice, tense and tone")
        .with_template(PromptTemplate::new("style_guide"));
    style.preconditions.require(keys::STYLE_DEFINED, false);
    style.effects.set(keys::STYLE_DEFINED, true);

    let mut characters = action("create_characters", 2)
        .with_label("Characters")
        .with_description("Write character sheets for the main cast")
        .with_mode(ExecutionMode::Parallel)
        .with_template(PromptTemplate::new("character_sheet"))
        .with_fan_out(FanOut::Fixed(vec![
            "protagonist".to_string(),
            "antagonist".to_string(),
            "supporting_cast".to_string(),
        ]));
    characters.preconditions.require(keys::HAS_TITLE, true);
    characters.preconditions.require(keys::HAS_CHARACTERS, false);
    characters.effects.set(keys::HAS_CHARACTERS, true);

    let mut world = action("build_world", 2)
        .with_label("World")
        .with_description("Describe the setting from several angles")
        .with_mode(ExecutionMode::Swarm)
        .with_template(PromptTemplate::new("world_building"))
        .with_fan_out(FanOut::Fixed(vec![
            "geography".to_string(),
            "history".to_string(),
            "culture".to_string(),
        ]));
    world.preconditions.require(keys::HAS_TITLE, true);
    world.preconditions.require(keys::HAS_WORLD, false);
    world.effects.set(keys::HAS_WORLD, true);

    let mut outline = action("generate_outline", 3)
        .with_label("Outline")
        .with_description("Break the story into chapters")
        .with_template(PromptTemplate::new("outline"));
    outline.preconditions.require(keys::HAS_TITLE, true);
    outline.preconditions.require(keys::HAS_CHARACTERS, true);
    outline.preconditions.require(keys::HAS_WORLD, true);
    outline.preconditions.require(keys::HAS_OUTLINE, false);
    outline.effects.set(keys::HAS_OUTLINE, true);
    outline.effects.set(keys::CHAPTERS_COUNT, chapters);

    let mut draft = action("draft_chapters", 5)
        .with_label("Drafting")
        .with_description("Draft every chapter that is still pending")
        .with_mode(ExecutionMode::Parallel)
        .with_template(PromptTemplate::new("chapter_draft"))
        .with_fan_out(FanOut::PendingChapters);
    draft.preconditions.require(keys::HAS_OUTLINE, true);
    draft.preconditions.require(keys::STYLE_DEFINED, true);
    draft.preconditions.require_condition(
        keys::CHAPTERS_COMPLETED,
        Condition::LessThanFact(keys::CHAPTERS_COUNT.to_string()),
    );
    draft
        .effects
        .copy_from(keys::CHAPTERS_COMPLETED, keys::CHAPTERS_COUNT);

    let mut revise = action("revise_manuscript", 4)
        .with_label("Revision")
        .with_description("Review the whole draft, then revise chapter by chapter")
        .with_mode(ExecutionMode::Hybrid)
        .with_prelude(vec![PromptTemplate::new("manuscript_review")])
        .with_template(PromptTemplate::new("chapter_revision"))
        .with_fan_out(FanOut::AllChapters);
    revise.preconditions.require(keys::HAS_OUTLINE, true);
    revise
        .preconditions
        .require_condition(keys::CHAPTERS_COUNT, Condition::AtLeast(1));
    revise.preconditions.require_condition(
        keys::CHAPTERS_COMPLETED,
        Condition::EqualsFact(keys::CHAPTERS_COUNT.to_string()),
    );
    revise.preconditions.require(keys::IS_REVISED, false);
    revise.effects.set(keys::IS_REVISED, true);

    let mut publish = action("publish_manuscript", 1)
        .with_label("Publishing")
        .with_description("Assemble front matter and hand the manuscript to export")
        .with_template(PromptTemplate::new("front_matter"));
    publish.preconditions.require(keys::IS_REVISED, true);
    publish.preconditions.require(keys::IS_PUBLISHED, false);
    publish.effects.set(keys::IS_PUBLISHED, true);

    vec![
        title, style, characters, world, outline, draft, revise, publish,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_action(name: &str, cost: u32, pre: Vec<(&str, bool)>, eff: Vec<(&str, bool)>) -> Action {
        let mut action = Action::new(name, cost).unwrap();
        for (k, v) in pre {
            action.preconditions.require(k, v);
        }
        for (k, v) in eff {
            action.effects.set(k, v);
        }
        action
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let a = make_action("a", 1, vec![], vec![]);
        let b = make_action("a", 2, vec![], vec![]);
        assert!(matches!(
            Catalog::new(vec![a, b]),
            Err(GoapError::DuplicateAction(name)) if name == "a"
        ));
    }

    #[test]
    fn test_hybrid_without_prelude_rejected() {
        let a = Action::new("a", 1).unwrap().with_mode(ExecutionMode::Hybrid);
        assert!(matches!(
            Catalog::new(vec![a]),
            Err(GoapError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_lower_cost_wins() {
        let expensive = make_action("expensive", 5, vec![], vec![("done", true)]);
        let cheap = make_action("cheap", 1, vec![], vec![("done", true)]);
        let catalog = Catalog::new(vec![expensive, cheap]).unwrap();
        assert_eq!(catalog.select(&WorldState::new()).unwrap().name, "cheap");
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        let first = make_action("first", 2, vec![], vec![("done", true)]);
        let second = make_action("second", 2, vec![], vec![("done", true)]);
        let catalog = Catalog::new(vec![first.clone(), second.clone()]).unwrap();
        assert_eq!(catalog.select(&WorldState::new()).unwrap().name, "first");

        let reversed = Catalog::new(vec![second, first]).unwrap();
        assert_eq!(reversed.select(&WorldState::new()).unwrap().name, "second");
    }

    #[test]
    fn test_no_applicable_action() {
        let a = make_action("a", 1, vec![("ready", true)], vec![("done", true)]);
        let catalog = Catalog::new(vec![a]).unwrap();
        assert!(catalog.applicable(&WorldState::new()).is_empty());
        assert!(catalog.select(&WorldState::new()).is_none());
    }

    #[test]
    fn test_standard_catalog_is_valid() {
        let standard = Catalog::standard();
        let rebuilt = Catalog::new(standard.actions().to_vec()).unwrap();
        assert_eq!(rebuilt.len(), 8);
        assert!(standard.get("draft_chapters").is_some());
        assert!(standard.get("nope").is_none());
    }

    #[test]
    fn test_standard_catalog_walks_to_publication() {
        let catalog = Catalog::standard_with_chapters(3);
        let mut state = WorldState::for_new_project();
        let mut names = Vec::new();

        while let Some(action) = catalog.select(&state) {
            names.push(action.name.clone());
            state = action.apply_effects(&state).unwrap();
            state.check_invariants().unwrap();
            assert!(names.len() <= catalog.len(), "catalog loops: {:?}", names);
        }

        assert_eq!(
            names,
            [
                "generate_title",
                "define_style",
                "create_characters",
                "build_world",
                "generate_outline",
                "draft_chapters",
                "revise_manuscript",
                "publish_manuscript",
            ]
        );
        assert_eq!(state.get_bool(keys::IS_PUBLISHED), Some(true));
        assert_eq!(state.get_number(keys::CHAPTERS_COMPLETED), Some(3));
    }
}

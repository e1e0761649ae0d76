//! Dry runs of the selection policy.
//!
//! [`preview`] walks the catalog the same way the planner would, applying
//! effects instead of executing anything. Useful for checking that a
//! catalog and goal can reach completion before spending generation calls
//! on it.

use std::fmt;

use crate::catalog::{select_from, Catalog};
use crate::error::Result;
use crate::planner::GoalPredicate;
use crate::world_state::WorldState;

/// Why a preview stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEnd {
    GoalReached,
    /// No action applies and the goal does not hold
    Stalled,
    /// The walk came back to a state it had already visited
    Cycle,
    StepLimit,
}

impl fmt::Display for PreviewEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PreviewEnd::GoalReached => "goal reached",
            PreviewEnd::Stalled => "stalled",
            PreviewEnd::Cycle => "cycle",
            PreviewEnd::StepLimit => "step limit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewStep {
    pub action: String,
    pub cost: u32,
    pub state_after: WorldState,
}

/// The sequence of actions a run would take if every action succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub steps: Vec<PreviewStep>,
    pub end: PreviewEnd,
    pub final_state: WorldState,
}

impl Preview {
    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.as_str()).collect()
    }

    pub fn total_cost(&self) -> u32 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    pub fn reaches_goal(&self) -> bool {
        self.end == PreviewEnd::GoalReached
    }
}

/// Simulates up to `max_steps` planner steps from `initial`.
///
/// # Errors
///
/// Returns an error if an action's effects cannot be applied or break a
/// world-state invariant, as the planner would.
///
/// # Examples
///
/// ```
/// use novel_goap::{Catalog, WorldState};
/// use novel_goap::planner::publication_goal;
/// use novel_goap::preview::{preview, PreviewEnd};
///
/// let catalog = Catalog::standard();
/// let result = preview(&catalog, &WorldState::for_new_project(), &publication_goal(), 20).unwrap();
///
/// assert_eq!(result.end, PreviewEnd::GoalReached);
/// assert_eq!(result.action_names().first(), Some(&"generate_title"));
/// assert_eq!(result.action_names().last(), Some(&"publish_manuscript"));
/// ```
pub fn preview(
    catalog: &Catalog,
    initial: &WorldState,
    goal: &dyn GoalPredicate,
    max_steps: u32,
) -> Result<Preview> {
    let mut state = initial.clone();
    let mut visited = vec![state.clone()];
    let mut steps = Vec::new();

    let end = loop {
        if goal.is_satisfied(&state) {
            break PreviewEnd::GoalReached;
        }
        if steps.len() >= max_steps as usize {
            break PreviewEnd::StepLimit;
        }
        let Some(action) = select_from(catalog.applicable(&state)) else {
            break PreviewEnd::Stalled;
        };

        let next = action.apply_effects(&state)?;
        next.check_invariants()?;
        steps.push(PreviewStep {
            action: action.name.clone(),
            cost: action.cost,
            state_after: next.clone(),
        });

        if visited.contains(&next) {
            state = next;
            break PreviewEnd::Cycle;
        }
        visited.push(next.clone());
        state = next;
    };

    log::debug!("preview ended ({}) after {} step(s)", end, steps.len());
    Ok(Preview {
        steps,
        end,
        final_state: state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::planner::publication_goal;
    use crate::world_state::keys;

    #[test]
    fn test_standard_catalog_preview() {
        let catalog = Catalog::standard_with_chapters(3);
        let result = preview(
            &catalog,
            &WorldState::for_new_project(),
            &publication_goal(),
            50,
        )
        .unwrap();

        assert!(result.reaches_goal());
        assert_eq!(result.steps.len(), 8);
        assert_eq!(result.total_cost(), 1 + 1 + 2 + 2 + 3 + 5 + 4 + 1);
        assert_eq!(result.final_state.get_number(keys::CHAPTERS_COMPLETED), Some(3));
    }

    #[test]
    fn test_preview_is_deterministic() {
        let catalog = Catalog::standard();
        let start = WorldState::for_new_project();
        let a = preview(&catalog, &start, &publication_goal(), 50).unwrap();
        let b = preview(&catalog, &start, &publication_goal(), 50).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_preview_stall() {
        let catalog = Catalog::standard();
        let result = preview(&catalog, &WorldState::new(), &publication_goal(), 50).unwrap();
        assert_eq!(result.end, PreviewEnd::Stalled);
        assert!(result.steps.is_empty());
    }

    #[test]
    fn test_preview_detects_cycle() {
        let mut toggle_on = Action::new("on", 1).unwrap();
        toggle_on.preconditions.require("lamp", false);
        toggle_on.effects.set("lamp", true);
        let mut toggle_off = Action::new("off", 1).unwrap();
        toggle_off.preconditions.require("lamp", true);
        toggle_off.effects.set("lamp", false);
        let catalog = Catalog::new(vec![toggle_on, toggle_off]).unwrap();

        let never = |_: &WorldState| false;
        let start = WorldState::from_facts([("lamp", false)]);
        let result = preview(&catalog, &start, &never, 50).unwrap();
        assert_eq!(result.end, PreviewEnd::Cycle);
        assert_eq!(result.action_names(), vec!["on", "off"]);
    }

    #[test]
    fn test_preview_step_limit() {
        let catalog = Catalog::standard();
        let result = preview(
            &catalog,
            &WorldState::for_new_project(),
            &publication_goal(),
            3,
        )
        .unwrap();
        assert_eq!(result.end, PreviewEnd::StepLimit);
        assert_eq!(result.steps.len(), 3);
    }
}

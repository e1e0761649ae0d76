use std::fmt::Write as _;
use std::path::Path;

use crate::action::Action;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::preview::Preview;
use crate::world_state::WorldState;

/// Renders a catalog, and optionally a previewed path through it, as a
/// Graphviz DOT graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogVisualizer;

impl CatalogVisualizer {
    pub fn new() -> Self {
        Self
    }

    /// Builds the DOT source.
    ///
    /// Every action is a node. Actions applicable in `initial` get an edge
    /// from the initial state; actions on the preview path are highlighted
    /// and chained in the order they would run.
    pub fn render(&self, catalog: &Catalog, initial: &WorldState, preview: Option<&Preview>) -> String {
        let mut dot = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(dot, "digraph GOAP {{");
        let _ = writeln!(dot, "    rankdir=LR;");
        let _ = writeln!(dot, "    node [shape=box, style=filled, fillcolor=lightblue];");
        let _ = writeln!(dot, "    edge [fontsize=10];");
        let _ = writeln!(
            dot,
            "    initial [label=\"Initial State\\n{}\", fillcolor=lightgreen];",
            Self::state_to_label(initial)
        );

        for (i, action) in catalog.actions().iter().enumerate() {
            let _ = writeln!(
                dot,
                "    action_{} [label=\"{}\\n{} / cost {}\\nPre: {}\\nEff: {}\"];",
                i,
                escape(&action.label),
                action.execution_mode,
                action.cost,
                Self::preconditions_to_label(action),
                Self::effects_to_label(action)
            );
        }

        for (i, action) in catalog.actions().iter().enumerate() {
            if action.can_perform(initial) {
                let _ = writeln!(dot, "    initial -> action_{} [label=\"applicable\"];", i);
            }
        }

        if let Some(preview) = preview {
            let _ = writeln!(
                dot,
                "    end [label=\"{}\", fillcolor=lightpink];",
                preview.end
            );
            let _ = writeln!(dot, "    edge [color=red, penwidth=2.0];");

            let mut previous = "initial".to_string();
            for (n, step) in preview.steps.iter().enumerate() {
                let Some(idx) = catalog.actions().iter().position(|a| a.name == step.action) else {
                    continue;
                };
                let _ = writeln!(dot, "    action_{} [fillcolor=lightcoral];", idx);
                let _ = writeln!(dot, "    {} -> action_{} [label=\"{}\"];", previous, idx, n + 1);
                previous = format!("action_{}", idx);
            }
            let _ = writeln!(dot, "    {} -> end;", previous);
        }

        let _ = writeln!(dot, "}}");
        dot
    }

    /// Writes the DOT source to `path`.
    pub fn write_dot(
        &self,
        catalog: &Catalog,
        initial: &WorldState,
        preview: Option<&Preview>,
        path: &Path,
    ) -> Result<()> {
        std::fs::write(path, self.render(catalog, initial, preview))?;
        Ok(())
    }

    fn state_to_label(state: &WorldState) -> String {
        state
            .iter()
            .map(|(key, value)| escape(&format!("{}: {}", key, value)))
            .collect::<Vec<_>>()
            .join("\\n")
    }

    fn preconditions_to_label(action: &Action) -> String {
        action
            .preconditions
            .iter()
            .map(|(key, condition)| escape(&format!("{} {}", key, condition)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn effects_to_label(action: &Action) -> String {
        action
            .effects
            .iter()
            .map(|(key, effect)| escape(&format!("{} {}", key, effect)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::publication_goal;
    use crate::preview::preview;

    #[test]
    fn test_render_catalog() {
        let catalog = Catalog::standard();
        let dot = CatalogVisualizer::new().render(&catalog, &WorldState::for_new_project(), None);

        assert!(dot.starts_with("digraph GOAP {"));
        assert!(dot.contains("Drafting\\nPARALLEL / cost 5"));
        assert!(dot.contains("has_title = false"));
        assert!(dot.contains("initial -> action_0 [label=\"applicable\"]"));
        assert!(dot.contains("initial -> action_1 [label=\"applicable\"]"));
        assert!(!dot.contains("initial -> action_2"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_render_preview_path() {
        let catalog = Catalog::standard_with_chapters(2);
        let start = WorldState::for_new_project();
        let trace = preview(&catalog, &start, &publication_goal(), 20).unwrap();
        let dot = CatalogVisualizer::new().render(&catalog, &start, Some(&trace));

        assert!(dot.contains("end [label=\"goal reached\""));
        assert!(dot.contains("initial -> action_0 [label=\"1\"]"));
        assert!(dot.contains("action_6 -> action_7 [label=\"8\"]"));
        assert!(dot.contains("action_7 -> end;"));
    }

    #[test]
    fn test_write_dot_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("catalog.dot");
        CatalogVisualizer::new()
            .write_dot(&Catalog::standard(), &WorldState::new(), None, &path)
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("digraph GOAP"));
        assert!(content.contains("generate_outline") || content.contains("Outline"));
    }
}

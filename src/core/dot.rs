//! RG-013: Graphviz DOT export of a dependency graph.

use super::resolver::DependencyGraph;
use std::fmt::Write;

/// Render the graph as DOT. Edges point from dependent to dependency; nodes
/// sharing a level are ranked together.
pub fn to_dot(graph: &DependencyGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(&graph.project().to_string()));
    out.push_str("  rankdir=BT;\n");
    out.push_str("  node [shape=box, fontname=\"monospace\"];\n");

    for (id, node) in graph.nodes() {
        let name = escape(&id.to_string());
        let label = match node.origin() {
            Some(origin) => format!(
                "{}\\n({}:{})",
                name,
                escape(&origin.template),
                escape(&origin.instance)
            ),
            None => name.clone(),
        };
        let _ = writeln!(out, "  \"{}\" [label=\"{}\"];", name, label);
    }

    for wave in graph.levels().iter().filter(|w| w.len() > 1) {
        let members: Vec<String> = wave
            .iter()
            .map(|id| format!("\"{}\"", escape(&id.to_string())))
            .collect();
        let _ = writeln!(out, "  {{ rank=same; {}; }}", members.join("; "));
    }

    for (from, to) in graph.edges() {
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\";",
            escape(&from.to_string()),
            escape(&to.to_string())
        );
    }

    out.push_str("}\n");
    out
}

/// Escape for a DOT double-quoted string. Backslashes go first.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

//! Textual CFG description in DOT format.
//!
//! Rendering is left to an external Graphviz consumer; the core only emits
//! the graph text.

use crate::cfg::Cfg;
use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::fmt::Write;

/// Export the CFG to DOT, walking blocks breadth-first from `start_label`
/// so the drawing order follows control flow. Blocks unreachable from the
/// start label are appended afterwards in source order.
pub fn to_dot(cfg: &Cfg, start_label: &str) -> String {
    let mut dot = String::from("digraph cfg {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, style=rounded];\n\n");

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    if let Some(node) = cfg.node_of(start_label) {
        queue.push_back(node);
    }
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        order.push(node);
        for succ in cfg.successors(node) {
            queue.push_back(succ);
        }
    }
    for node in cfg.nodes() {
        if visited.insert(node) {
            order.push(node);
        }
    }

    for &node in &order {
        let block = cfg.block(node);
        writeln!(
            dot,
            "  \"{}\" [label=\"{}\\n{} instrs\"];",
            block.label,
            block.label,
            block.instrs.len()
        )
        .ok();
    }

    dot.push('\n');
    for &node in &order {
        for edge in cfg.graph().edges(node) {
            let kind = edge.weight();
            let label_attr = if kind.dot_label().is_empty() {
                String::new()
            } else {
                format!(", label=\"{}\"", kind.dot_label())
            };
            writeln!(
                dot,
                "  \"{}\" -> \"{}\" [color={}{}];",
                cfg.block(node).label,
                cfg.block(edge.target()).label,
                kind.dot_color(),
                label_attr
            )
            .ok();
        }
    }

    dot.push_str("}\n");
    dot
}

//! Natural loop detection and reducibility.

use crate::cfg::{Cfg, Dominators};
use petgraph::algo::is_cyclic_directed;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::{HashSet, VecDeque};

/// A natural loop identified by a back edge.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// Loop header (the single entry point)
    pub header: NodeIndex,
    /// Back edge (tail -> header) that identifies this loop
    pub back_edge: (NodeIndex, NodeIndex),
    /// All nodes in the loop body (including header and tail)
    pub body: HashSet<NodeIndex>,
}

impl NaturalLoop {
    pub fn contains(&self, node: NodeIndex) -> bool {
        self.body.contains(&node)
    }
}

/// All back edges: CFG edges (tail, head) where the head dominates the
/// tail. Edges out of unreachable nodes never qualify.
pub fn back_edges(cfg: &Cfg, doms: &Dominators) -> Vec<(NodeIndex, NodeIndex)> {
    let mut edges: Vec<(NodeIndex, NodeIndex)> = cfg
        .edges()
        .into_iter()
        .filter(|&(tail, head)| doms.dominates(head, tail))
        .collect();
    edges.sort();
    edges
}

/// Detect every natural loop in the CFG.
pub fn natural_loops(cfg: &Cfg, doms: &Dominators) -> Vec<NaturalLoop> {
    back_edges(cfg, doms)
        .into_iter()
        .map(|(tail, head)| NaturalLoop {
            header: head,
            back_edge: (tail, head),
            body: loop_body(cfg, head, tail),
        })
        .collect()
}

/// Compute the loop body for a back edge (tail -> header): the smallest set
/// containing the tail that can reach the tail without passing through the
/// header, plus the header itself.
pub fn loop_body(cfg: &Cfg, header: NodeIndex, tail: NodeIndex) -> HashSet<NodeIndex> {
    let mut body = HashSet::new();
    let mut worklist = VecDeque::new();
    worklist.push_back(tail);

    while let Some(node) = worklist.pop_front() {
        if node == header || body.contains(&node) {
            continue;
        }
        body.insert(node);
        for pred in cfg.predecessors(node) {
            if pred != header && !body.contains(&pred) {
                worklist.push_back(pred);
            }
        }
    }

    body.insert(header);
    body
}

/// A CFG is reducible iff removing all back edges leaves a DAG.
pub fn is_reducible(cfg: &Cfg, doms: &Dominators) -> bool {
    let back: HashSet<(NodeIndex, NodeIndex)> = back_edges(cfg, doms).into_iter().collect();
    let residual = EdgeFiltered::from_fn(cfg.graph(), |e| {
        !back.contains(&(e.source(), e.target()))
    });
    !is_cyclic_directed(&residual)
}

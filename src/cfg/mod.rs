//! Control-flow graph construction and queries.

pub mod blocks;
pub mod dominance_frontiers;
pub mod dominators;
pub mod export;
pub mod loops;
pub mod reachability;

pub use blocks::{partition, BasicBlock, START_LABEL};
pub use dominance_frontiers::DominanceFrontiers;
pub use dominators::{Dominators, DominatorTree};
pub use export::to_dot;
pub use loops::{back_edges, is_reducible, natural_loops, NaturalLoop};
pub use reachability::is_reachable;

use crate::ir::{Function, Instr, IrError, Op};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::HashMap;

/// Type of control flow edge between basic blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// Unconditional jump
    Jump,
    /// Conditional branch taken (true)
    TrueBranch,
    /// Conditional branch not taken (false)
    FalseBranch,
    /// Sequential fallthrough
    Fallthrough,
}

impl EdgeType {
    /// Color for DOT visualization
    pub fn dot_color(&self) -> &'static str {
        match self {
            EdgeType::Jump => "black",
            EdgeType::TrueBranch => "green",
            EdgeType::FalseBranch => "red",
            EdgeType::Fallthrough => "gray",
        }
    }

    /// Label for DOT visualization
    pub fn dot_label(&self) -> &'static str {
        match self {
            EdgeType::Jump => "",
            EdgeType::TrueBranch => "T",
            EdgeType::FalseBranch => "F",
            EdgeType::Fallthrough => "",
        }
    }
}

/// Control-flow graph of one function.
///
/// Blocks live in a stable graph so node indices survive splicing and node
/// iteration keeps insertion order, which is source order; every pass that
/// reassembles an instruction list depends on that determinism.
///
/// Built with `reverse`, successor and predecessor roles are swapped at
/// construction, which is how backward dataflow analyses reuse the forward
/// worklist engine unchanged.
#[derive(Debug, Clone)]
pub struct Cfg {
    graph: StableDiGraph<BasicBlock, EdgeType>,
    labels: HashMap<String, NodeIndex>,
    function: String,
    reverse: bool,
}

impl Cfg {
    /// Build the CFG for a function.
    pub fn from_function(func: &Function) -> Result<Cfg, IrError> {
        Cfg::build(&func.name, func.instrs.clone(), false)
    }

    /// Build the reverse CFG (edges flipped) for backward analyses.
    pub fn from_function_reversed(func: &Function) -> Result<Cfg, IrError> {
        Cfg::build(&func.name, func.instrs.clone(), true)
    }

    fn build(function: &str, instrs: Vec<Instr>, reverse: bool) -> Result<Cfg, IrError> {
        let mut graph = StableDiGraph::new();
        let mut labels = HashMap::new();

        let block_list = partition(instrs);
        let mut order = Vec::with_capacity(block_list.len());
        for block in block_list {
            let label = block.label.clone();
            let node = graph.add_node(block);
            if labels.insert(label.clone(), node).is_some() {
                return Err(IrError::DuplicateLabel {
                    function: function.to_string(),
                    label,
                });
            }
            order.push(node);
        }

        let connect = |graph: &mut StableDiGraph<BasicBlock, EdgeType>,
                           from: NodeIndex,
                           to: NodeIndex,
                           edge: EdgeType| {
            if reverse {
                graph.add_edge(to, from, edge);
            } else {
                graph.add_edge(from, to, edge);
            }
        };

        for (idx, &node) in order.iter().enumerate() {
            let (op, targets) = match graph[node].terminator() {
                Some(term) => (term.op(), term.labels().to_vec()),
                None => (None, Vec::new()),
            };
            match op {
                Some(Op::Jmp) | Some(Op::Br) => {
                    let edges: &[EdgeType] = if op == Some(Op::Jmp) {
                        &[EdgeType::Jump]
                    } else {
                        &[EdgeType::TrueBranch, EdgeType::FalseBranch]
                    };
                    for (target, &edge) in targets.iter().zip(edges.iter().chain(edges.last())) {
                        let to = *labels.get(target).ok_or_else(|| IrError::UndefinedLabel {
                            function: function.to_string(),
                            label: target.clone(),
                        })?;
                        connect(&mut graph, node, to, edge);
                    }
                }
                Some(Op::Ret) => {}
                _ => {
                    // Fall through to the next block in source order; the
                    // last block simply exits.
                    if let Some(&next) = order.get(idx + 1) {
                        connect(&mut graph, node, next, EdgeType::Fallthrough);
                    }
                }
            }
        }

        Ok(Cfg {
            graph,
            labels,
            function: function.to_string(),
            reverse,
        })
    }

    /// Name of the function this CFG was built from.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Whether edges were flipped at construction.
    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// The entry node: the first block in source order.
    pub fn entry(&self) -> Option<NodeIndex> {
        self.graph.node_indices().next()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All nodes in source (insertion) order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn node_of(&self, label: &str) -> Option<NodeIndex> {
        self.labels.get(label).copied()
    }

    pub fn block(&self, node: NodeIndex) -> &BasicBlock {
        &self.graph[node]
    }

    pub fn block_mut(&mut self, node: NodeIndex) -> &mut BasicBlock {
        &mut self.graph[node]
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub fn predecessors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    pub fn has_edge(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: EdgeType) {
        if !self.has_edge(from, to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    /// All CFG edges as (from, to) node pairs.
    pub fn edges(&self) -> Vec<(NodeIndex, NodeIndex)> {
        use petgraph::visit::{EdgeRef, IntoEdgeReferences};
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target()))
            .collect()
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<BasicBlock, EdgeType> {
        &self.graph
    }

    /// Drop a block from the graph entirely. The caller is responsible for
    /// having rerouted control flow first.
    pub fn remove_block(&mut self, node: NodeIndex) {
        let label = self.graph[node].label.clone();
        self.labels.remove(&label);
        self.graph.remove_node(node);
    }

    /// Reassemble the function's instruction list from the blocks, in
    /// construction order. Labels are emitted only for blocks that carried
    /// one in the source (or were marked as referenced since).
    pub fn into_instrs(self) -> Vec<Instr> {
        let mut out = Vec::new();
        let graph = self.graph;
        for node in graph.node_indices() {
            let block = &graph[node];
            if block.labeled {
                out.push(Instr::Label {
                    label: block.label.clone(),
                });
            }
            out.extend(block.instrs.iter().cloned());
        }
        out
    }
}

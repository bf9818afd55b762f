//! Generic iterative worklist engine for dataflow analyses.
//!
//! The engine is direction-agnostic: it always merges over a node's CFG
//! predecessors and re-enqueues successors on change. Backward analyses
//! (liveness) hand it a CFG built with the reverse flag, so their "in" and
//! "out" maps come back swapped relative to the forward reading.
//!
//! Termination relies on the client's lattice having finite height and its
//! transfer being monotone; the engine itself does not bound iterations.

use crate::cfg::{BasicBlock, Cfg};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};

/// Fixed-point states per block, on both sides of the transfer.
#[derive(Debug, Clone)]
pub struct DataflowResult<S> {
    pub inputs: HashMap<NodeIndex, S>,
    pub outputs: HashMap<NodeIndex, S>,
}

/// Run the worklist algorithm to a fixed point.
///
/// * `seed` initializes blocks without predecessors (the entry in a forward
///   CFG, the exits in a reverse one); other blocks merge their
///   predecessors' outputs.
/// * `merge` must be commutative, associative, and idempotent.
/// * `transfer` must be monotone; it receives the node, its block, and the
///   merged input state.
///
/// States start at the lattice bottom (`Default`). Every block is enqueued
/// once up front; a block's successors are re-enqueued whenever its output
/// changes.
pub fn run_worklist<S, M, T>(cfg: &Cfg, seed: Option<S>, mut merge: M, mut transfer: T) -> DataflowResult<S>
where
    S: Clone + Default + PartialEq,
    M: FnMut(Vec<&S>) -> S,
    T: FnMut(NodeIndex, &BasicBlock, &S) -> S,
{
    let mut inputs: HashMap<NodeIndex, S> = HashMap::new();
    let mut outputs: HashMap<NodeIndex, S> = HashMap::new();
    for node in cfg.nodes() {
        inputs.insert(node, S::default());
        outputs.insert(node, S::default());
    }

    let mut worklist: VecDeque<NodeIndex> = cfg.nodes().collect();
    let mut queued: HashSet<NodeIndex> = worklist.iter().copied().collect();

    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);

        let pred_outs: Vec<&S> = cfg
            .predecessors(node)
            .filter_map(|p| outputs.get(&p))
            .collect();
        let input = if pred_outs.is_empty() {
            seed.clone().unwrap_or_default()
        } else {
            merge(pred_outs)
        };

        let output = transfer(node, cfg.block(node), &input);
        inputs.insert(node, input);

        if outputs.get(&node) != Some(&output) {
            outputs.insert(node, output);
            for succ in cfg.successors(node) {
                if queued.insert(succ) {
                    worklist.push_back(succ);
                }
            }
        }
    }

    DataflowResult { inputs, outputs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::testutil::*;
    use crate::cfg::{Cfg, START_LABEL};
    use std::collections::HashSet;

    /// Defined-variables analysis: forward, union merge, transfer adds every
    /// destination in the block. Small enough to check the engine end to end.
    fn defined_variables(cfg: &Cfg) -> DataflowResult<HashSet<String>> {
        run_worklist(
            cfg,
            None,
            |states: Vec<&HashSet<String>>| {
                let mut merged = HashSet::new();
                for s in states {
                    merged.extend(s.iter().cloned());
                }
                merged
            },
            |_, block, input: &HashSet<String>| {
                let mut out = input.clone();
                for instr in &block.instrs {
                    if let Some(dest) = instr.dest() {
                        out.insert(dest.to_string());
                    }
                }
                out
            },
        )
    }

    #[test]
    fn test_forward_union_reaches_join() {
        let cfg = diamond();
        let join = cfg.node_of("join").unwrap();
        let result = defined_variables(&cfg);

        let at_join = &result.inputs[&join];
        assert!(at_join.contains("cond"));
        assert!(at_join.contains("a"));
    }

    #[test]
    fn test_loop_reaches_fixed_point() {
        let cfg = looped();
        let header = cfg.node_of("header").unwrap();
        let result = defined_variables(&cfg);

        // The definition from the loop body flows back into the header.
        assert!(result.inputs[&header].contains("i"));
    }

    #[test]
    fn test_seed_applies_to_entry_only() {
        let cfg = diamond();
        let start = cfg.node_of(START_LABEL).unwrap();
        let join = cfg.node_of("join").unwrap();
        let seed: HashSet<String> = HashSet::from(["param".to_string()]);

        let result = run_worklist(
            &cfg,
            Some(seed),
            |states: Vec<&HashSet<String>>| {
                let mut merged = HashSet::new();
                for s in states {
                    merged.extend(s.iter().cloned());
                }
                merged
            },
            |_, _, input: &HashSet<String>| input.clone(),
        );

        assert!(result.inputs[&start].contains("param"));
        // With an identity transfer the seed propagates everywhere.
        assert!(result.inputs[&join].contains("param"));
    }
}

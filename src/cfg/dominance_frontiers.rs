//! Dominance frontier computation.
//!
//! The dominance frontier of a node n is the set of nodes where n's
//! dominance ends: successors of n-dominated nodes that n does not strictly
//! dominate. These are the join points where control from n's region meets
//! control from outside, and therefore where SSA construction places phis.

use crate::cfg::{Cfg, Dominators};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Dominance frontiers for all nodes in a CFG.
#[derive(Debug, Clone)]
pub struct DominanceFrontiers {
    frontiers: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

impl DominanceFrontiers {
    /// Compute every node's frontier directly from the definition: for each
    /// edge (u, w) and each dominator v of u, w lands in DF(v) unless v
    /// strictly dominates w. The self-loop case (w = v) is included.
    pub fn new(cfg: &Cfg, doms: &Dominators) -> DominanceFrontiers {
        let mut frontiers: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
        for node in cfg.nodes() {
            frontiers.entry(node).or_default();
        }

        for u in cfg.nodes() {
            let dom_u = match doms.set(u) {
                Some(set) => set,
                None => continue,
            };
            for w in cfg.successors(u) {
                for &v in dom_u {
                    if !doms.strictly_dominates(v, w) {
                        frontiers.entry(v).or_default().insert(w);
                    }
                }
            }
        }

        DominanceFrontiers { frontiers }
    }

    /// The dominance frontier of a node (empty if it has none).
    pub fn frontier(&self, node: NodeIndex) -> HashSet<NodeIndex> {
        self.frontiers.get(&node).cloned().unwrap_or_default()
    }

    /// Check if `w` is in `n`'s dominance frontier.
    pub fn in_frontier(&self, n: NodeIndex, w: NodeIndex) -> bool {
        self.frontiers.get(&n).map_or(false, |set| set.contains(&w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::testutil::*;
    use crate::cfg::START_LABEL;

    #[test]
    fn test_diamond_frontiers() {
        let cfg = diamond();
        let start = cfg.node_of(START_LABEL).unwrap();
        let left = cfg.node_of("left").unwrap();
        let right = cfg.node_of("right").unwrap();
        let join = cfg.node_of("join").unwrap();
        let doms = Dominators::compute(&cfg);
        let df = DominanceFrontiers::new(&cfg, &doms);

        // The join point is the frontier of both branches.
        assert!(df.in_frontier(left, join));
        assert!(df.in_frontier(right, join));
        // Dominance of the entry never ends.
        assert!(df.frontier(start).is_empty());
        assert!(df.frontier(join).is_empty());
    }

    #[test]
    fn test_loop_header_in_own_frontier() {
        let cfg = looped();
        let header = cfg.node_of("header").unwrap();
        let doms = Dominators::compute(&cfg);
        let df = DominanceFrontiers::new(&cfg, &doms);

        // The back edge makes the header a join point of its own region.
        assert!(df.in_frontier(header, header));
    }
}

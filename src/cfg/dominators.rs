//! Dominator analysis: full dominator sets, immediate dominators, and the
//! dominator tree.
//!
//! A node d dominates node n if every path from the entry node to n must go
//! through d. The computation is the iterative intersection fixed point
//! over full dominator sets; back-edge detection and the LICM hoist check
//! both need whole sets, not just immediate dominators, and unreachable
//! blocks fall out naturally with no set at all.

use crate::cfg::Cfg;
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Dominator sets for every reachable node.
///
/// Nodes unreachable from the entry have no entry in the map; callers treat
/// a missing set as empty.
#[derive(Debug, Clone)]
pub struct Dominators {
    doms: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

impl Dominators {
    /// Iterative intersection to a fixed point. `dom(start) = {start}`;
    /// for every other node `dom(v) = {v} ∪ ⋂ dom(p)` over predecessors
    /// that already have a set.
    pub fn compute(cfg: &Cfg) -> Dominators {
        let mut doms: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
        let entry = match cfg.entry() {
            Some(e) => e,
            None => return Dominators { doms },
        };
        doms.insert(entry, HashSet::from([entry]));

        let nodes: Vec<NodeIndex> = cfg.nodes().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &node in &nodes {
                if node == entry {
                    continue;
                }
                let mut pred_sets = cfg
                    .predecessors(node)
                    .filter_map(|p| doms.get(&p));
                let mut next: HashSet<NodeIndex> = match pred_sets.next() {
                    Some(first) => first.clone(),
                    None => continue,
                };
                for set in pred_sets {
                    next.retain(|n| set.contains(n));
                }
                next.insert(node);
                if doms.get(&node) != Some(&next) {
                    doms.insert(node, next);
                    changed = true;
                }
            }
        }

        Dominators { doms }
    }

    /// The dominator set of a node; `None` for unreachable nodes.
    pub fn set(&self, node: NodeIndex) -> Option<&HashSet<NodeIndex>> {
        self.doms.get(&node)
    }

    /// Check if `a` dominates `b`. Every reachable node dominates itself;
    /// nothing dominates an unreachable node.
    pub fn dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.doms.get(&b).map_or(false, |set| set.contains(&a))
    }

    /// Check if `a` strictly dominates `b` (dominates and `a != b`).
    pub fn strictly_dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The immediate dominator: the unique strict dominator dominated by
    /// every other strict dominator. `None` for the entry and for
    /// unreachable nodes.
    pub fn immediate_dominator(&self, node: NodeIndex) -> Option<NodeIndex> {
        let set = self.doms.get(&node)?;
        let strict: Vec<NodeIndex> = set.iter().copied().filter(|&d| d != node).collect();
        strict
            .iter()
            .copied()
            .find(|&d| strict.iter().all(|&e| self.dominates(e, d)))
    }
}

/// Dominator tree: the forest of immediate-dominator links rooted at the
/// entry block, used for SSA renaming order.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeIndex,
    children: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl DominatorTree {
    /// Build the tree from computed dominator sets.
    ///
    /// Returns `None` for an empty CFG.
    pub fn build(cfg: &Cfg, doms: &Dominators) -> Option<DominatorTree> {
        let root = cfg.entry()?;
        let mut children: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for node in cfg.nodes() {
            if let Some(idom) = doms.immediate_dominator(node) {
                children.entry(idom).or_default().push(node);
            }
        }
        for list in children.values_mut() {
            list.sort();
        }
        Some(DominatorTree { root, children })
    }

    /// The root node (the entry block).
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Nodes immediately dominated by `node`, in source order.
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        self.children.get(&node).map_or(&[], |v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::testutil::*;
    use crate::cfg::{Cfg, START_LABEL};

    #[test]
    fn test_diamond_dominators() {
        let cfg = diamond();
        let start = cfg.node_of(START_LABEL).unwrap();
        let left = cfg.node_of("left").unwrap();
        let right = cfg.node_of("right").unwrap();
        let join = cfg.node_of("join").unwrap();
        let doms = Dominators::compute(&cfg);

        // Entry dominates everything reachable; every node dominates itself.
        for node in [start, left, right, join] {
            assert!(doms.dominates(start, node));
            assert!(doms.dominates(node, node));
        }
        // Neither branch dominates the join.
        assert!(!doms.dominates(left, join));
        assert!(!doms.dominates(right, join));
        assert_eq!(doms.immediate_dominator(join), Some(start));
        assert_eq!(doms.immediate_dominator(start), None);
    }

    #[test]
    fn test_linear_chain_dominators() {
        let f = func(
            "linear",
            vec![
                jmp("a"),
                label("a"),
                jmp("b"),
                label("b"),
                ret(),
            ],
        );
        let cfg = Cfg::from_function(&f).unwrap();
        let start = cfg.node_of(START_LABEL).unwrap();
        let a = cfg.node_of("a").unwrap();
        let b = cfg.node_of("b").unwrap();
        let doms = Dominators::compute(&cfg);

        assert!(doms.strictly_dominates(start, a));
        assert!(doms.strictly_dominates(a, b));
        assert_eq!(doms.immediate_dominator(b), Some(a));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        let cfg = looped();
        let header = cfg.node_of("header").unwrap();
        let body = cfg.node_of("body").unwrap();
        let doms = Dominators::compute(&cfg);
        assert!(doms.strictly_dominates(header, body));
        assert!(!doms.dominates(body, header));
    }

    #[test]
    fn test_unreachable_block_has_no_dominators() {
        let f = func(
            "dead",
            vec![jmp("out"), label("island"), jmp("island"), label("out"), ret()],
        );
        let cfg = Cfg::from_function(&f).unwrap();
        let island = cfg.node_of("island").unwrap();
        let doms = Dominators::compute(&cfg);
        assert!(doms.set(island).is_none());
        assert!(!doms.dominates(island, island));
    }

    #[test]
    fn test_dominator_tree_children() {
        let cfg = diamond();
        let start = cfg.node_of(START_LABEL).unwrap();
        let doms = Dominators::compute(&cfg);
        let tree = DominatorTree::build(&cfg, &doms).unwrap();

        assert_eq!(tree.root(), start);
        // In a diamond, start immediately dominates all three other blocks.
        assert_eq!(tree.children(start).len(), 3);
    }
}

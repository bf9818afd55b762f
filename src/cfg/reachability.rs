//! Reachability queries over the CFG.

use crate::cfg::Cfg;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::Dfs;

/// Check if `to` is reachable from `from` along successor edges.
pub fn is_reachable(cfg: &Cfg, from: NodeIndex, to: NodeIndex) -> bool {
    has_path_connecting(cfg.graph(), from, to, None)
}

/// All blocks reachable from the entry, in DFS discovery order.
pub fn reachable_from_entry(cfg: &Cfg) -> Vec<NodeIndex> {
    let entry = match cfg.entry() {
        Some(e) => e,
        None => return vec![],
    };
    let mut dfs = Dfs::new(cfg.graph(), entry);
    let mut reachable = Vec::new();
    while let Some(node) = dfs.next(cfg.graph()) {
        reachable.push(node);
    }
    reachable
}

//! Loop-invariant code motion.
//!
//! For each back edge of a reducible CFG: compute the natural loop body and
//! the preheader set (predecessors of the header outside the loop), mark
//! loop-invariant instructions to a fixed point, then hoist the safe ones
//! into every preheader, just ahead of its terminator.
//!
//! An irreducible CFG is recovered locally: the function comes back
//! unchanged. A malformed loop (unreachable tail, missing definitions) is
//! skipped, not fatal.

use crate::cfg::{back_edges, is_reducible, loops, reachability, Cfg, Dominators};
use crate::ir::{Function, Instr, IrError, Op};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

type Site = (NodeIndex, usize);

pub fn run(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;
    if cfg.node_count() <= 1 {
        return Ok(cfg.into_instrs());
    }
    let doms = Dominators::compute(&cfg);
    if !is_reducible(&cfg, &doms) {
        debug!(function = %func.name, "irreducible control flow, skipping");
        return Ok(cfg.into_instrs());
    }

    let entry = cfg.entry().expect("non-empty CFG");
    for (tail, head) in back_edges(&cfg, &doms) {
        if !reachability::is_reachable(&cfg, entry, tail) {
            debug!(function = %func.name, "loop tail unreachable, skipping");
            continue;
        }

        let body = loops::loop_body(&cfg, head, tail);
        let preheaders: Vec<NodeIndex> = {
            let mut p: Vec<NodeIndex> =
                cfg.predecessors(head).filter(|n| !body.contains(n)).collect();
            p.sort();
            p
        };
        if preheaders.is_empty() {
            continue;
        }

        // Definition and use sites reflect the function as it currently
        // stands, so earlier hoists are accounted for.
        let (uses, defs) = use_def_sites(&cfg);
        let invariant = find_invariants(&cfg, &body, &defs);
        let loop_phis = loop_phi_sites(&cfg, &body);

        let mut body_blocks: Vec<NodeIndex> = body.iter().copied().collect();
        body_blocks.sort();
        for node in body_blocks {
            let mut i = 0;
            let mut original_idx = 0;
            while i < cfg.block(node).instrs.len() {
                let site = (node, original_idx);
                let do_hoist = invariant.contains(&site)
                    && hoistable(
                        &doms,
                        &uses,
                        &defs,
                        &body,
                        &loop_phis,
                        &cfg.block(node).instrs[i],
                        node,
                    );
                if !do_hoist {
                    i += 1;
                    original_idx += 1;
                    continue;
                }

                let instr = cfg.block_mut(node).instrs.remove(i);
                debug!(function = %func.name, %instr, "hoisting loop invariant");
                original_idx += 1;
                for &pre in &preheaders {
                    let block = cfg.block_mut(pre);
                    if block.instrs.last().map_or(false, Instr::is_terminator) {
                        let at = block.instrs.len() - 1;
                        block.instrs.insert(at, instr.clone());
                    } else {
                        block.instrs.push(instr.clone());
                    }
                }
            }
        }
    }

    Ok(cfg.into_instrs())
}

/// Use and definition sites for every variable, keyed by (block, index).
fn use_def_sites(cfg: &Cfg) -> (HashMap<String, HashSet<Site>>, HashMap<String, HashSet<Site>>) {
    let mut uses: HashMap<String, HashSet<Site>> = HashMap::new();
    let mut defs: HashMap<String, HashSet<Site>> = HashMap::new();
    for node in cfg.nodes() {
        for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
            for arg in instr.args() {
                uses.entry(arg.clone()).or_default().insert((node, idx));
            }
            if let Some(dest) = instr.dest() {
                defs.entry(dest.to_string()).or_default().insert((node, idx));
            }
        }
    }
    (uses, defs)
}

/// Iterate to a fixed point: an instruction is invariant iff it has
/// arguments and each one is either defined wholly outside the loop (or
/// not at all: parameters and external values) or only by instructions
/// already marked invariant.
fn find_invariants(
    cfg: &Cfg,
    body: &HashSet<NodeIndex>,
    defs: &HashMap<String, HashSet<Site>>,
) -> HashSet<Site> {
    let mut invariant: HashSet<Site> = HashSet::new();
    loop {
        let mut changed = false;
        for &node in body {
            for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
                if instr.args().is_empty() || invariant.contains(&(node, idx)) {
                    continue;
                }
                let ok = instr.args().iter().all(|arg| match defs.get(arg) {
                    None => true,
                    Some(sites) => {
                        sites.iter().all(|(b, _)| !body.contains(b))
                            || sites.iter().all(|site| invariant.contains(site))
                    }
                });
                if ok && invariant.insert((node, idx)) {
                    changed = true;
                }
            }
        }
        if !changed {
            return invariant;
        }
    }
}

/// Sites holding a phi whose incoming labels all sit inside the loop,
/// captured before hoisting starts shifting instruction indices.
fn loop_phi_sites(cfg: &Cfg, body: &HashSet<NodeIndex>) -> HashSet<Site> {
    let mut sites = HashSet::new();
    for node in cfg.nodes() {
        for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
            if instr.op() != Some(Op::Phi) {
                continue;
            }
            let inside = instr
                .labels()
                .iter()
                .all(|l| cfg.node_of(l).map_or(false, |n| body.contains(&n)));
            if inside {
                sites.insert((node, idx));
            }
        }
    }
    sites
}

/// The safety gate for one marked instruction.
fn hoistable(
    doms: &Dominators,
    uses: &HashMap<String, HashSet<Site>>,
    defs: &HashMap<String, HashSet<Site>>,
    body: &HashSet<NodeIndex>,
    loop_phis: &HashSet<Site>,
    instr: &Instr,
    node: NodeIndex,
) -> bool {
    let op = match instr.op() {
        Some(op) => op,
        None => return false,
    };
    let dest = match instr.dest() {
        Some(d) if !d.is_empty() => d,
        _ => return false,
    };
    // Unused values are left where they are for DCE to judge.
    let Some(use_sites) = uses.get(dest) else {
        return false;
    };

    if op.is_special() || can_error(defs, body, instr, op) {
        return false;
    }

    // Every use not dominated by this block must be a phi whose incoming
    // labels all sit inside the loop.
    use_sites.iter().all(|&(use_block, use_idx)| {
        doms.dominates(node, use_block) || loop_phis.contains(&(use_block, use_idx))
    })
}

/// Operations that might fault if executed on a path the loop would not
/// have taken: memory operations, phis, and division whose divisor is
/// produced inside the loop.
fn can_error(
    defs: &HashMap<String, HashSet<Site>>,
    body: &HashSet<NodeIndex>,
    instr: &Instr,
    op: Op,
) -> bool {
    match op {
        Op::Free | Op::Load | Op::Store | Op::Phi => true,
        Op::Div => instr.args().get(1).map_or(true, |divisor| {
            defs.get(divisor).map_or(false, |sites| {
                sites.iter().any(|(b, _)| body.contains(b))
            })
        }),
        _ => false,
    }
}

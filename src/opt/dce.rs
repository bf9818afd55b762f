//! Dead-code elimination in three strengths.
//!
//! * [`eliminate`] — liveness-driven: an assignment whose destination is
//!   dead at the end of its block (and unused later within it) goes away;
//!   blocks left empty are spliced out of the CFG.
//! * [`local`] — per-block reassignment catcher: a definition overwritten
//!   before any use of its prior value is removed.
//! * [`global`] — coarse fixed point over the whole function: definitions
//!   that appear in no argument list anywhere are removed.
//!
//! Only pure value instructions are ever candidates; anything with a side
//! effect (stores, prints, calls, allocation) stays regardless of liveness.

use crate::cfg::Cfg;
use crate::ir::{Function, Instr, IrError};
use crate::opt::liveness::live_variables;
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Can this instruction be deleted when its result is unused?
fn removable(instr: &Instr) -> bool {
    instr.dest().is_some() && !instr.is_special()
}

/// Liveness-driven global DCE.
pub fn eliminate(func: &Function) -> Result<Vec<Instr>, IrError> {
    let rcfg = Cfg::from_function_reversed(func)?;
    let live = live_variables(&rcfg);

    // The forward CFG partitions the same instruction list in the same
    // order, so node indices line up with the reverse build.
    let mut cfg = Cfg::from_function(func)?;
    let nodes: Vec<NodeIndex> = cfg.nodes().collect();

    for &node in &nodes {
        let live_out = &live.inputs[&node];
        let block = cfg.block_mut(node);

        let mut keep = vec![true; block.instrs.len()];
        for (idx, instr) in block.instrs.iter().enumerate() {
            if !removable(instr) {
                continue;
            }
            let dest = instr.dest().expect("removable implies dest");
            let used_later = block.instrs[idx + 1..]
                .iter()
                .any(|later| later.args().iter().any(|arg| arg == dest));
            if !live_out.contains(dest) && !used_later {
                debug!(function = %func.name, dest, "removing dead assignment");
                keep[idx] = false;
            }
        }
        let mut it = keep.iter();
        block.instrs.retain(|_| *it.next().expect("keep mask aligned"));
    }

    // Splice out blocks with nothing left in them, linking each predecessor
    // to the single fall-through successor and retargeting jumps.
    for node in nodes {
        if !cfg.block(node).instrs.is_empty() {
            continue;
        }
        let succs: Vec<NodeIndex> = cfg.successors(node).collect();
        if succs.len() != 1 {
            continue;
        }
        let succ = succs[0];
        let dead_label = cfg.block(node).label.clone();
        let succ_label = cfg.block(succ).label.clone();
        let preds: Vec<NodeIndex> = cfg.predecessors(node).collect();

        for pred in preds {
            if let Some(labels) = cfg
                .block_mut(pred)
                .instrs
                .last_mut()
                .and_then(Instr::labels_mut)
            {
                for target in labels.iter_mut() {
                    if *target == dead_label {
                        *target = succ_label.clone();
                    }
                }
            }
            cfg.add_edge(pred, succ, crate::cfg::EdgeType::Fallthrough);
        }
        debug!(function = %func.name, label = %dead_label, "splicing empty block");
        cfg.remove_block(node);
    }

    Ok(cfg.into_instrs())
}

/// Per-block reassignment DCE: a prior definition of a variable is removed
/// when the variable is redefined with no intervening use.
pub fn local(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;
    let nodes: Vec<NodeIndex> = cfg.nodes().collect();

    for node in nodes {
        let block = cfg.block_mut(node);
        let mut keep = vec![true; block.instrs.len()];
        let mut last_def: HashMap<&str, usize> = HashMap::new();

        for (idx, instr) in block.instrs.iter().enumerate() {
            for arg in instr.args() {
                last_def.remove(arg.as_str());
            }
            if let Some(dest) = instr.dest() {
                if let Some(prev) = last_def.remove(dest) {
                    if removable(&block.instrs[prev]) {
                        keep[prev] = false;
                    }
                }
                last_def.insert(dest, idx);
            }
        }

        let mut it = keep.iter();
        block.instrs.retain(|_| *it.next().expect("keep mask aligned"));
    }

    Ok(cfg.into_instrs())
}

/// Whole-function used-set DCE, iterated to a fixed point.
pub fn global(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut instrs = func.instrs.clone();
    loop {
        let used: HashSet<String> = instrs
            .iter()
            .flat_map(|i| i.args().iter().cloned())
            .collect();

        let before = instrs.len();
        instrs.retain(|instr| {
            !(removable(instr) && !used.contains(instr.dest().expect("removable implies dest")))
        });
        if instrs.len() == before {
            return Ok(instrs);
        }
    }
}

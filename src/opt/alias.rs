//! Points-to analysis.
//!
//! A forward worklist analysis whose state maps each variable to the set of
//! abstract memory locations it may reference. Locations are fresh tokens
//! minted per `alloc` site, plus the `All` element for values the analysis
//! cannot reason about (loaded pointers, pointer-typed parameters). Two
//! variables may alias when their points-to sets intersect or either
//! contains `All`.

use crate::cfg::Cfg;
use crate::dataflow::{run_worklist, DataflowResult};
use crate::ir::{Function, Instr, IrError, Op};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// An abstract memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// The allocation made at one particular `alloc` site.
    Site(usize),
    /// Unknown: may be any location at all.
    All,
}

/// Points-to state: variable name to the locations it may reference.
pub type PointsTo = HashMap<String, HashSet<Location>>;

/// The computed analysis for one function.
pub struct AliasAnalysis {
    /// Per-block fixed-point states.
    pub result: DataflowResult<PointsTo>,
    /// Union of every block's out-state: the whole-function view.
    pub summary: PointsTo,
    /// Symmetric may-alias relation (self excluded).
    pub aliases: HashMap<String, HashSet<String>>,
}

impl AliasAnalysis {
    /// Run the analysis. Pointer-typed parameters are seeded to `{All}`.
    pub fn run(func: &Function) -> Result<AliasAnalysis, IrError> {
        let cfg = Cfg::from_function(func)?;
        let sites = alloc_sites(&cfg);

        let mut seed = PointsTo::new();
        for param in &func.args {
            if param.typ.is_ptr() {
                seed.insert(param.name.clone(), HashSet::from([Location::All]));
            }
        }

        let result = run_worklist(
            &cfg,
            Some(seed),
            merge_points_to,
            |node, block, input: &PointsTo| {
                let mut state = input.clone();
                for (idx, instr) in block.instrs.iter().enumerate() {
                    transfer(&mut state, instr, &sites, node, idx);
                }
                state
            },
        );

        let mut summary = PointsTo::new();
        for state in result.outputs.values() {
            union_into(&mut summary, state);
        }
        let aliases = may_alias_map(&summary);
        debug!(function = %func.name, vars = summary.len(), "points-to analysis complete");

        Ok(AliasAnalysis {
            result,
            summary,
            aliases,
        })
    }

    /// May `a` and `b` refer to the same memory?
    pub fn may_alias(&self, a: &str, b: &str) -> bool {
        a != b
            && self
                .aliases
                .get(a)
                .map_or(false, |set| set.contains(b))
    }

    /// May this variable point anywhere at all (parameters, loaded
    /// pointers)?
    pub fn may_point_anywhere(&self, var: &str) -> bool {
        self.summary
            .get(var)
            .map_or(false, |locs| locs.contains(&Location::All))
    }
}

/// Number the `alloc` instructions in block order; each gets its own fresh
/// location token for this run.
fn alloc_sites(cfg: &Cfg) -> HashMap<(NodeIndex, usize), usize> {
    let mut sites = HashMap::new();
    let mut next = 0usize;
    for node in cfg.nodes() {
        for (idx, instr) in cfg.block(node).instrs.iter().enumerate() {
            if instr.op() == Some(Op::Alloc) {
                sites.insert((node, idx), next);
                next += 1;
            }
        }
    }
    sites
}

fn transfer(
    state: &mut PointsTo,
    instr: &Instr,
    sites: &HashMap<(NodeIndex, usize), usize>,
    node: NodeIndex,
    idx: usize,
) {
    let (op, dest) = match instr {
        Instr::Value { op, dest, .. } => (*op, dest),
        _ => return,
    };
    match op {
        Op::Alloc => {
            let site = sites[&(node, idx)];
            state.insert(dest.clone(), HashSet::from([Location::Site(site)]));
        }
        Op::Id | Op::PtrAdd => {
            // Copies and pointer arithmetic propagate the source's
            // locations; untracked sources leave the destination untouched.
            if let Some(locs) = instr.args().first().and_then(|a| state.get(a)) {
                let locs = locs.clone();
                state.insert(dest.clone(), locs);
            }
        }
        Op::Load => {
            state.insert(dest.clone(), HashSet::from([Location::All]));
        }
        _ => {}
    }
}

fn merge_points_to(states: Vec<&PointsTo>) -> PointsTo {
    let mut merged = PointsTo::new();
    for state in states {
        union_into(&mut merged, state);
    }
    merged
}

fn union_into(into: &mut PointsTo, from: &PointsTo) {
    for (var, locs) in from {
        into.entry(var.clone()).or_default().extend(locs.iter().copied());
    }
}

/// Derive the symmetric may-alias relation from a points-to map.
pub fn may_alias_map(state: &PointsTo) -> HashMap<String, HashSet<String>> {
    let mut aliases: HashMap<String, HashSet<String>> = HashMap::new();
    let vars: Vec<&String> = state.keys().collect();
    for (i, a) in vars.iter().enumerate() {
        for b in vars.iter().skip(i + 1) {
            let sa = &state[*a];
            let sb = &state[*b];
            let related = sa.contains(&Location::All)
                || sb.contains(&Location::All)
                || sa.intersection(sb).next().is_some();
            if related {
                aliases.entry((*a).clone()).or_default().insert((*b).clone());
                aliases.entry((*b).clone()).or_default().insert((*a).clone());
            }
        }
    }
    aliases
}

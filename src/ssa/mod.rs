//! Static single assignment: construction, destruction, validation.
//!
//! Construction is the textbook two-phase approach: phi placement over
//! iterated dominance frontiers, then renaming along the dominator tree
//! with one name stack per variable. Destruction lowers each phi into `id`
//! copies appended to the predecessor blocks it names.

use crate::cfg::{Cfg, DominanceFrontiers, Dominators, DominatorTree};
use crate::ir::{Function, Instr, IrError, Op, Program, Type};
use petgraph::stable_graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Sentinel phi argument for paths on which the variable has no value yet.
pub const UNDEF: &str = "undef";

/// True iff every destination is assigned at most once per function.
pub fn is_ssa(program: &Program) -> bool {
    program.functions.iter().all(|func| {
        let mut assigned = HashSet::new();
        func.instrs
            .iter()
            .filter_map(|instr| instr.dest())
            .all(|dest| assigned.insert(dest.to_string()))
    })
}

/// Convert a function into SSA form, returning the new instruction list.
pub fn construct(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;
    if cfg.node_count() == 0 {
        return Ok(Vec::new());
    }
    let doms = Dominators::compute(&cfg);
    let tree = DominatorTree::build(&cfg, &doms).expect("CFG is non-empty");
    let frontiers = DominanceFrontiers::new(&cfg, &doms);

    let mut facts = VariableFacts::collect(func, &cfg);
    let phi_vars = place_phis(&frontiers, &mut facts.defs);
    debug!(function = %cfg.function(), blocks = phi_vars.len(), "phi placement done");

    let mut renamer = Renamer {
        phi_vars: &phi_vars,
        predefined: &facts.predefined,
        stacks: facts
            .predefined
            .iter()
            .map(|v| (v.clone(), vec![v.clone()]))
            .collect(),
        counters: HashMap::new(),
        phi_info: HashMap::new(),
    };
    renamer.rename_block(&mut cfg, &tree, tree.root());
    let phi_info = renamer.phi_info;

    insert_phis(&mut cfg, phi_info, &facts.types)?;
    Ok(cfg.into_instrs())
}

/// Convert a function out of SSA form: phis become `id` copies in their
/// predecessor blocks, placed just before the terminator when one exists.
pub fn destruct(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;

    let mut copies: Vec<(NodeIndex, Instr)> = Vec::new();
    for node in cfg.nodes() {
        for instr in &cfg.block(node).instrs {
            if instr.op() != Some(Op::Phi) {
                continue;
            }
            let Instr::Value {
                dest, typ, args, labels, ..
            } = instr
            else {
                return Err(IrError::Malformed("phi without a destination".into()));
            };
            if args.len() != labels.len() {
                return Err(IrError::PhiArityMismatch {
                    function: cfg.function().to_string(),
                    dest: dest.clone(),
                    args: args.len(),
                    labels: labels.len(),
                });
            }
            for (arg, label) in args.iter().zip(labels) {
                if arg == UNDEF {
                    continue;
                }
                let pred = cfg.node_of(label).ok_or_else(|| IrError::UndefinedLabel {
                    function: cfg.function().to_string(),
                    label: label.clone(),
                })?;
                copies.push((
                    pred,
                    Instr::value(Op::Id, dest.clone(), typ.clone(), vec![arg.clone()]),
                ));
            }
        }
    }

    for (node, copy) in copies {
        let block = cfg.block_mut(node);
        if block.instrs.last().map_or(false, Instr::is_terminator) {
            let at = block.instrs.len() - 1;
            block.instrs.insert(at, copy);
        } else {
            block.instrs.push(copy);
        }
    }

    let nodes: Vec<NodeIndex> = cfg.nodes().collect();
    for node in nodes {
        cfg.block_mut(node)
            .instrs
            .retain(|instr| instr.op() != Some(Op::Phi));
    }

    Ok(cfg.into_instrs())
}

/// Per-variable facts gathered before renaming.
struct VariableFacts {
    /// Blocks defining each variable.
    defs: HashMap<String, BTreeSet<NodeIndex>>,
    /// Declared type of each variable (from its defs or the parameter list).
    types: HashMap<String, Type>,
    /// Function parameters and variables used before any definition; these
    /// are treated as defined at entry and their names are never rewritten.
    predefined: HashSet<String>,
}

impl VariableFacts {
    fn collect(func: &Function, cfg: &Cfg) -> VariableFacts {
        let mut defs: HashMap<String, BTreeSet<NodeIndex>> = HashMap::new();
        let mut types: HashMap<String, Type> = HashMap::new();
        // true = first occurrence was a use
        let mut first_use: HashMap<String, bool> = HashMap::new();

        let mut predefined: HashSet<String> = HashSet::new();
        for param in &func.args {
            predefined.insert(param.name.clone());
            types.insert(param.name.clone(), param.typ.clone());
        }

        for node in cfg.nodes() {
            for instr in &cfg.block(node).instrs {
                for arg in instr.args() {
                    first_use.entry(arg.clone()).or_insert(true);
                }
                if let Some(dest) = instr.dest() {
                    first_use.entry(dest.to_string()).or_insert(false);
                    defs.entry(dest.to_string()).or_default().insert(node);
                    if let Some(typ) = instr.typ() {
                        types.insert(dest.to_string(), typ.clone());
                    }
                }
            }
        }

        for (var, was_use) in first_use {
            if was_use {
                predefined.insert(var);
            }
        }

        VariableFacts {
            defs,
            types,
            predefined,
        }
    }
}

/// Phase 1: decide which blocks need a phi for which variables, iterating
/// the dominance-frontier propagation to a fixed point.
fn place_phis(
    frontiers: &DominanceFrontiers,
    defs: &mut HashMap<String, BTreeSet<NodeIndex>>,
) -> HashMap<NodeIndex, BTreeSet<String>> {
    let mut phi_vars: HashMap<NodeIndex, BTreeSet<String>> = HashMap::new();

    let mut vars: Vec<String> = defs.keys().cloned().collect();
    vars.sort();
    for var in vars {
        let def_blocks = &defs[&var];
        if def_blocks.len() <= 1 {
            continue;
        }
        let mut work: Vec<NodeIndex> = def_blocks.iter().copied().collect();
        let mut cursor = 0;
        while cursor < work.len() {
            let d = work[cursor];
            cursor += 1;
            let mut frontier: Vec<NodeIndex> = frontiers.frontier(d).into_iter().collect();
            frontier.sort();
            for b in frontier {
                phi_vars.entry(b).or_default().insert(var.clone());
                if defs.get_mut(&var).expect("var present").insert(b) {
                    work.push(b);
                }
            }
        }
    }

    phi_vars
}

/// Gathered phi operands, keyed by (block, original variable).
#[derive(Debug, Default, Clone)]
struct PhiInfo {
    dest: String,
    args: Vec<String>,
    labels: Vec<String>,
}

/// Phase 2: renaming along the dominator tree.
struct Renamer<'a> {
    phi_vars: &'a HashMap<NodeIndex, BTreeSet<String>>,
    predefined: &'a HashSet<String>,
    stacks: HashMap<String, Vec<String>>,
    /// Monotone per-variable counters. Unlike the name stacks these are
    /// never rolled back, so sibling subtrees of the dominator tree cannot
    /// mint the same `v.k` twice.
    counters: HashMap<String, usize>,
    phi_info: HashMap<NodeIndex, BTreeMap<String, PhiInfo>>,
}

impl Renamer<'_> {
    fn fresh(&mut self, var: &str) -> String {
        let counter = self.counters.entry(var.to_string()).or_insert(0);
        let name = format!("{}.{}", var, counter);
        *counter += 1;
        name
    }

    fn rename_block(&mut self, cfg: &mut Cfg, tree: &DominatorTree, node: NodeIndex) {
        let saved = self.stacks.clone();

        if let Some(vars) = self.phi_vars.get(&node) {
            for var in vars {
                let fresh = self.fresh(var);
                self.stacks.entry(var.clone()).or_default().push(fresh.clone());
                self.phi_info
                    .entry(node)
                    .or_default()
                    .entry(var.clone())
                    .or_default()
                    .dest = fresh;
            }
        }

        for instr in cfg.block_mut(node).instrs.iter_mut() {
            if let Some(args) = instr.args_mut() {
                for arg in args.iter_mut() {
                    if let Some(top) = self.stacks.get(arg.as_str()).and_then(|s| s.last()) {
                        *arg = top.clone();
                    }
                }
            }
            if let Some(dest) = instr.dest().map(str::to_string) {
                if self.predefined.contains(&dest) {
                    continue;
                }
                let fresh = self.fresh(&dest);
                instr.set_dest(fresh.clone());
                self.stacks.entry(dest).or_default().push(fresh);
            }
        }

        let label = cfg.block(node).label.clone();
        let mut succs: Vec<NodeIndex> = cfg.successors(node).collect();
        succs.sort();
        for succ in succs {
            if let Some(vars) = self.phi_vars.get(&succ) {
                for var in vars {
                    let arg = self
                        .stacks
                        .get(var.as_str())
                        .and_then(|s| s.last())
                        .cloned()
                        .unwrap_or_else(|| UNDEF.to_string());
                    let info = self
                        .phi_info
                        .entry(succ)
                        .or_default()
                        .entry(var.clone())
                        .or_default();
                    info.args.push(arg);
                    info.labels.push(label.clone());
                }
            }
        }

        for &child in tree.children(node) {
            self.rename_block(cfg, tree, child);
        }

        self.stacks = saved;
    }
}

/// Materialize the gathered phis at their block heads.
fn insert_phis(
    cfg: &mut Cfg,
    phi_info: HashMap<NodeIndex, BTreeMap<String, PhiInfo>>,
    types: &HashMap<String, Type>,
) -> Result<(), IrError> {
    let mut referenced: HashSet<String> = HashSet::new();

    for (node, infos) in phi_info {
        let mut phis = Vec::with_capacity(infos.len());
        for (var, info) in infos {
            let typ = types.get(&var).ok_or_else(|| IrError::UndefinedVariable {
                function: cfg.function().to_string(),
                variable: var.clone(),
            })?;
            referenced.extend(info.labels.iter().cloned());
            phis.push(Instr::Value {
                op: Op::Phi,
                dest: info.dest,
                typ: typ.clone(),
                args: info.args,
                labels: info.labels,
                funcs: Vec::new(),
            });
        }
        let block = cfg.block_mut(node);
        phis.extend(block.instrs.drain(..));
        block.instrs = phis;
    }

    // Phi labels must stay resolvable, so blocks they name emit their label
    // even when the source never spelled it out (the unlabeled entry).
    for label in referenced {
        if let Some(node) = cfg.node_of(&label) {
            cfg.block_mut(node).labeled = true;
        }
    }

    Ok(())
}

//! Local value numbering with constant folding and redundancy elimination.
//!
//! Per block, values are numbered by canonical tuples: a constant is keyed
//! by (type, literal) and an operation by its opcode plus the value numbers
//! of its arguments (raw names when an argument flows in from outside the
//! block). Commutative operations sort their argument keys, so `add a b`
//! and `add b a` share a number whether or not the operands are known.
//!
//! The cross-block extension drives the per-block pass from the worklist
//! engine: the values known on all incoming edges are replayed as transient
//! placeholder instructions to seed the table, then stripped again from the
//! emitted stream.

use crate::cfg::Cfg;
use crate::dataflow::run_worklist;
use crate::ir::{Function, Instr, IrError, Literal, Op, Type};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Canonical description of a computed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Const { typ: Type, value: Literal },
    Op { op: Op, args: Vec<ArgKey> },
}

/// One operand in a value tuple: a resolved value number, or the raw name
/// of a value flowing in from outside the block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ArgKey {
    Num(usize),
    Name(String),
}

struct TableEntry {
    key: ValueKey,
    name: String,
}

/// An instruction moving through the numbering, tagged when it is a
/// transient seed that must not survive into the output stream.
#[derive(Debug, Clone)]
struct Slot {
    instr: Instr,
    transient: bool,
}

/// A value known to hold on entry to a block, for the cross-block variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnownValue {
    Const {
        dest: String,
        typ: Type,
        value: Literal,
    },
    Computed {
        op: Op,
        dest: String,
        typ: Type,
        args: Vec<String>,
    },
}

/// Local value numbering state. The fresh-name counter spans blocks so
/// `lvn.k` temporaries stay unique across one run; everything else resets
/// per block.
pub struct Lvn {
    env: HashMap<String, usize>,
    table: Vec<TableEntry>,
    index: HashMap<ValueKey, usize>,
    unique_id: usize,
}

impl Default for Lvn {
    fn default() -> Self {
        Lvn::new()
    }
}

impl Lvn {
    pub fn new() -> Lvn {
        Lvn {
            env: HashMap::new(),
            table: Vec::new(),
            index: HashMap::new(),
            unique_id: 0,
        }
    }

    /// Number one block's instructions, returning the rewritten block.
    pub fn process_block(&mut self, instrs: Vec<Instr>) -> Vec<Instr> {
        let slots = instrs
            .into_iter()
            .map(|instr| Slot {
                instr,
                transient: false,
            })
            .collect();
        self.process_slots(slots)
            .into_iter()
            .map(|slot| slot.instr)
            .collect()
    }

    fn reset(&mut self) {
        self.env.clear();
        self.table.clear();
        self.index.clear();
    }

    fn process_slots(&mut self, slots: Vec<Slot>) -> Vec<Slot> {
        self.reset();

        // Destinations as written, for the reassigned-later check.
        let dests: Vec<Option<String>> = slots
            .iter()
            .map(|slot| slot.instr.dest().map(str::to_string))
            .collect();
        let overwritten =
            |dest: &str, idx: usize| dests[idx + 1..].iter().flatten().any(|d| d == dest);

        let mut out: Vec<Slot> = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.into_iter().enumerate() {
            let transient = slot.transient;
            let mut instr = self.compute(slot.instr);

            let op = match instr.op() {
                Some(op) => op,
                None => {
                    out.push(Slot { instr, transient });
                    continue;
                }
            };
            if op == Op::Nop
                || op.is_terminator()
                || op.is_special()
                || !instr.labels().is_empty()
            {
                out.push(Slot { instr, transient });
                continue;
            }

            // A copy of a variable onto itself vanishes.
            if op == Op::Id && instr.args().first().map(String::as_str) == instr.dest() {
                continue;
            }

            // Copies of an already-numbered value share its number.
            if op == Op::Id {
                if let Some(&num) = instr.args().first().and_then(|a| self.env.get(a)) {
                    let dest = instr.dest().expect("id has a dest").to_string();
                    let rewritten = self.rewrite_to(num, &instr, &dest);
                    self.env.insert(dest, num);
                    out.push(Slot {
                        instr: rewritten,
                        transient,
                    });
                    continue;
                }
            }

            let key = self.value_key(&mut instr, op);

            if let Some(&num) = self.index.get(&key) {
                let dest = instr.dest().expect("numbered instr has a dest").to_string();
                let rewritten = self.rewrite_to(num, &instr, &dest);
                debug!(%dest, num, "redundant value replaced");
                self.env.insert(dest, num);
                out.push(Slot {
                    instr: rewritten,
                    transient,
                });
            } else {
                let num = self.table.len();
                let dest = instr.dest().expect("numbered instr has a dest").to_string();
                let name = if overwritten(&dest, idx) {
                    let fresh = format!("lvn.{}", self.unique_id);
                    self.unique_id += 1;
                    instr.set_dest(fresh.clone());
                    fresh
                } else {
                    dest.clone()
                };
                self.table.push(TableEntry {
                    key: key.clone(),
                    name,
                });
                self.index.insert(key, num);
                self.env.insert(dest, num);
                out.push(Slot { instr, transient });
            }
        }

        out
    }

    /// Replace an instruction with the canonical form of value `num`: the
    /// literal itself for constants, a copy of the representative otherwise.
    fn rewrite_to(&self, num: usize, instr: &Instr, dest: &str) -> Instr {
        let entry = &self.table[num];
        match &entry.key {
            ValueKey::Const { typ, value } => Instr::Const {
                dest: dest.to_string(),
                typ: typ.clone(),
                value: *value,
            },
            _ => Instr::value(
                Op::Id,
                dest,
                instr.typ().cloned().expect("value instr has a type"),
                vec![entry.name.clone()],
            ),
        }
    }

    /// Build the canonical tuple for an instruction, rewriting resolved
    /// arguments to their representative names along the way.
    fn value_key(&self, instr: &mut Instr, op: Op) -> ValueKey {
        if let Instr::Const { typ, value, .. } = instr {
            return ValueKey::Const {
                typ: typ.clone(),
                value: *value,
            };
        }

        let all_known = instr.args().iter().all(|a| self.env.contains_key(a));
        let mut keys: Vec<ArgKey> = if all_known {
            let nums: Vec<usize> = instr.args().iter().map(|a| self.env[a]).collect();
            let reps: Vec<String> = nums.iter().map(|&n| self.table[n].name.clone()).collect();
            if let Some(slots) = instr.args_mut() {
                *slots = reps;
            }
            nums.into_iter().map(ArgKey::Num).collect()
        } else {
            instr.args().iter().cloned().map(ArgKey::Name).collect()
        };
        if op.is_commutative() {
            keys.sort();
        }
        ValueKey::Op { op, args: keys }
    }

    /// Try to evaluate an instruction down to a constant. Unfoldable
    /// instructions (unknown operands, division by zero, type confusion)
    /// come back unchanged.
    fn compute(&self, instr: Instr) -> Instr {
        let (op, dest) = match &instr {
            Instr::Value { op, dest, .. } => (*op, dest.clone()),
            _ => return instr,
        };
        if op.is_special() || op == Op::Id || !instr.labels().is_empty() {
            return instr;
        }
        let args = instr.args();
        if args.is_empty() {
            return instr;
        }

        let literals: Option<Vec<Literal>> =
            args.iter().map(|a| self.known_literal(a)).collect();
        if let Some(literals) = literals {
            return match fold(op, &literals) {
                Some((value, typ)) => {
                    debug!(%dest, %value, "constant folded");
                    Instr::Const { dest, typ, value }
                }
                None => instr,
            };
        }

        // Partial evaluation: a single known false short-circuits `and`, a
        // single known true short-circuits `or`.
        if matches!(op, Op::And | Op::Or) {
            for arg in args {
                if let Some(Literal::Bool(b)) = self.known_literal(arg) {
                    if (op == Op::And && !b) || (op == Op::Or && b) {
                        return Instr::Const {
                            dest,
                            typ: Type::boolean(),
                            value: Literal::Bool(b),
                        };
                    }
                }
            }
            return instr;
        }

        // Comparisons of a variable against itself, before any renaming.
        if args.windows(2).all(|w| w[0] == w[1]) {
            let value = match op {
                Op::Eq | Op::Le | Op::Ge => Some(true),
                Op::Ne | Op::Lt | Op::Gt => Some(false),
                _ => None,
            };
            if let Some(value) = value {
                return Instr::Const {
                    dest,
                    typ: Type::boolean(),
                    value: Literal::Bool(value),
                };
            }
        }

        instr
    }

    fn known_literal(&self, arg: &str) -> Option<Literal> {
        let &num = self.env.get(arg)?;
        match &self.table[num].key {
            ValueKey::Const { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Evaluate an operation over literals. `None` keeps the instruction in its
/// original form.
fn fold(op: Op, args: &[Literal]) -> Option<(Literal, Type)> {
    use Literal::{Bool, Int};

    let value = match (op, args) {
        (Op::Add, [Int(x), Int(y)]) => Int(x.wrapping_add(*y)),
        (Op::Sub, [Int(x), Int(y)]) => Int(x.wrapping_sub(*y)),
        (Op::Mul, [Int(x), Int(y)]) => Int(x.wrapping_mul(*y)),
        // Division by zero is not folded.
        (Op::Div, [Int(_), Int(0)]) => return None,
        (Op::Div, [Int(x), Int(y)]) => Int(x.wrapping_div(*y)),
        (Op::Eq, [Int(x), Int(y)]) => Bool(x == y),
        (Op::Ne, [Int(x), Int(y)]) => Bool(x != y),
        (Op::Lt, [Int(x), Int(y)]) => Bool(x < y),
        (Op::Le, [Int(x), Int(y)]) => Bool(x <= y),
        (Op::Gt, [Int(x), Int(y)]) => Bool(x > y),
        (Op::Ge, [Int(x), Int(y)]) => Bool(x >= y),
        (Op::Eq, [Bool(x), Bool(y)]) => Bool(x == y),
        (Op::Ne, [Bool(x), Bool(y)]) => Bool(x != y),
        (Op::Not, [Bool(x)]) => Bool(!x),
        (Op::And, [Bool(x), Bool(y)]) => Bool(*x && *y),
        (Op::Or, [Bool(x), Bool(y)]) => Bool(*x || *y),
        _ => return None,
    };

    let typ = match value {
        Int(_) => Type::int(),
        Bool(_) => Type::boolean(),
    };
    Some((value, typ))
}

/// Run local value numbering over every block of a function.
pub fn run(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;
    let mut lvn = Lvn::new();
    let nodes: Vec<NodeIndex> = cfg.nodes().collect();
    for node in nodes {
        let instrs = std::mem::take(&mut cfg.block_mut(node).instrs);
        cfg.block_mut(node).instrs = lvn.process_block(instrs);
    }
    Ok(cfg.into_instrs())
}

/// Cross-block value numbering: a forward worklist pass whose state is the
/// set of values known on every incoming edge (meet = intersection).
pub fn run_extended(func: &Function) -> Result<Vec<Instr>, IrError> {
    let mut cfg = Cfg::from_function(func)?;

    let result = run_worklist(
        &cfg,
        None,
        intersect_known,
        |_, block, input: &HashSet<KnownValue>| {
            let mut lvn = Lvn::new();
            let slots = seeded_slots(input, &block.instrs);
            let processed = lvn.process_slots(slots);
            known_values(&processed)
        },
    );

    let nodes: Vec<NodeIndex> = cfg.nodes().collect();
    for node in nodes {
        let input = result.inputs.get(&node).cloned().unwrap_or_default();
        let instrs = std::mem::take(&mut cfg.block_mut(node).instrs);
        let mut lvn = Lvn::new();
        let processed = lvn.process_slots(seeded_slots(&input, &instrs));
        cfg.block_mut(node).instrs = processed
            .into_iter()
            .filter(|slot| !slot.transient)
            .map(|slot| slot.instr)
            .collect();
    }
    Ok(cfg.into_instrs())
}

fn intersect_known(states: Vec<&HashSet<KnownValue>>) -> HashSet<KnownValue> {
    let mut iter = states.into_iter();
    let mut merged = match iter.next() {
        Some(first) => first.clone(),
        None => return HashSet::new(),
    };
    for state in iter {
        merged.retain(|v| state.contains(v));
    }
    merged
}

/// Transient placeholders for the incoming values, followed by the real
/// block. Values whose destination the block redefines are not replayed:
/// their representative would be stripped with the placeholder while
/// rewritten uses still named it.
fn seeded_slots(input: &HashSet<KnownValue>, instrs: &[Instr]) -> Vec<Slot> {
    let redefined: HashSet<&str> = instrs.iter().filter_map(Instr::dest).collect();

    let mut seeds: Vec<&KnownValue> = input
        .iter()
        .filter(|v| {
            let dest = match v {
                KnownValue::Const { dest, .. } | KnownValue::Computed { dest, .. } => dest,
            };
            !redefined.contains(dest.as_str())
        })
        .collect();
    // Constants first so computed seeds can resolve them, then name order.
    seeds.sort_by_key(|v| match v {
        KnownValue::Const { dest, .. } => (0, dest.clone()),
        KnownValue::Computed { dest, .. } => (1, dest.clone()),
    });

    let mut slots: Vec<Slot> = seeds
        .into_iter()
        .map(|value| Slot {
            instr: match value.clone() {
                KnownValue::Const { dest, typ, value } => Instr::Const { dest, typ, value },
                KnownValue::Computed { op, dest, typ, args } => {
                    Instr::value(op, dest, typ, args)
                }
            },
            transient: true,
        })
        .collect();
    slots.extend(instrs.iter().cloned().map(|instr| Slot {
        instr,
        transient: false,
    }));
    slots
}

/// The value tuples a processed block makes available, transient seeds
/// included.
fn known_values(slots: &[Slot]) -> HashSet<KnownValue> {
    slots
        .iter()
        .filter_map(|slot| match &slot.instr {
            Instr::Const { dest, typ, value } => Some(KnownValue::Const {
                dest: dest.clone(),
                typ: typ.clone(),
                value: *value,
            }),
            Instr::Value {
                op,
                dest,
                typ,
                args,
                labels,
                ..
            } if !op.is_special() && labels.is_empty() => Some(KnownValue::Computed {
                op: *op,
                dest: dest.clone(),
                typ: typ.clone(),
                args: args.clone(),
            }),
            _ => None,
        })
        .collect()
}

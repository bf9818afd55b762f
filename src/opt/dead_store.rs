//! Dead-store elimination.
//!
//! After points-to analysis, the function is walked linearly with a map of
//! pending stores keyed by pointer variable. A pending store dies when the
//! same pointer is stored through again with nothing in between observing
//! the location, or when the function ends without one; it goes live (and
//! is kept) as soon as a load or any other use reaches the pointer or one
//! of its aliases. Pointer arithmetic counts as a potential write and
//! flushes. Stores through a pointer that may reference any location at
//! all (parameters, loaded pointers) are never candidates.
//!
//! The linear window is only trusted when the CFG has no back edges; in a
//! loopy function, end-of-walk pending stores are kept, since a back edge
//! can revisit a load that sits earlier in the layout.

use crate::cfg::{back_edges, Cfg, Dominators};
use crate::ir::{Function, Instr, IrError, Op};
use crate::opt::alias::AliasAnalysis;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub fn eliminate(func: &Function) -> Result<Vec<Instr>, IrError> {
    let cfg = Cfg::from_function(func)?;
    let doms = Dominators::compute(&cfg);
    let has_loops = !back_edges(&cfg, &doms).is_empty();
    let analysis = AliasAnalysis::run(func)?;

    // Pointer variable -> index of the store not yet observed.
    let mut pending: HashMap<String, usize> = HashMap::new();
    let mut dead: HashSet<usize> = HashSet::new();

    let flush = |pending: &mut HashMap<String, usize>, analysis: &AliasAnalysis, var: &str| {
        pending.remove(var);
        pending.retain(|p, _| !analysis.may_alias(p, var));
    };

    for (idx, instr) in func.instrs.iter().enumerate() {
        match instr.op() {
            Some(Op::Store) => {
                let [pointer, value] = instr.args() else {
                    return Err(IrError::Malformed(format!(
                        "store with {} arguments",
                        instr.args().len()
                    )));
                };
                // The stored value is an ordinary use of that variable.
                flush(&mut pending, &analysis, value);

                if analysis.may_point_anywhere(pointer) {
                    // Never a candidate, and too opaque to kill others.
                    continue;
                }
                if let Some(prev) = pending.insert(pointer.clone(), idx) {
                    // Overwritten through the same pointer, never observed.
                    debug!(function = %func.name, %pointer, "store is overwritten unseen");
                    dead.insert(prev);
                }
            }
            Some(Op::Load) => {
                let pointer = instr.args().first().map(String::as_str).unwrap_or_default();
                if analysis.may_point_anywhere(pointer) {
                    pending.clear();
                } else {
                    flush(&mut pending, &analysis, pointer);
                }
                if let Some(dest) = instr.dest() {
                    pending.remove(dest);
                }
            }
            Some(Op::PtrAdd) => {
                // A potential write through the source pointer.
                if let Some(pointer) = instr.args().first() {
                    flush(&mut pending, &analysis, pointer);
                }
                if let Some(dest) = instr.dest() {
                    pending.remove(dest);
                }
            }
            _ => {
                for arg in instr.args() {
                    flush(&mut pending, &analysis, arg);
                }
                if let Some(dest) = instr.dest() {
                    // Redefinition: the old pointer value is gone; keep its
                    // store but stop tracking it.
                    pending.remove(dest);
                }
            }
        }
    }

    if !has_loops {
        dead.extend(pending.into_values());
    }

    Ok(func
        .instrs
        .iter()
        .enumerate()
        .filter(|(idx, _)| !dead.contains(idx))
        .map(|(_, instr)| instr.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::testutil::*;
    use crate::ir::{Param, Type};

    fn ptr_int() -> Type {
        Type::Ptr {
            ptr: Box::new(Type::int()),
        }
    }

    fn alloc(dest: &str, size: &str) -> Instr {
        Instr::Value {
            op: Op::Alloc,
            dest: dest.to_string(),
            typ: ptr_int(),
            args: vec![size.to_string()],
            labels: vec![],
            funcs: vec![],
        }
    }

    fn store(pointer: &str, value: &str) -> Instr {
        Instr::Effect {
            op: Op::Store,
            args: vec![pointer.to_string(), value.to_string()],
            labels: vec![],
            funcs: vec![],
        }
    }

    fn load(dest: &str, pointer: &str) -> Instr {
        Instr::value(Op::Load, dest, Type::int(), vec![pointer.to_string()])
    }

    fn print_of(var: &str) -> Instr {
        Instr::Effect {
            op: Op::Print,
            args: vec![var.to_string()],
            labels: vec![],
            funcs: vec![],
        }
    }

    #[test]
    fn test_overwritten_store_is_removed() {
        let f = func(
            "overwrite",
            vec![
                konst("one", 1),
                konst("v1", 10),
                konst("v2", 20),
                alloc("p", "one"),
                store("p", "v1"),
                store("p", "v2"),
                load("w", "p"),
                print_of("w"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        let stores: Vec<&Instr> = out.iter().filter(|i| i.op() == Some(Op::Store)).collect();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].args()[1], "v2");
    }

    #[test]
    fn test_observed_store_is_kept() {
        let f = func(
            "observed",
            vec![
                konst("one", 1),
                konst("v1", 10),
                konst("v2", 20),
                alloc("p", "one"),
                store("p", "v1"),
                load("w", "p"),
                store("p", "v2"),
                load("x", "p"),
                print_of("w"),
                print_of("x"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 2);
    }

    #[test]
    fn test_load_through_alias_keeps_store() {
        let f = func(
            "aliased",
            vec![
                konst("one", 1),
                konst("v1", 10),
                alloc("p", "one"),
                Instr::value(Op::Id, "q", ptr_int(), vec!["p".to_string()]),
                store("p", "v1"),
                load("w", "q"),
                print_of("w"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 1);
    }

    #[test]
    fn test_trailing_unobserved_store_is_removed() {
        let f = func(
            "trailing",
            vec![
                konst("one", 1),
                konst("v1", 10),
                alloc("p", "one"),
                store("p", "v1"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 0);
    }

    #[test]
    fn test_store_through_parameter_is_never_removed() {
        let mut f = func(
            "param",
            vec![konst("v1", 10), store("ext", "v1"), ret()],
        );
        f.args = vec![Param {
            name: "ext".to_string(),
            typ: ptr_int(),
        }];
        let out = eliminate(&f).unwrap();
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 1);
    }

    #[test]
    fn test_ptradd_flushes_pending_store() {
        let f = func(
            "ptradd",
            vec![
                konst("one", 1),
                konst("v1", 10),
                alloc("p", "one"),
                store("p", "v1"),
                Instr::value(Op::PtrAdd, "q", ptr_int(), vec!["p".to_string(), "one".to_string()]),
                store("q", "v1"),
                load("w", "q"),
                print_of("w"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        // The first store survives: ptradd counts as a potential write.
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 2);
    }

    #[test]
    fn test_loops_disable_trailing_removal() {
        let f = func(
            "loopy",
            vec![
                konst("one", 1),
                konst("v1", 10),
                alloc("p", "one"),
                label("header"),
                load("w", "p"),
                print_of("w"),
                store("p", "v1"),
                konst("cond", 1),
                br("cond", "header", "done"),
                label("done"),
                ret(),
            ],
        );
        let out = eliminate(&f).unwrap();
        // The store feeds the load on the next trip around the loop.
        assert_eq!(out.iter().filter(|i| i.op() == Some(Op::Store)).count(), 1);
    }
}

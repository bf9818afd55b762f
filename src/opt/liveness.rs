//! Live-variable analysis.
//!
//! A backward may-analysis: state is the set of variable names live at a
//! program point, merge is set union, and the block transfer walks the
//! instructions in reverse, killing destinations and reviving arguments.
//! It runs on a CFG built with the reverse flag, so the worklist engine's
//! `inputs` map is the live-*out* set of each block in forward terms and
//! `outputs` is the live-in set.

use crate::cfg::Cfg;
use crate::dataflow::{run_worklist, DataflowResult};
use std::collections::HashSet;

pub type LiveSet = HashSet<String>;

/// Compute per-block live variable sets over a reverse-built CFG.
///
/// Exits (predecessor-less in the reverse graph) are seeded empty.
pub fn live_variables(rcfg: &Cfg) -> DataflowResult<LiveSet> {
    debug_assert!(rcfg.is_reversed());

    run_worklist(
        rcfg,
        None,
        |states: Vec<&LiveSet>| {
            let mut merged = LiveSet::new();
            for state in states {
                merged.extend(state.iter().cloned());
            }
            merged
        },
        |_, block, live_out: &LiveSet| {
            let mut live = live_out.clone();
            for instr in block.instrs.iter().rev() {
                if let Some(dest) = instr.dest() {
                    live.remove(dest);
                }
                for arg in instr.args() {
                    live.insert(arg.clone());
                }
            }
            live
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::testutil::*;
    use crate::cfg::Cfg;
    use crate::ir::{Instr, Op, Type};

    fn print_of(var: &str) -> Instr {
        Instr::Effect {
            op: Op::Print,
            args: vec![var.to_string()],
            labels: vec![],
            funcs: vec![],
        }
    }

    #[test]
    fn test_straight_line_liveness() {
        let f = func(
            "straight",
            vec![
                konst("a", 1),
                jmp("next"),
                label("next"),
                print_of("a"),
                ret(),
            ],
        );
        let rcfg = Cfg::from_function_reversed(&f).unwrap();
        let start = rcfg.node_of("start").unwrap();
        let next = rcfg.node_of("next").unwrap();
        let result = live_variables(&rcfg);

        // `a` is live across the edge: out of start, into next.
        assert!(result.inputs[&start].contains("a"));
        assert!(result.outputs[&next].contains("a"));
        // Nothing is live into start.
        assert!(result.outputs[&start].is_empty());
    }

    #[test]
    fn test_dead_definition_is_not_live() {
        let f = func(
            "dead",
            vec![
                konst("a", 1),
                konst("unused", 9),
                jmp("next"),
                label("next"),
                print_of("a"),
                ret(),
            ],
        );
        let rcfg = Cfg::from_function_reversed(&f).unwrap();
        let start = rcfg.node_of("start").unwrap();
        let result = live_variables(&rcfg);

        assert!(result.inputs[&start].contains("a"));
        assert!(!result.inputs[&start].contains("unused"));
    }

    #[test]
    fn test_loop_carried_liveness() {
        let f = func(
            "loop",
            vec![
                konst("i", 0),
                label("header"),
                Instr::value(Op::Add, "i", Type::int(), vec!["i".into(), "i".into()]),
                konst("cond", 1),
                br("cond", "header", "done"),
                label("done"),
                ret(),
            ],
        );
        let rcfg = Cfg::from_function_reversed(&f).unwrap();
        let header = rcfg.node_of("header").unwrap();
        let result = live_variables(&rcfg);

        // `i` feeds itself around the back edge, so it is live into the
        // header (`outputs` is live-in on a reversed CFG).
        assert!(result.outputs[&header].contains("i"));
    }
}

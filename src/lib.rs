// Prism: classical middle-end optimizer for a JSON three-address IR.
//
// Basic blocks, CFG and dominator analysis, SSA conversion, value
// numbering, a generic worklist dataflow engine, and the optimizing passes
// built on top of them.

pub mod bench;
pub mod cfg;
pub mod cli;
pub mod dataflow;
pub mod ir;
pub mod opt;
pub mod ssa;

pub use ir::{Function, Instr, IrError, Program};

//! Basic-block partitioning.
//!
//! A label starts a new block (emitting any accumulated instructions
//! first); a terminating operation ends the current block. The first block
//! of a function receives the synthetic label `start` when the source gives
//! it none; later unlabeled blocks (unreachable code after a terminator)
//! get fresh dot-prefixed names that can never collide with source labels.

use crate::ir::Instr;

/// Label given to an unlabeled leading block.
pub const START_LABEL: &str = "start";

/// A basic block: a run of instructions with a single entry and exit.
///
/// The label instruction itself is not stored; `labeled` records whether the
/// source carried one, so reassembly emits exactly the labels it was given.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub labeled: bool,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    /// The terminator, if the block ends in one.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|i| i.is_terminator())
    }
}

/// Partition a function's instruction list into basic blocks.
///
/// Empty blocks (a label immediately followed by another label contributes
/// a block with no instructions, which is kept so the label stays a valid
/// jump target; a trailing run with nothing in it is dropped).
pub fn partition(instrs: Vec<Instr>) -> Vec<BasicBlock> {
    let mut blocks: Vec<BasicBlock> = Vec::new();
    let mut current: Option<BasicBlock> = None;
    let mut anon = 0usize;

    let fresh = |blocks: &Vec<BasicBlock>, anon: &mut usize| -> BasicBlock {
        let label = if blocks.is_empty() {
            START_LABEL.to_string()
        } else {
            *anon += 1;
            format!(".anon{}", anon)
        };
        BasicBlock {
            label,
            labeled: false,
            instrs: Vec::new(),
        }
    };

    for instr in instrs {
        match instr {
            Instr::Label { label } => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(BasicBlock {
                    label,
                    labeled: true,
                    instrs: Vec::new(),
                });
            }
            other => {
                let block = current.get_or_insert_with(|| fresh(&blocks, &mut anon));
                let terminates = other.is_terminator();
                block.instrs.push(other);
                if terminates {
                    blocks.push(current.take().expect("block in progress"));
                }
            }
        }
    }

    if let Some(block) = current.take() {
        if block.labeled || !block.instrs.is_empty() {
            blocks.push(block);
        }
    }

    blocks
}

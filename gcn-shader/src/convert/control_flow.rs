//! Lowering of GCN basic blocks into structured SPIR-V control flow over the EXEC mask
//!: `S_ENDPGM` becomes a return, `S_CBRANCH_*` becomes a
//! structured selection or loop keyed on the branch's predicate, and divergent
//! branches are lowered as conditionals over EXEC rather than arbitrary jumps.

use crate::front::gcn::instruction::{Instruction, SOPP_S_BRANCH, SOPP_S_CBRANCH_EXECNZ, SOPP_S_CBRANCH_EXECZ, SOPP_S_CBRANCH_SCC0, SOPP_S_CBRANCH_SCC1, SOPP_S_CBRANCH_VCCNZ, SOPP_S_CBRANCH_VCCZ};
use crate::front::gcn::BasicBlock;

/// Which simulated predicate a conditional-branch terminator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Scc,
    Vccz,
    Execz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub predicate: Predicate,
    /// `true` if the branch is taken when the predicate is zero/false (the `Z`
    /// variants: `SCC0`, `VCCZ`, `EXECZ`).
    pub invert: bool,
    pub target_offset: i32,
}

/// Classify a basic block's terminator for the structured-control-flow lowering.
/// Returns `None` for unconditional fallthrough blocks that end in a non-branching
/// terminator other than `S_ENDPGM` (the converter treats those as program end too).
pub fn classify_terminator(block: &BasicBlock) -> Option<Branch> {
    let Instruction::Sopp { op, simm } = block.instructions.last()? else {
        return None;
    };
    let (predicate, invert) = match *op {
        SOPP_S_CBRANCH_SCC0 => (Predicate::Scc, true),
        SOPP_S_CBRANCH_SCC1 => (Predicate::Scc, false),
        SOPP_S_CBRANCH_VCCZ => (Predicate::Vccz, true),
        SOPP_S_CBRANCH_VCCNZ => (Predicate::Vccz, false),
        SOPP_S_CBRANCH_EXECZ => (Predicate::Execz, true),
        SOPP_S_CBRANCH_EXECNZ => (Predicate::Execz, false),
        SOPP_S_BRANCH => (Predicate::Execz, false), // unconditional: always taken
        _ => return None,
    };
    Some(Branch { predicate, invert, target_offset: *simm as i32 })
}

/// True when `block`'s terminator is an unconditional `S_BRANCH` (no predicate
/// evaluation needed, just a jump).
pub fn is_unconditional(block: &BasicBlock) -> bool {
    matches!(block.instructions.last(), Some(Instruction::Sopp { op, .. }) if *op == SOPP_S_BRANCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::gcn::decode_program;

    #[test]
    fn classifies_conditional_branch_on_vccz() {
        // S_CBRANCH_VCCZ with simm = -4, then S_ENDPGM.
        let words = [0xBF86_FFFCu32, 0xBF81_0000];
        let blocks = decode_program(&words, 0).unwrap();
        let branch = classify_terminator(&blocks[0]);
        assert_eq!(
            branch,
            Some(Branch { predicate: Predicate::Vccz, invert: true, target_offset: -4 })
        );
    }

    #[test]
    fn endpgm_has_no_branch_classification() {
        let words = [0xBF81_0000u32];
        let blocks = decode_program(&words, 0).unwrap();
        assert_eq!(classify_terminator(&blocks[0]), None);
    }
}

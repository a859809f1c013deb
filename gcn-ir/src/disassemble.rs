//! Text disassembly of a serialized word stream, used by `gpu-cli dis` and by shader
//! translation-failure diagnostics.

use crate::codec::deserialize;
use crate::ir::{Location, Type};
use std::fmt::Write as _;

/// Disassemble `words` into human-readable text. `show_ids` controls whether each line
/// is prefixed with its handle index (useful when cross-referencing a validation
/// error against a specific instruction).
pub fn disassemble(words: &[u32], show_ids: bool) -> String {
    let mut out = String::new();
    let Ok(Some(region)) = deserialize(words, Location::UNKNOWN) else {
        return "<malformed module>".to_string();
    };

    for cap in &region.capabilities {
        let _ = writeln!(out, "OpCapability {cap:?}");
    }
    for ext in &region.extensions {
        let _ = writeln!(out, "OpExtension \"{ext}\"");
    }
    if let Some((addr, model)) = region.memory_model {
        let _ = writeln!(out, "OpMemoryModel {addr:?} {model:?}");
    }
    for (handle, ty) in region.types.iter() {
        if show_ids {
            let _ = write!(out, "%{} = ", handle.index());
        }
        let _ = writeln!(out, "{}", describe_type(ty));
    }
    for (handle, _constant) in region.constants.iter() {
        if show_ids {
            let _ = write!(out, "%{} = ", handle.index());
        }
        let _ = writeln!(out, "OpConstant");
    }
    for entry in &region.entry_points {
        let _ = writeln!(
            out,
            "OpEntryPoint {:?} %{} \"{}\"",
            entry.model,
            entry.function.index(),
            entry.name
        );
    }
    for (handle, func) in region.functions.iter() {
        let _ = writeln!(
            out,
            "%{} = OpFunction {}",
            handle.index(),
            func.name.as_deref().unwrap_or("<anonymous>")
        );
        let _ = writeln!(out, "OpFunctionEnd");
    }
    out
}

fn describe_type(ty: &Type) -> String {
    match ty {
        Type::Void => "OpTypeVoid".to_string(),
        Type::Bool => "OpTypeBool".to_string(),
        Type::Int { width, signed } => format!("OpTypeInt {width} {}", *signed as u32),
        Type::Float { width } => format!("OpTypeFloat {width}"),
        Type::Vector { scalar, size } => format!("OpTypeVector %{} {size}", scalar.index()),
        Type::Matrix { column, columns } => format!("OpTypeMatrix %{} {columns}", column.index()),
        Type::Array { element, count } => {
            format!("OpTypeArray %{} {}", element.index(), count.unwrap_or(0))
        }
        Type::Struct { members } => {
            let fields: Vec<String> = members.iter().map(|m| format!("%{}", m.index())).collect();
            format!("OpTypeStruct {}", fields.join(" "))
        }
        Type::Pointer { pointee, storage } => {
            format!("OpTypePointer {storage:?} %{}", pointee.index())
        }
        Type::Image { dim, .. } => format!("OpTypeImage {dim:?}"),
        Type::SampledImage { image } => format!("OpTypeSampledImage %{}", image.index()),
        Type::Sampler => "OpTypeSampler".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::serialize;
    use crate::context::Context;

    #[test]
    fn disassembles_a_minimal_module() {
        let mut ctx = Context::new();
        ctx.type_void();
        ctx.type_float(32);
        let words = serialize(&ctx.region);
        let text = disassemble(&words, false);
        assert!(text.contains("OpTypeVoid"));
        assert!(text.contains("OpTypeFloat 32"));
    }

    #[test]
    fn malformed_words_produce_a_placeholder() {
        assert_eq!(disassemble(&[1, 2, 3], false), "<malformed module>");
    }
}

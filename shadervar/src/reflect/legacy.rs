//! Shader model 2/3 reflection
//!
//! Legacy bytecode has no notion of constant buffers: every constant lives in
//! a flat float4 register file. The buffer layout reflected from the shader
//! model 4 build is used as a template, and each buffer is mapped onto the
//! register range its constants occupy. A buffer's size is the register gap to
//! the next non-empty buffer (or the end of its last constant).

use super::ctab::{ConstantTable, ParameterClass, ParameterType};
use super::stats::InstructionCounts;
use super::{ReflectionData, SamplerInfo, ShaderReflector, TextureInfo};
use crate::{Error, Result};

/// Bytes in one float4 register
const REGISTER_SIZE: u32 = 16;

/// Largest register offset or count whose byte value fits in 16 bits
const MAX_REGISTER: u32 = u16::MAX as u32 / REGISTER_SIZE;

/// Reflects legacy bytecode through its constant table
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyReflector;

impl ShaderReflector for LegacyReflector {
    fn fill(&self, bytecode: &[u8], data: &mut ReflectionData) -> Result<()> {
        data.samplers.clear();
        data.textures.clear();

        if bytecode.is_empty() {
            return Err(Error::Reflection("bytecode is empty".into()));
        }

        let table = ConstantTable::from_bytecode(bytecode)?;
        map_buffers(&table, data)?;
        map_samplers(&table, data);
        Ok(())
    }

    fn instruction_counts(&self, _bytecode: &[u8], listing: Option<&str>) -> Option<InstructionCounts> {
        listing.and_then(InstructionCounts::from_listing)
    }
}

fn map_buffers(table: &ConstantTable, data: &mut ReflectionData) -> Result<()> {
    let mut buffer_offset = 0u32;
    let mut previous_non_empty: Option<usize> = None;

    for buffer_index in 0..data.buffers.len() {
        if data.buffers[buffer_index].constants.is_empty() {
            data.buffers[buffer_index].size = 0;
            continue;
        }

        for constant_index in 0..data.buffers[buffer_index].constants.len() {
            let buffer_name = &data.buffers[buffer_index].name;
            let constant_name = &data.buffers[buffer_index].constants[constant_index].name;

            let desc = table.find(constant_name).ok_or_else(|| {
                Error::Reflection(format!(
                    "constant \"{constant_name}\" of buffer \"{buffer_name}\" is missing from the constant table"
                ))
            })?;
            let register = u32::from(desc.register_index);
            let count = u32::from(desc.register_count);

            if constant_index == 0 {
                if let Some(previous) = previous_non_empty {
                    if register > MAX_REGISTER {
                        return Err(Error::overflow(
                            format!("Register offset of constant buffer \"{buffer_name}\""),
                            register,
                            MAX_REGISTER,
                        ));
                    }
                    // `register` is the first register of this buffer; the previous one ends here
                    let previous_size = register.saturating_sub(buffer_offset) * REGISTER_SIZE;
                    data.buffers[previous].size = previous_size as u16;
                    buffer_offset = register;
                } else {
                    buffer_offset = 0;
                }
                previous_non_empty = Some(buffer_index);
            }

            let buffer_name = &data.buffers[buffer_index].name;
            let constant_name = &data.buffers[buffer_index].constants[constant_index].name;

            if register < buffer_offset {
                return Err(Error::Reflection(format!(
                    "register {register} of constant \"{constant_name}\" is below the start of buffer \
                     \"{buffer_name}\" ({buffer_offset})"
                )));
            }

            let relative = register - buffer_offset;
            if relative > MAX_REGISTER {
                return Err(Error::overflow(
                    format!("Register offset of constant \"{constant_name}\" in buffer \"{buffer_name}\""),
                    relative,
                    MAX_REGISTER,
                ));
            }
            if count > MAX_REGISTER {
                return Err(Error::overflow(
                    format!("Register count of constant \"{constant_name}\""),
                    count,
                    MAX_REGISTER,
                ));
            }
            if relative + count > MAX_REGISTER {
                return Err(Error::overflow(
                    format!("Register range of constant \"{constant_name}\""),
                    relative + count,
                    MAX_REGISTER,
                ));
            }

            let size = (count * REGISTER_SIZE) as u16;
            let single_row_float = matches!(desc.class, ParameterClass::Scalar | ParameterClass::Vector)
                && desc.ty == ParameterType::Float
                && desc.rows == 1;
            let used_size = if single_row_float {
                (u32::from(desc.columns) * 4).min(u32::from(size)) as u16
            } else {
                size
            };

            let constant = &mut data.buffers[buffer_index].constants[constant_index];
            constant.offset = (relative * REGISTER_SIZE) as u16;
            constant.size = size;
            constant.used_size = used_size;
        }
    }

    if let Some(last) = previous_non_empty {
        let buffer = &mut data.buffers[last];
        if let Some(constant) = buffer.constants.last() {
            buffer.size = constant.offset.saturating_add(constant.size);
        }
    }

    Ok(())
}

/// Legacy shaders pair samplers and textures one to one. The compiler names a
/// combined sampler `state+texture` when both are declared separately.
fn map_samplers(table: &ConstantTable, data: &mut ReflectionData) {
    for sampler in table.samplers() {
        let (sampler_name, texture_name) = sampler
            .name
            .split_once('+')
            .unwrap_or((sampler.name.as_str(), sampler.name.as_str()));

        data.samplers.push(SamplerInfo {
            name: sampler_name.to_string(),
            bind_index: sampler.register_index,
        });
        data.textures.push(TextureInfo {
            name: texture_name.to_string(),
            bind_index: sampler.register_index,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::testdata::{CtabBuilder, CtabEntry};
    use crate::reflect::{BufferInfo, ConstantInfo};
    use pretty_assertions::assert_eq;

    fn seed(buffers: &[(&str, &[&str])]) -> ReflectionData {
        ReflectionData {
            buffers: buffers
                .iter()
                .enumerate()
                .map(|(i, (name, constants))| BufferInfo {
                    name: name.to_string(),
                    constants: constants
                        .iter()
                        .map(|c| ConstantInfo { name: c.to_string(), ..Default::default() })
                        .collect(),
                    index: i as u16,
                    size: 0xFFFF,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn constant(name: &str, offset: u16, size: u16, used_size: u16) -> ConstantInfo {
        ConstantInfo { name: name.into(), offset, size, used_size }
    }

    #[test]
    fn test_register_layout() {
        let bytecode = CtabBuilder::pixel()
            .constant(CtabEntry::float("viewProj", 0, 4).matrix(4, 4))
            .constant(CtabEntry::float("time", 4, 1).scalar())
            .constant(CtabEntry::float("tint", 6, 1).vector(1, 3))
            .constant(CtabEntry::float("flags", 7, 1).vector(1, 4).ty(2))
            .build();

        let mut data = seed(&[
            ("PerFrame", &["viewProj", "time"][..]),
            ("Empty", &[][..]),
            ("PerObject", &["tint", "flags"][..]),
        ]);
        LegacyReflector.fill(&bytecode, &mut data).unwrap();

        assert_eq!(data.buffers[0].size, 6 * 16, "gap up to the next non-empty buffer");
        assert_eq!(
            data.buffers[0].constants,
            vec![constant("viewProj", 0, 64, 64), constant("time", 64, 16, 4)]
        );
        assert_eq!(data.buffers[1].size, 0);
        assert_eq!(
            data.buffers[2].constants,
            vec![constant("tint", 0, 16, 12), constant("flags", 16, 16, 16)]
        );
        assert_eq!(data.buffers[2].size, 32, "last buffer ends with its last constant");
    }

    #[test]
    fn test_split_sampler_names() {
        let bytecode = CtabBuilder::pixel()
            .constant(CtabEntry::sampler("Shadow", 2))
            .constant(CtabEntry::sampler("Linear+Diffuse", 0))
            .build();

        let mut data = ReflectionData::default();
        LegacyReflector.fill(&bytecode, &mut data).unwrap();

        assert_eq!(
            data.samplers,
            vec![
                SamplerInfo { name: "Linear".into(), bind_index: 0 },
                SamplerInfo { name: "Shadow".into(), bind_index: 2 },
            ]
        );
        assert_eq!(
            data.textures,
            vec![
                TextureInfo { name: "Diffuse".into(), bind_index: 0 },
                TextureInfo { name: "Shadow".into(), bind_index: 2 },
            ]
        );
    }

    #[test]
    fn test_missing_constant() {
        let bytecode = CtabBuilder::vertex().constant(CtabEntry::float("a", 0, 1)).build();
        let mut data = seed(&[("Globals", &["a", "b"][..])]);
        assert!(matches!(LegacyReflector.fill(&bytecode, &mut data), Err(Error::Reflection(_))));
    }

    #[test]
    fn test_register_range_overflow() {
        let bytecode = CtabBuilder::vertex()
            .constant(CtabEntry::float("bones", 4000, 200))
            .build();
        let mut data = seed(&[("Skinning", &["bones"][..])]);
        assert!(matches!(LegacyReflector.fill(&bytecode, &mut data), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_empty_bytecode_is_rejected() {
        let mut data = seed(&[("Globals", &["a"][..])]);
        data.samplers.push(SamplerInfo::default());
        let result = LegacyReflector.fill(&[], &mut data);
        assert!(matches!(result, Err(Error::Reflection(_))));
        assert!(data.samplers.is_empty());
    }

    #[test]
    fn test_listing_counts() {
        let listing = "// approximately 5 instruction slots used (1 texture, 4 arithmetic)";
        let counts = LegacyReflector.instruction_counts(&[], Some(listing)).unwrap();
        assert_eq!((counts.total, counts.alu, counts.texture), (5, 4, 1));
        assert_eq!(LegacyReflector.instruction_counts(&[], None), None);
    }
}

//! Shader model 4 reflection

use super::container::{CHUNK_RDEF, CHUNK_STAT, DxbcContainer};
use super::rdef::{ResourceDefinitions, ResourceType};
use super::stats::InstructionCounts;
use super::{BufferInfo, ConstantInfo, ReflectionData, SamplerInfo, ShaderReflector, TextureInfo, check_u16};
use crate::{Error, Result};

/// Reflects DXBC containers through their `RDEF` chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernReflector;

impl ShaderReflector for ModernReflector {
    fn fill(&self, bytecode: &[u8], data: &mut ReflectionData) -> Result<()> {
        data.clear();

        let container = DxbcContainer::parse(bytecode)?;
        let rdef = container
            .chunk(CHUNK_RDEF)
            .ok_or_else(|| Error::Reflection("bytecode has no RDEF chunk".into()))?;
        let defs = ResourceDefinitions::parse(rdef)?;

        for (buffer_index, buffer) in defs.constant_buffers.iter().enumerate() {
            let index = check_u16(|| "Constant buffer count".into(), buffer_index as u32)?;
            let size = check_u16(|| format!("Size of constant buffer \"{}\"", buffer.name), buffer.size)?;

            let mut constants = Vec::with_capacity(buffer.variables.len());
            for variable in &buffer.variables {
                let offset = check_u16(
                    || format!("Offset of constant \"{}\" in buffer \"{}\"", variable.name, buffer.name),
                    variable.start_offset,
                )?;
                let size = check_u16(
                    || format!("Size of constant \"{}\" in buffer \"{}\"", variable.name, buffer.name),
                    variable.size,
                )?;

                constants.push(ConstantInfo {
                    name: variable.name.clone(),
                    offset,
                    size,
                    used_size: size,
                });
            }

            data.buffers.push(BufferInfo {
                name: buffer.name.clone(),
                constants,
                index,
                size,
            });
        }

        for binding in &defs.bound_resources {
            match binding.kind {
                ResourceType::Sampler => {
                    let bind_index =
                        check_u16(|| format!("Bind point of sampler \"{}\"", binding.name), binding.bind_point)?;
                    data.samplers.push(SamplerInfo {
                        name: binding.name.clone(),
                        bind_index,
                    });
                }
                ResourceType::Texture => {
                    let bind_index =
                        check_u16(|| format!("Bind point of texture \"{}\"", binding.name), binding.bind_point)?;
                    data.textures.push(TextureInfo {
                        name: binding.name.clone(),
                        bind_index,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn instruction_counts(&self, bytecode: &[u8], _listing: Option<&str>) -> Option<InstructionCounts> {
        let container = DxbcContainer::parse(bytecode).ok()?;
        InstructionCounts::from_stat_chunk(container.chunk(CHUNK_STAT)?).ok()
    }
}

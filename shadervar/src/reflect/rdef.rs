//! Resource definition (RDEF) chunk parsing

use super::container::{read_cstr, read_u32};
use crate::Result;

/// Size of a cbuffer record
const CBUFFER_SIZE: usize = 24;
/// Size of a variable record before shader model 5
const VARIABLE_SIZE_SM4: usize = 24;
/// Size of a variable record from shader model 5 on
const VARIABLE_SIZE_SM5: usize = 40;
/// Size of a bound resource record before shader model 5.1
const BINDING_SIZE: usize = 32;
/// Size of a bound resource record from shader model 5.1 on (adds space and id)
const BINDING_SIZE_SM51: usize = 40;

/// Bound resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResourceType {
    /// Constant buffer (cbuffer)
    CBuffer = 0,
    /// Texture buffer (tbuffer)
    TBuffer = 1,
    /// Texture
    Texture = 2,
    /// Sampler
    Sampler = 3,
    /// Any other resource (UAVs, structured and byte address buffers)
    Other = 0xFFFF_FFFF,
}

impl From<u32> for ResourceType {
    fn from(value: u32) -> Self {
        match value {
            0 => ResourceType::CBuffer,
            1 => ResourceType::TBuffer,
            2 => ResourceType::Texture,
            3 => ResourceType::Sampler,
            _ => ResourceType::Other,
        }
    }
}

/// Variable of a constant buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefVariable {
    pub name: String,
    /// Byte offset within the buffer
    pub start_offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Constant buffer description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefBuffer {
    pub name: String,
    /// Size in bytes
    pub size: u32,
    pub variables: Vec<RdefVariable>,
}

/// Bound resource description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResource {
    pub name: String,
    pub kind: ResourceType,
    /// First bind register
    pub bind_point: u32,
    /// Number of contiguous registers
    pub bind_count: u32,
}

/// Parsed RDEF chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDefinitions {
    /// Target version token (program type in the high word)
    pub target: u32,
    pub constant_buffers: Vec<RdefBuffer>,
    pub bound_resources: Vec<BoundResource>,
}

impl ResourceDefinitions {
    /// Major shader model of the target.
    pub fn major_version(&self) -> u32 {
        (self.target >> 8) & 0xFF
    }

    /// Minor shader model of the target.
    pub fn minor_version(&self) -> u32 {
        self.target & 0xFF
    }

    /// Parses the data of an RDEF chunk. All offsets are relative to `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let cbuffer_count = read_u32(data, 0)? as usize;
        let cbuffer_offset = read_u32(data, 4)? as usize;
        let binding_count = read_u32(data, 8)? as usize;
        let binding_offset = read_u32(data, 12)? as usize;
        let target = read_u32(data, 16)?;

        let mut defs = ResourceDefinitions {
            target,
            ..Default::default()
        };
        let major = defs.major_version();
        let minor = defs.minor_version();

        let variable_size = if major >= 5 { VARIABLE_SIZE_SM5 } else { VARIABLE_SIZE_SM4 };
        let binding_size = if major > 5 || (major == 5 && minor >= 1) {
            BINDING_SIZE_SM51
        } else {
            BINDING_SIZE
        };

        for i in 0..cbuffer_count {
            let base = cbuffer_offset + i * CBUFFER_SIZE;
            let name = read_cstr(data, read_u32(data, base)? as usize)?;
            let variable_count = read_u32(data, base + 4)? as usize;
            let variable_offset = read_u32(data, base + 8)? as usize;
            let size = read_u32(data, base + 12)?;

            let mut variables = Vec::with_capacity(variable_count.min(256));
            for v in 0..variable_count {
                let var_base = variable_offset + v * variable_size;
                variables.push(RdefVariable {
                    name: read_cstr(data, read_u32(data, var_base)? as usize)?,
                    start_offset: read_u32(data, var_base + 4)?,
                    size: read_u32(data, var_base + 8)?,
                });
            }

            defs.constant_buffers.push(RdefBuffer { name, size, variables });
        }

        for i in 0..binding_count {
            let base = binding_offset + i * binding_size;
            defs.bound_resources.push(BoundResource {
                name: read_cstr(data, read_u32(data, base)? as usize)?,
                kind: ResourceType::from(read_u32(data, base + 4)?),
                bind_point: read_u32(data, base + 20)?,
                bind_count: read_u32(data, base + 24)?,
            });
        }

        Ok(defs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::testdata::RdefBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_buffers_and_bindings() {
        let data = RdefBuilder::pixel(4, 0)
            .cbuffer("PerFrame", 80, &[("viewProj", 0, 64), ("time", 64, 4)])
            .cbuffer("PerObject", 16, &[("tint", 0, 16)])
            .binding("DiffuseSampler", 3, 0)
            .binding("DiffuseTexture", 2, 0)
            .binding("PerFrame", 0, 0)
            .build();

        let defs = ResourceDefinitions::parse(&data).unwrap();
        assert_eq!(defs.major_version(), 4);
        assert_eq!(defs.constant_buffers.len(), 2);
        assert_eq!(
            defs.constant_buffers[0].variables[1],
            RdefVariable { name: "time".into(), start_offset: 64, size: 4 }
        );
        assert_eq!(defs.constant_buffers[1].size, 16);

        let kinds: Vec<_> = defs.bound_resources.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, [ResourceType::Sampler, ResourceType::Texture, ResourceType::CBuffer]);
    }

    #[test]
    fn test_parse_sm5_layout() {
        let data = RdefBuilder::pixel(5, 0)
            .cbuffer("Globals", 32, &[("a", 0, 16), ("b", 16, 16)])
            .binding("Linear", 3, 2)
            .build();

        let defs = ResourceDefinitions::parse(&data).unwrap();
        assert_eq!(defs.constant_buffers[0].variables[1].name, "b");
        assert_eq!(defs.bound_resources[0].bind_point, 2);
    }

    #[test]
    fn test_truncated_chunk() {
        let data = RdefBuilder::pixel(4, 0).cbuffer("Globals", 16, &[("a", 0, 16)]).build();
        assert!(ResourceDefinitions::parse(&data[..30]).is_err());
    }
}

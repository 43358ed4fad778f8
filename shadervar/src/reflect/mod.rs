//! Shader reflection
//!
//! Compiled variants carry profile-agnostic reflection records: the constant
//! buffers a shader reads, and the samplers and textures it binds. Two parsers
//! produce them from bytecode:
//!
//! * [`ModernReflector`] reads the `RDEF` chunk of shader model 4 DXBC containers.
//! * [`LegacyReflector`] reads the constant table of shader model 2/3 bytecode,
//!   seeded with the buffer layout reflected from the shader model 4 build.
//!
//! # Example
//! ```
//! use shadervar::reflect::{BufferInfo, CompiledShaderData, ConstantInfo, ReflectionData};
//!
//! let mut data = CompiledShaderData::default();
//! data.reflection.buffers.push(BufferInfo {
//!     name: "PerFrame".into(),
//!     constants: vec![ConstantInfo { name: "time".into(), offset: 0, size: 4, used_size: 4 }],
//!     index: 0,
//!     size: 16,
//! });
//! data.bytecode = vec![0xDE, 0xAD];
//!
//! let bytes = data.write(false);
//! assert_eq!(CompiledShaderData::read(&bytes, false).unwrap(), data);
//! ```

mod container;
mod ctab;
mod legacy;
mod modern;
mod rdef;
mod stats;

#[cfg(test)]
pub(crate) mod testdata;

pub use container::DxbcContainer;
pub use ctab::{ConstantTable, CtabConstant, ParameterClass, ParameterType, RegisterSet};
pub use legacy::LegacyReflector;
pub use modern::ModernReflector;
pub use rdef::{BoundResource, RdefBuffer, RdefVariable, ResourceDefinitions, ResourceType};
pub use stats::InstructionCounts;

use crate::serialize::{BinarySerializer, Deserializer, Serialize, Serializer, serialize_vec};
use crate::target::ShaderProfile;
use crate::{Error, Result};

/// A single constant inside a constant buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantInfo {
    pub name: String,
    /// Byte offset within the buffer
    pub offset: u16,
    /// Register-aligned size in bytes
    pub size: u16,
    /// Bytes actually read by the shader (at most `size`)
    pub used_size: u16,
}

/// A constant buffer and its constants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub name: String,
    pub constants: Vec<ConstantInfo>,
    /// Buffer slot
    pub index: u16,
    /// Size in bytes
    pub size: u16,
}

/// A sampler binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerInfo {
    pub name: String,
    pub bind_index: u16,
}

/// A texture binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureInfo {
    pub name: String,
    pub bind_index: u16,
}

impl Serialize for ConstantInfo {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        s.serialize_u16(&mut self.offset);
        s.serialize_u16(&mut self.size);
        s.serialize_u16(&mut self.used_size);
    }
}

impl Serialize for BufferInfo {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        serialize_vec(s, &mut self.constants);
        s.serialize_u16(&mut self.index);
        s.serialize_u16(&mut self.size);
    }
}

impl Serialize for SamplerInfo {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        s.serialize_u16(&mut self.bind_index);
    }
}

impl Serialize for TextureInfo {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        s.serialize_u16(&mut self.bind_index);
    }
}

/// Reflection sets of one compiled shader
///
/// Empty sets mean the shader has no such inputs; they are never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflectionData {
    pub buffers: Vec<BufferInfo>,
    pub samplers: Vec<SamplerInfo>,
    pub textures: Vec<TextureInfo>,
}

impl ReflectionData {
    /// Empties all three sets.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.samplers.clear();
        self.textures.clear();
    }

    /// Returns true if all three sets are empty.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.samplers.is_empty() && self.textures.is_empty()
    }
}

impl Serialize for ReflectionData {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        serialize_vec(s, &mut self.buffers);
        serialize_vec(s, &mut self.samplers);
        serialize_vec(s, &mut self.textures);
    }
}

/// Contents of one variant slot: reflection followed by bytecode
///
/// Slot layout: cbuffer set, sampler set, texture set, zero padding to a
/// 4-byte boundary, then the bytecode up to the end of the slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledShaderData {
    pub reflection: ReflectionData,
    pub bytecode: Vec<u8>,
}

impl CompiledShaderData {
    /// Serializes the slot.
    pub fn write(&mut self, byte_swap: bool) -> Vec<u8> {
        let mut s = BinarySerializer::new();
        s.set_byte_swapping(byte_swap);
        s.begin_serialize();
        self.reflection.serialize(&mut s);
        s.align(4);
        s.write_raw(&self.bytecode);
        s.end_serialize();
        s.into_bytes()
    }

    /// Deserializes a slot.
    pub fn read(bytes: &[u8], byte_swap: bool) -> Result<Self> {
        let mut d = Deserializer::new(bytes);
        d.set_byte_swapping(byte_swap);
        d.begin_serialize();

        let mut reflection = ReflectionData::default();
        reflection.serialize(&mut d);
        if !d.end_serialize() {
            return Err(Error::StreamTruncated { offset: d.offset() });
        }

        let code_offset = d.offset().next_multiple_of(4);
        let bytecode = bytes.get(code_offset..).unwrap_or_default().to_vec();

        Ok(CompiledShaderData { reflection, bytecode })
    }
}

/// Reflection capability of a profile family
pub trait ShaderReflector {
    /// Fills `data` from `bytecode`.
    ///
    /// `data.buffers` may hold a layout reflected from another profile; legacy
    /// reflectors refine it in place. Outputs are unspecified on error.
    fn fill(&self, bytecode: &[u8], data: &mut ReflectionData) -> Result<()>;

    /// Instruction counts for trace output, from the bytecode or the compiler listing.
    fn instruction_counts(&self, bytecode: &[u8], listing: Option<&str>) -> Option<InstructionCounts>;
}

/// Returns the reflector for a profile.
pub fn reflector_for(profile: ShaderProfile) -> &'static dyn ShaderReflector {
    if profile.is_modern() { &ModernReflector } else { &LegacyReflector }
}

/// Checks that a reflected value fits its 16-bit storage.
pub(crate) fn check_u16(what: impl FnOnce() -> String, value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::overflow(what(), value, u16::MAX))
}

//! Legacy constant table (CTAB) parsing
//!
//! Shader model 2/3 bytecode is a stream of dword tokens. The constant table
//! lives in a comment token right after the version token:
//!
//! ```text
//! version | comment(len) 'CTAB' header constants[] types[] strings | ...
//! ```
//!
//! Offsets inside the table are relative to the first byte after `CTAB`.

use super::container::{read_cstr, read_u16, read_u32};
use crate::{Error, Result};

const CTAB_FOURCC: [u8; 4] = *b"CTAB";
const COMMENT_TOKEN: u32 = 0xFFFE;
const COMMENT_LENGTH_MASK: u32 = 0x7FFF;
const CONSTANT_INFO_SIZE: usize = 20;

/// Register set a constant is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RegisterSet {
    Bool = 0,
    Int4 = 1,
    Float4 = 2,
    Sampler = 3,
}

impl TryFrom<u16> for RegisterSet {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(RegisterSet::Bool),
            1 => Ok(RegisterSet::Int4),
            2 => Ok(RegisterSet::Float4),
            3 => Ok(RegisterSet::Sampler),
            other => Err(Error::InvalidContainer(format!("unknown register set {other}"))),
        }
    }
}

/// Parameter class (scalar, vector, matrix, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterClass {
    Scalar,
    Vector,
    MatrixRows,
    MatrixColumns,
    Object,
    Struct,
    Unknown(u16),
}

impl From<u16> for ParameterClass {
    fn from(value: u16) -> Self {
        match value {
            0 => ParameterClass::Scalar,
            1 => ParameterClass::Vector,
            2 => ParameterClass::MatrixRows,
            3 => ParameterClass::MatrixColumns,
            4 => ParameterClass::Object,
            5 => ParameterClass::Struct,
            other => ParameterClass::Unknown(other),
        }
    }
}

/// Parameter component type. Only the distinction float / not float matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Void,
    Bool,
    Int,
    Float,
    Other(u16),
}

impl From<u16> for ParameterType {
    fn from(value: u16) -> Self {
        match value {
            0 => ParameterType::Void,
            1 => ParameterType::Bool,
            2 => ParameterType::Int,
            3 => ParameterType::Float,
            other => ParameterType::Other(other),
        }
    }
}

/// One entry of the constant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtabConstant {
    pub name: String,
    pub register_set: RegisterSet,
    pub register_index: u16,
    pub register_count: u16,
    pub class: ParameterClass,
    pub ty: ParameterType,
    pub rows: u16,
    pub columns: u16,
}

/// Parsed legacy constant table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantTable {
    pub constants: Vec<CtabConstant>,
}

impl ConstantTable {
    /// Locates and parses the constant table in legacy bytecode.
    pub fn from_bytecode(bytecode: &[u8]) -> Result<Self> {
        let data = find_ctab(bytecode)?;
        Self::parse(data)
    }

    /// Parses constant table data (the bytes following the `CTAB` fourcc).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let constant_count = read_u32(data, 12)? as usize;
        let constant_offset = read_u32(data, 16)? as usize;

        let mut constants = Vec::with_capacity(constant_count.min(256));
        for i in 0..constant_count {
            let base = constant_offset + i * CONSTANT_INFO_SIZE;
            let name = read_cstr(data, read_u32(data, base)? as usize)?;
            let register_set = RegisterSet::try_from(read_u16(data, base + 4)?)?;
            let register_index = read_u16(data, base + 6)?;
            let register_count = read_u16(data, base + 8)?;
            let type_offset = read_u32(data, base + 12)? as usize;

            constants.push(CtabConstant {
                name,
                register_set,
                register_index,
                register_count,
                class: ParameterClass::from(read_u16(data, type_offset)?),
                ty: ParameterType::from(read_u16(data, type_offset + 2)?),
                rows: read_u16(data, type_offset + 4)?,
                columns: read_u16(data, type_offset + 6)?,
            });
        }

        Ok(ConstantTable { constants })
    }

    /// Looks up a constant by name.
    pub fn find(&self, name: &str) -> Option<&CtabConstant> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// Sampler constants ordered by register.
    pub fn samplers(&self) -> Vec<&CtabConstant> {
        let mut samplers: Vec<_> = self
            .constants
            .iter()
            .filter(|c| c.register_set == RegisterSet::Sampler)
            .collect();
        samplers.sort_by_key(|c| c.register_index);
        samplers
    }
}

/// Scans the comment tokens following the version token for the CTAB block.
fn find_ctab(bytecode: &[u8]) -> Result<&[u8]> {
    let mut offset = 4;
    loop {
        let token = read_u32(bytecode, offset)
            .map_err(|_| Error::Reflection("constant table not found".into()))?;
        if token & 0xFFFF != COMMENT_TOKEN {
            return Err(Error::Reflection("constant table not found".into()));
        }

        let length = ((token >> 16) & COMMENT_LENGTH_MASK) as usize * 4;
        let start = offset + 4;
        let comment = bytecode
            .get(start..start + length)
            .ok_or_else(|| Error::InvalidContainer("comment token extends past the end of the bytecode".into()))?;

        if let Some(data) = comment.strip_prefix(&CTAB_FOURCC[..]) {
            return Ok(data);
        }
        offset = start + length;
    }
}

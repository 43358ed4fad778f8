//! Shader stages and hardware profiles

use crate::flags::StageFlags;
use std::fmt;

/// Shader stage (vertex or pixel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Pixel (fragment) shader
    Pixel,
}

impl ShaderStage {
    /// Number of stages
    pub const COUNT: usize = 2;

    /// All stages in index order
    pub const ALL: [ShaderStage; Self::COUNT] = [ShaderStage::Vertex, ShaderStage::Pixel];

    /// Returns the stage index (vertex = 0, pixel = 1)
    pub fn index(&self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Pixel => 1,
        }
    }

    /// Returns the bit of this stage in a [`StageFlags`] mask
    pub fn mask(&self) -> StageFlags {
        StageFlags::from_bits_truncate(1 << self.index())
    }

    /// Returns the one-letter tag used in variant names
    pub fn tag(&self) -> char {
        match self {
            ShaderStage::Vertex => 'v',
            ShaderStage::Pixel => 'p',
        }
    }

    /// Parses a one-letter variant name tag
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'v' => Some(ShaderStage::Vertex),
            'p' => Some(ShaderStage::Pixel),
            _ => None,
        }
    }

    /// Returns the compiler target prefix (vs, ps)
    pub fn prefix(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Pixel => "ps",
        }
    }

    /// Returns the macro defined when compiling this stage
    pub fn macro_name(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "HELIUM_TYPE_VERTEX",
            ShaderStage::Pixel => "HELIUM_TYPE_PIXEL",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
        })
    }
}

/// PC hardware profile a variant is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderProfile {
    /// Shader model 2.0 vertex / 2.b pixel
    PcSm2b,
    /// Shader model 3.0
    PcSm3,
    /// Shader model 4.0
    PcSm4,
}

impl ShaderProfile {
    /// Number of PC profiles
    pub const COUNT: usize = 3;

    /// All profiles in index order
    pub const ALL: [ShaderProfile; Self::COUNT] =
        [ShaderProfile::PcSm2b, ShaderProfile::PcSm3, ShaderProfile::PcSm4];

    /// Returns the profile index used to lay out variant sub-data
    pub fn index(&self) -> usize {
        match self {
            ShaderProfile::PcSm2b => 0,
            ShaderProfile::PcSm3 => 1,
            ShaderProfile::PcSm4 => 2,
        }
    }

    /// Looks up a profile by index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the compiler target string for a stage (e.g. `ps_2_b`)
    pub fn target(&self, stage: ShaderStage) -> &'static str {
        match (self, stage) {
            (ShaderProfile::PcSm2b, ShaderStage::Vertex) => "vs_2_0",
            (ShaderProfile::PcSm2b, ShaderStage::Pixel) => "ps_2_b",
            (ShaderProfile::PcSm3, ShaderStage::Vertex) => "vs_3_0",
            (ShaderProfile::PcSm3, ShaderStage::Pixel) => "ps_3_0",
            (ShaderProfile::PcSm4, ShaderStage::Vertex) => "vs_4_0",
            (ShaderProfile::PcSm4, ShaderStage::Pixel) => "ps_4_0",
        }
    }

    /// Returns the profile macros, including the legacy alias of the lowest profile
    pub fn macros(&self) -> &'static [&'static str] {
        match self {
            ShaderProfile::PcSm2b => &["HELIUM_PROFILE_PC_SM2b", "HELIUM_PROFILE_PC_SM2"],
            ShaderProfile::PcSm3 => &["HELIUM_PROFILE_PC_SM3"],
            ShaderProfile::PcSm4 => &["HELIUM_PROFILE_PC_SM4"],
        }
    }

    /// Returns true for profiles reflected through structured (RDEF) reflection
    pub fn is_modern(&self) -> bool {
        *self >= ShaderProfile::PcSm4
    }
}

impl fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderProfile::PcSm2b => "pc_sm2b",
            ShaderProfile::PcSm3 => "pc_sm3",
            ShaderProfile::PcSm4 => "pc_sm4",
        })
    }
}

//! Stage, property, and compile flags

use bitflags::bitflags;

bitflags! {
    /// Set of shader stages an option applies to
    ///
    /// Bit `n` corresponds to the stage whose [`ShaderStage::index`] is `n`.
    ///
    /// [`ShaderStage::index`]: crate::ShaderStage::index
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;

        /// Pixel stage
        const PIXEL = 1 << 1;
    }
}

impl StageFlags {
    /// Parses the stage suffix of an option command (`v`, `p`, `vp`, ...).
    ///
    /// Unknown characters are ignored.
    pub fn from_tags(tags: &str) -> Self {
        tags.chars().fold(StageFlags::empty(), |flags, c| match c {
            'v' => flags | StageFlags::VERTEX,
            'p' => flags | StageFlags::PIXEL,
            _ => flags,
        })
    }
}

impl Default for StageFlags {
    fn default() -> Self {
        StageFlags::all()
    }
}

bitflags! {
    /// Flags attached to the property currently being serialized
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        /// Property only exists in editor builds and is skipped in binary streams
        const EDITOR_ONLY = 1 << 0;
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        PropertyFlags::empty()
    }
}

bitflags! {
    /// Compile flags understood by native shader compilers
    ///
    /// Bit values follow the D3DCOMPILE constants so they can be handed to a
    /// compiler that accepts them directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompileFlags: u32 {
        /// Insert debug information into the output
        const DEBUG = 1 << 0;

        /// Skip optimization passes
        const SKIP_OPTIMIZATION = 1 << 2;

        /// Pack matrices in row-major order
        const PACK_MATRIX_ROW_MAJOR = 1 << 3;

        /// Pack matrices in column-major order
        const PACK_MATRIX_COLUMN_MAJOR = 1 << 4;

        /// Optimization level 0
        const OPTIMIZATION_LEVEL0 = 1 << 14;

        /// Optimization level 1 (default)
        const OPTIMIZATION_LEVEL1 = 0;

        /// Optimization level 2
        const OPTIMIZATION_LEVEL2 = (1 << 14) | (1 << 15);

        /// Optimization level 3
        const OPTIMIZATION_LEVEL3 = 1 << 15;

        /// Treat warnings as errors
        const WARNINGS_ARE_ERRORS = 1 << 18;
    }
}

impl CompileFlags {
    /// Flags every variant is compiled with.
    pub const VARIANT: CompileFlags = CompileFlags::OPTIMIZATION_LEVEL3
        .union(CompileFlags::PACK_MATRIX_ROW_MAJOR)
        .union(CompileFlags::WARNINGS_ARE_ERRORS);

    /// Returns the optimization level (0-3) encoded in these flags.
    pub fn optimization_level(&self) -> u32 {
        let bits = self.bits() & CompileFlags::OPTIMIZATION_LEVEL2.bits();
        match bits {
            b if b == CompileFlags::OPTIMIZATION_LEVEL0.bits() => 0,
            b if b == CompileFlags::OPTIMIZATION_LEVEL2.bits() => 2,
            b if b == CompileFlags::OPTIMIZATION_LEVEL3.bits() => 3,
            _ => 1,
        }
    }
}

impl Default for CompileFlags {
    fn default() -> Self {
        CompileFlags::empty()
    }
}

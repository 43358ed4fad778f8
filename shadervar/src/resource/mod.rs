//! Runtime shader resources
//!
//! A [`Shader`] owns the option catalogs of one shader source and hands out
//! [`ShaderVariant`]s by stage and variant index. Everything here is driven by
//! non-blocking begin / try-finish pairs; callers poll until a load completes.
//!
//! Collaborators are consumed through narrow traits:
//!
//! * [`SubDataSource`] serves the per-slot byte buffers of one variant.
//! * [`RendererBackend`] turns bytecode into native shader objects.
//! * [`VariantLoader`] loads variant objects by path.
//! * [`VariantLoadOverride`] replaces the loader for a shader (e.g. to bake on demand).

mod loader;
mod shader;
mod variant;

pub use loader::{MemorySubData, PackageLoader};
pub use shader::{Shader, ShaderPersistentData};
pub use variant::{PrecacheState, ShaderVariant, VariantHeader};

use crate::target::{ShaderProfile, ShaderStage};
use crate::Result;
use std::fmt::Debug;
use std::sync::Arc;
use std::task::Poll;

/// Identifier of an in-flight asynchronous load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

impl LoadId {
    pub fn new(id: u64) -> Self {
        LoadId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A native shader object created by the renderer
pub trait RenderShader: Debug + Send + Sync {
    /// Stage the object was created for.
    fn stage(&self) -> ShaderStage;
}

/// Shared handle to a native shader object
pub type ShaderHandle = Arc<dyn RenderShader>;

/// Renderer backend that builds native shader objects
pub trait RendererBackend {
    /// Creates a vertex shader, or returns `None` if the bytecode is rejected.
    fn create_vertex_shader(&self, bytecode: &[u8]) -> Option<ShaderHandle>;

    /// Creates a pixel shader, or returns `None` if the bytecode is rejected.
    fn create_pixel_shader(&self, bytecode: &[u8]) -> Option<ShaderHandle>;

    /// Profile whose variant slots this renderer consumes.
    fn shader_profile(&self) -> ShaderProfile {
        ShaderProfile::PcSm4
    }

    /// Creates a shader for `stage`.
    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Option<ShaderHandle> {
        match stage {
            ShaderStage::Vertex => self.create_vertex_shader(bytecode),
            ShaderStage::Pixel => self.create_pixel_shader(bytecode),
        }
    }
}

/// Source of the persisted sub-data buffers of one object
pub trait SubDataSource {
    /// Size of sub-data buffer `index`, or `None` if it does not exist.
    fn sub_data_size(&self, index: usize) -> Option<usize>;

    /// Starts loading sub-data buffer `index`.
    fn begin_load_sub_data(&mut self, index: usize) -> Option<LoadId>;

    /// Polls a sub-data load. The load id is released once `Ready` is returned.
    fn try_finish_load_sub_data(&mut self, id: LoadId) -> Poll<Result<Vec<u8>>>;
}

/// Loads shader variant objects by path
pub trait VariantLoader {
    /// Starts loading the variant at `path`. Returns `None` if the load cannot start.
    fn begin_load_variant(&mut self, path: &str) -> Option<LoadId>;

    /// Polls a variant load. `Ready(None)` means the load failed.
    fn try_finish_load_variant(&mut self, id: LoadId) -> Poll<Option<Arc<ShaderVariant>>>;
}

/// Replacement for the variant loading mechanism of a [`Shader`]
///
/// Both halves are installed and removed together.
pub trait VariantLoadOverride {
    /// Starts producing the variant `index` of `stage` for the shader at `shader_path`.
    fn begin_load_variant(
        &mut self,
        shader_path: &str,
        data: &ShaderPersistentData,
        stage: ShaderStage,
        index: u32,
    ) -> Option<LoadId>;

    /// Polls a variant load. `Ready(None)` means the load failed.
    fn try_finish_load_variant(&mut self, id: LoadId) -> Poll<Option<Arc<ShaderVariant>>>;
}

//! Package-backed loaders

use super::{LoadId, RendererBackend, Shader, ShaderPersistentData, ShaderVariant, SubDataSource, VariantHeader, VariantLoader};
use crate::package::{ResourcePackage, package_path};
use crate::{Error, Result};
use log::{debug, error};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::Poll;

/// Sub-data served from memory, with simulated latency
///
/// Each load reports `Pending` for `latency` polls before completing.
#[derive(Debug, Clone, Default)]
pub struct MemorySubData {
    buffers: Vec<Vec<u8>>,
    latency: u32,
    pending: HashMap<LoadId, (usize, u32)>,
    next_id: u64,
}

impl MemorySubData {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        MemorySubData {
            buffers,
            ..Default::default()
        }
    }

    /// Sets the number of pending polls per load.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    /// Number of loads not yet finished.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl SubDataSource for MemorySubData {
    fn sub_data_size(&self, index: usize) -> Option<usize> {
        self.buffers.get(index).map(Vec::len)
    }

    fn begin_load_sub_data(&mut self, index: usize) -> Option<LoadId> {
        if index >= self.buffers.len() {
            return None;
        }
        let id = LoadId::new(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, (index, self.latency));
        Some(id)
    }

    fn try_finish_load_sub_data(&mut self, id: LoadId) -> Poll<Result<Vec<u8>>> {
        let Some((index, remaining)) = self.pending.get_mut(&id) else {
            return Poll::Ready(Err(Error::InvalidParameter(format!("unknown sub-data load {}", id.get()))));
        };

        if *remaining > 0 {
            *remaining -= 1;
            return Poll::Pending;
        }

        let index = *index;
        self.pending.remove(&id);
        Poll::Ready(Ok(self.buffers[index].clone()))
    }
}

struct VariantRequest {
    variant: ShaderVariant,
    source: MemorySubData,
}

/// Loads shaders and variants from resource packages
///
/// Packages are looked up among those inserted in memory first, then under
/// the root directory. Variants are precached against the configured
/// renderer before they are handed out.
///
/// # Example
/// ```no_run
/// use shadervar::resource::PackageLoader;
///
/// let loader = PackageLoader::new().root_dir("cache").sub_data_latency(1);
/// let shader = loader.load_shader("shaders/lit.hlsl")?;
/// # Ok::<(), shadervar::Error>(())
/// ```
#[derive(Default)]
pub struct PackageLoader {
    root: Option<PathBuf>,
    packages: HashMap<String, ResourcePackage>,
    renderer: Option<Arc<dyn RendererBackend>>,
    latency: u32,
    requests: HashMap<LoadId, VariantRequest>,
    next_id: u64,
}

impl PackageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory package files are read from.
    pub fn root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the simulated latency of sub-data loads, in polls.
    pub fn sub_data_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    /// Sets the renderer variants are precached for.
    pub fn renderer(mut self, renderer: Arc<dyn RendererBackend>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Makes a package available under `object_path`.
    pub fn insert_package(&mut self, object_path: impl Into<String>, package: ResourcePackage) {
        self.packages.insert(object_path.into(), package);
    }

    /// Number of variant loads in flight.
    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    fn package(&self, object_path: &str) -> Result<ResourcePackage> {
        if let Some(package) = self.packages.get(object_path) {
            return Ok(package.clone());
        }
        match &self.root {
            Some(root) => ResourcePackage::load(&package_path(root, object_path)),
            None => Err(Error::InvalidParameter(format!("no package for \"{object_path}\""))),
        }
    }

    /// Loads a shader and computes its variant counts.
    pub fn load_shader(&self, object_path: &str) -> Result<Shader> {
        let package = self.package(object_path)?;
        let mut data = ShaderPersistentData::default();
        package.read_object(&mut data, false)?;

        let mut shader = Shader::new(object_path, data);
        shader.finalize_load();
        Ok(shader)
    }

    fn start_variant(&self, path: &str) -> Result<VariantRequest> {
        let package = self.package(path)?;
        let mut header = VariantHeader::default();
        package.read_object(&mut header, false)?;

        let name = path.rsplit('/').next().unwrap_or(path);
        let mut variant = ShaderVariant::new(path, name);
        variant.load_persistent_data(header);

        let mut source = MemorySubData::new(package.sub_data).with_latency(self.latency);
        variant.begin_precache_resource_data(&mut source, self.renderer.as_deref())?;
        Ok(VariantRequest { variant, source })
    }
}

impl VariantLoader for PackageLoader {
    fn begin_load_variant(&mut self, path: &str) -> Option<LoadId> {
        let request = match self.start_variant(path) {
            Ok(request) => request,
            Err(err) => {
                error!("Failed to begin loading variant \"{}\": {}", path, err);
                return None;
            }
        };

        let id = LoadId::new(self.next_id);
        self.next_id += 1;
        debug!("Loading variant \"{}\" (load {})", path, id.get());
        self.requests.insert(id, request);
        Some(id)
    }

    fn try_finish_load_variant(&mut self, id: LoadId) -> Poll<Option<Arc<ShaderVariant>>> {
        let Some(request) = self.requests.get_mut(&id) else {
            error!("Unknown variant load {}", id.get());
            return Poll::Ready(None);
        };

        if !request
            .variant
            .try_finish_precache_resource_data(&mut request.source, self.renderer.as_deref())
        {
            return Poll::Pending;
        }

        Poll::Ready(self.requests.remove(&id).map(|request| Arc::new(request.variant)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sub_data_latency() {
        let mut source = MemorySubData::new(vec![vec![1, 2], Vec::new()]).with_latency(1);
        assert_eq!(source.sub_data_size(0), Some(2));
        assert_eq!(source.sub_data_size(1), Some(0));
        assert_eq!(source.sub_data_size(2), None);
        assert_eq!(source.begin_load_sub_data(2), None);

        let id = source.begin_load_sub_data(0).unwrap();
        assert!(source.try_finish_load_sub_data(id).is_pending());
        match source.try_finish_load_sub_data(id) {
            Poll::Ready(Ok(bytes)) => assert_eq!(bytes, [1, 2]),
            other => panic!("unexpected poll result: {other:?}"),
        }
        assert_eq!(source.pending_count(), 0);
        assert!(matches!(source.try_finish_load_sub_data(id), Poll::Ready(Err(_))));
    }

    #[test]
    fn test_missing_package() {
        let mut loader = PackageLoader::new();
        assert!(loader.load_shader("shaders/missing.hlsl").is_err());
        assert_eq!(loader.begin_load_variant("shaders/missing.hlsl/p0"), None);
        assert!(matches!(loader.try_finish_load_variant(LoadId::new(7)), Poll::Ready(None)));
    }

    #[test]
    fn test_load_shader_from_memory() {
        let mut data = ShaderPersistentData::from_source("lit.hlsl", "//! @toggle FOG\n//! @select_p LIGHT Lambert Phong\n");
        let mut loader = PackageLoader::new();
        loader.insert_package("lit.hlsl", ResourcePackage::from_object(&mut data, false));

        let shader = loader.load_shader("lit.hlsl").unwrap();
        assert_eq!(shader.variant_count(crate::ShaderStage::Pixel), 4);
        assert_eq!(shader.variant_count(crate::ShaderStage::Vertex), 2);
        assert!(shader.persistent_data().source.is_empty(), "source is editor-only");
    }

    #[test]
    fn test_variant_without_renderer_is_ready_at_once() {
        let mut header = VariantHeader { resource_count: 1, ..Default::default() };
        let mut package = ResourcePackage::from_object(&mut header, false);
        package.sub_data = vec![Vec::new(); 3];

        let mut loader = PackageLoader::new();
        loader.insert_package("lit.hlsl/v0", package);

        let id = loader.begin_load_variant("lit.hlsl/v0").unwrap();
        match loader.try_finish_load_variant(id) {
            Poll::Ready(Some(variant)) => {
                assert!(variant.is_ready());
                assert_eq!(variant.name(), "v0");
                assert_eq!(variant.resource_count(), 1);
            }
            other => panic!("unexpected poll result: {other:?}"),
        }
        assert_eq!(loader.pending_count(), 0);
    }
}

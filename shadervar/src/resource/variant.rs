//! Shader variant resource and its precache state machine

use super::{LoadId, RendererBackend, ShaderHandle, SubDataSource};
use crate::reflect::{BufferInfo, CompiledShaderData, ReflectionData, SamplerInfo, TextureInfo};
use crate::serialize::{ObjectRef, Serialize, Serializer};
use crate::target::ShaderStage;
use crate::{Error, Result};
use log::{error, warn};
use std::task::Poll;

/// Persistent header of a variant object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantHeader {
    /// Number of slots per profile (the system option set count)
    pub resource_count: u32,
    /// Owning shader
    pub shader: ObjectRef,
}

impl Serialize for VariantHeader {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_u32(&mut self.resource_count);
        s.serialize_object_ref(&mut self.shader);
    }
}

/// Precache progress of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecacheState {
    Unrequested,
    Precaching,
    Ready,
}

/// Transient per-slot load record
#[derive(Debug)]
struct SlotLoad {
    slot: usize,
    load_id: LoadId,
    size: usize,
}

/// One compiled shader permutation: a native shader and reflection per slot
///
/// Slot `i` holds the build for system option set `i`. Slots whose data is
/// missing, empty, or rejected by the renderer end up with no native shader and
/// empty reflection sets; the variant still becomes ready.
#[derive(Debug)]
pub struct ShaderVariant {
    path: String,
    name: String,
    header: VariantHeader,
    shaders: Vec<Option<ShaderHandle>>,
    reflection: Vec<ReflectionData>,
    loads: Vec<SlotLoad>,
    state: PrecacheState,
}

impl ShaderVariant {
    /// Creates an unloaded variant. `name` is the stage tag followed by the index (`p3`).
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        ShaderVariant {
            path: path.into(),
            name: name.into(),
            header: VariantHeader::default(),
            shaders: Vec::new(),
            reflection: Vec::new(),
            loads: Vec::new(),
            state: PrecacheState::Unrequested,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the deserialized persistent header.
    pub fn load_persistent_data(&mut self, header: VariantHeader) {
        self.header = header;
    }

    pub fn header(&self) -> &VariantHeader {
        &self.header
    }

    /// Number of slots.
    pub fn resource_count(&self) -> usize {
        self.header.resource_count as usize
    }

    /// Stage encoded in the first character of the name.
    pub fn stage(&self) -> Option<ShaderStage> {
        self.name.chars().next().and_then(ShaderStage::from_tag)
    }

    pub fn state(&self) -> PrecacheState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PrecacheState::Ready
    }

    /// Native shader of slot `index`, if one was created.
    pub fn render_resource(&self, index: usize) -> Option<&ShaderHandle> {
        self.shaders.get(index).and_then(Option::as_ref)
    }

    pub fn constant_buffers(&self, index: usize) -> &[BufferInfo] {
        self.reflection.get(index).map(|r| r.buffers.as_slice()).unwrap_or_default()
    }

    pub fn samplers(&self, index: usize) -> &[SamplerInfo] {
        self.reflection.get(index).map(|r| r.samplers.as_slice()).unwrap_or_default()
    }

    pub fn textures(&self, index: usize) -> &[TextureInfo] {
        self.reflection.get(index).map(|r| r.textures.as_slice()).unwrap_or_default()
    }

    /// Starts loading every slot.
    ///
    /// Succeeds without doing anything when there is no renderer. Slots are
    /// read from `source` at `profile * resource_count + slot`, where the
    /// profile is the renderer's. All slot loads are started before any is
    /// polled.
    pub fn begin_precache_resource_data(
        &mut self,
        source: &mut dyn SubDataSource,
        renderer: Option<&dyn RendererBackend>,
    ) -> Result<()> {
        let Some(renderer) = renderer else {
            self.state = PrecacheState::Ready;
            return Ok(());
        };

        if self.stage().is_none() {
            error!("Failed to determine the shader stage of variant \"{}\"", self.path);
            return Err(Error::InvalidVariantName(self.name.clone()));
        }

        let count = self.resource_count();
        let base = renderer.shader_profile().index() * count;

        self.shaders = vec![None; count];
        self.reflection = vec![ReflectionData::default(); count];
        self.loads.clear();

        for slot in 0..count {
            let index = base + slot;
            match source.sub_data_size(index) {
                None => {
                    error!(
                        "Failed to get the size of slot {} (sub-data {}) of variant \"{}\"",
                        slot, index, self.path
                    );
                }
                Some(0) => {}
                Some(size) => match source.begin_load_sub_data(index) {
                    Some(load_id) => self.loads.push(SlotLoad { slot, load_id, size }),
                    None => {
                        error!(
                            "Failed to begin loading slot {} (sub-data {}) of variant \"{}\"",
                            slot, index, self.path
                        );
                    }
                },
            }
        }

        self.state = PrecacheState::Precaching;
        Ok(())
    }

    /// Polls outstanding slot loads; returns true once the variant is ready.
    pub fn try_finish_precache_resource_data(
        &mut self,
        source: &mut dyn SubDataSource,
        renderer: Option<&dyn RendererBackend>,
    ) -> bool {
        match self.state {
            PrecacheState::Ready => return true,
            PrecacheState::Unrequested => return false,
            PrecacheState::Precaching => {}
        }

        let mut index = 0;
        while index < self.loads.len() {
            let load = &self.loads[index];
            match source.try_finish_load_sub_data(load.load_id) {
                Poll::Pending => index += 1,
                Poll::Ready(result) => {
                    let load = self.loads.swap_remove(index);
                    match result {
                        Ok(bytes) => self.finish_slot(&load, &bytes, renderer),
                        Err(err) => error!("Failed to load slot {} of variant \"{}\": {}", load.slot, self.path, err),
                    }
                }
            }
        }

        if !self.loads.is_empty() {
            return false;
        }

        self.loads = Vec::new();
        self.state = PrecacheState::Ready;
        true
    }

    fn finish_slot(&mut self, load: &SlotLoad, bytes: &[u8], renderer: Option<&dyn RendererBackend>) {
        if bytes.len() != load.size {
            warn!(
                "Slot {} of variant \"{}\" is {} bytes, expected {}",
                load.slot,
                self.path,
                bytes.len(),
                load.size
            );
        }

        let data = match CompiledShaderData::read(bytes, false) {
            Ok(data) => data,
            Err(err) => {
                error!("Failed to read slot {} of variant \"{}\": {}", load.slot, self.path, err);
                return;
            }
        };

        let (Some(stage), Some(renderer)) = (self.stage(), renderer) else {
            return;
        };

        self.reflection[load.slot] = data.reflection;

        if data.bytecode.is_empty() {
            error!("Slot {} of variant \"{}\" has no bytecode", load.slot, self.path);
            return;
        }

        self.shaders[load.slot] = renderer.create_shader(stage, &data.bytecode);
        if self.shaders[load.slot].is_none() {
            error!(
                "Failed to create {} shader for slot {} of variant \"{}\"",
                stage, load.slot, self.path
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemorySubData, RenderShader};
    use crate::target::ShaderProfile;
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeShader(ShaderStage);

    impl RenderShader for FakeShader {
        fn stage(&self) -> ShaderStage {
            self.0
        }
    }

    struct FakeRenderer;

    impl RendererBackend for FakeRenderer {
        fn create_vertex_shader(&self, _bytecode: &[u8]) -> Option<ShaderHandle> {
            Some(Arc::new(FakeShader(ShaderStage::Vertex)))
        }

        fn create_pixel_shader(&self, bytecode: &[u8]) -> Option<ShaderHandle> {
            (bytecode[0] != 0xFF).then(|| Arc::new(FakeShader(ShaderStage::Pixel)) as ShaderHandle)
        }
    }

    fn slot(bytecode: &[u8], sampler: &str) -> Vec<u8> {
        let mut data = CompiledShaderData::default();
        data.reflection.samplers.push(SamplerInfo { name: sampler.into(), bind_index: 0 });
        data.bytecode = bytecode.to_vec();
        data.write(false)
    }

    fn variant(name: &str, count: u32) -> ShaderVariant {
        let mut variant = ShaderVariant::new(format!("shaders/test.hlsl/{name}"), name);
        variant.load_persistent_data(VariantHeader { resource_count: count, shader: ObjectRef::Link(0) });
        variant
    }

    /// Sub-data laid out for every profile, with `slots` in the shader model 4 range
    fn source(slots: Vec<Vec<u8>>) -> MemorySubData {
        let count = slots.len();
        let mut buffers = vec![Vec::new(); count * ShaderProfile::COUNT];
        for (i, slot) in slots.into_iter().enumerate() {
            buffers[ShaderProfile::PcSm4.index() * count + i] = slot;
        }
        MemorySubData::new(buffers)
    }

    #[test]
    fn test_no_renderer_is_immediately_ready() {
        let mut variant = variant("p0", 1);
        let mut source = source(vec![slot(&[1; 4], "s")]);
        variant.begin_precache_resource_data(&mut source, None).unwrap();
        assert!(variant.is_ready());
        assert!(variant.render_resource(0).is_none());
    }

    #[test]
    fn test_invalid_stage_tag() {
        let mut variant = variant("g0", 1);
        let mut source = source(vec![slot(&[1; 4], "s")]);
        let result = variant.begin_precache_resource_data(&mut source, Some(&FakeRenderer));
        assert!(matches!(result, Err(Error::InvalidVariantName(_))));
        assert_eq!(variant.state(), PrecacheState::Unrequested);
    }

    #[test]
    fn test_empty_slot_does_not_block_siblings() {
        let mut variant = variant("p1", 2);
        let mut source = source(vec![Vec::new(), slot(&[1, 2, 3, 4], "Linear")]).with_latency(2);

        variant.begin_precache_resource_data(&mut source, Some(&FakeRenderer)).unwrap();
        assert!(!variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));
        assert!(!variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));
        assert!(variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));

        assert!(variant.render_resource(0).is_none());
        assert!(variant.constant_buffers(0).is_empty());
        assert!(variant.samplers(0).is_empty());
        assert!(variant.textures(0).is_empty());

        assert_eq!(variant.render_resource(1).map(|s| s.stage()), Some(ShaderStage::Pixel));
        assert_eq!(variant.samplers(1)[0].name, "Linear");
    }

    #[test]
    fn test_rejected_bytecode_leaves_null_handle() {
        let mut variant = variant("p0", 1);
        let mut source = source(vec![slot(&[0xFF, 0, 0, 0], "Point")]);

        variant.begin_precache_resource_data(&mut source, Some(&FakeRenderer)).unwrap();
        assert!(variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));
        assert!(variant.render_resource(0).is_none());
        assert_eq!(variant.samplers(0)[0].name, "Point", "reflection is kept");
    }

    #[test]
    fn test_missing_sub_data_is_skipped() {
        let mut variant = variant("v0", 3);
        // Only enough buffers for the first profile: every shader model 4 lookup fails
        let mut source = MemorySubData::new(vec![slot(&[1; 4], "s"); 3]);

        variant.begin_precache_resource_data(&mut source, Some(&FakeRenderer)).unwrap();
        assert!(variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));
        assert!((0..3).all(|i| variant.render_resource(i).is_none()));
        assert!(variant.render_resource(3).is_none());
    }

    #[test]
    fn test_poll_before_begin() {
        let mut variant = variant("v0", 1);
        let mut source = source(vec![slot(&[1; 4], "s")]);
        assert!(!variant.try_finish_precache_resource_data(&mut source, Some(&FakeRenderer)));
    }
}

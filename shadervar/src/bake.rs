//! Offline variant baking
//!
//! A variant of a given stage and user-option index is baked into one slot
//! per (profile, system option set). The shader model 4 build of each system
//! option set is compiled first; its constant buffer layout seeds the
//! reflection of the legacy builds.

use crate::compile::Define;
use crate::options::OptionSet;
use crate::package::ResourcePackage;
use crate::preprocessor::PlatformPreprocessor;
use crate::reflect::{CompiledShaderData, ReflectionData};
use crate::resource::{
    LoadId, MemorySubData, RendererBackend, ShaderPersistentData, ShaderVariant, VariantHeader, VariantLoadOverride,
};
use crate::serialize::ObjectRef;
use crate::target::{ShaderProfile, ShaderStage};
use crate::{Error, Result};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::Poll;

/// Splits a variant name into its stage tag and index (`p3` is pixel variant 3).
pub fn parse_variant_name(name: &str) -> Result<(ShaderStage, u32)> {
    let invalid = || Error::InvalidVariantName(name.to_string());

    let mut chars = name.chars();
    let stage = chars.next().and_then(ShaderStage::from_tag).ok_or_else(invalid)?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let index = digits.parse().map_err(|_| invalid())?;
    Ok((stage, index))
}

/// Preprocessor tokens for a decoded option set.
///
/// An enabled toggle defines `NAME=1`; a set select defines both its own
/// name and the chosen value.
pub fn option_tokens(set: &OptionSet) -> Vec<Define> {
    let toggles = set.toggles.iter().map(|name| Define::new(name.as_str(), "1"));
    let selects = set
        .selects
        .iter()
        .flat_map(|pair| [Define::new(pair.name.as_str(), "1"), Define::new(pair.choice.as_str(), "1")]);
    toggles.chain(selects).collect()
}

/// Output of baking one variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BakedVariant {
    /// Number of slots per profile (the system option set count)
    pub resource_count: u32,
    /// Slot buffers, indexed by `profile * resource_count + system index`
    pub sub_data: Vec<Vec<u8>>,
    /// Slots left empty because compilation or reflection failed
    pub failed_slots: usize,
}

impl BakedVariant {
    /// Packages the variant, linking it to its shader.
    pub fn into_package(self, shader_path: &str) -> ResourcePackage {
        let mut links = ResourcePackage::default();
        let mut header = VariantHeader {
            resource_count: self.resource_count,
            shader: links.add_link(shader_path),
        };

        ResourcePackage {
            sub_data: self.sub_data,
            links: links.links,
            ..ResourcePackage::from_object(&mut header, false)
        }
    }
}

fn build_slot(
    preprocessor: &dyn PlatformPreprocessor,
    shader_path: &Path,
    source: &str,
    profile: ShaderProfile,
    stage: ShaderStage,
    tokens: &[Define],
    reflection: ReflectionData,
) -> Result<CompiledShaderData> {
    let output = preprocessor.compile_shader(shader_path, profile, stage, source, tokens)?;

    let mut data = CompiledShaderData {
        reflection,
        bytecode: output.bytecode,
    };
    preprocessor.fill_shader_reflection_data(profile, &data.bytecode, &mut data.reflection)?;
    Ok(data)
}

/// Compiles and reflects every slot of variant `index` of `stage`.
///
/// A failed compile or reflection leaves only the affected slot empty; a
/// failed shader model 4 build also empties the legacy slots of the same
/// system option set, since they have no layout to start from.
pub fn bake_variant(
    preprocessor: &dyn PlatformPreprocessor,
    shader_path: &Path,
    source: &str,
    data: &ShaderPersistentData,
    stage: ShaderStage,
    index: u32,
) -> Result<BakedVariant> {
    let user_count = data.user_options.compute_option_set_count(stage);
    if index as usize >= user_count {
        return Err(Error::InvalidIndex {
            stage,
            index,
            count: u32::try_from(user_count).unwrap_or(u32::MAX),
        });
    }

    let system_count = data.system_options.compute_option_set_count(stage);
    let resource_count = u32::try_from(system_count)
        .map_err(|_| Error::InvalidParameter(format!("too many system option sets ({system_count})")))?;

    let profiles = preprocessor.shader_profiles();
    let modern = profiles.iter().copied().find(ShaderProfile::is_modern);
    let byte_swap = preprocessor.byte_swap();

    let mut baked = BakedVariant {
        resource_count,
        sub_data: vec![Vec::new(); ShaderProfile::COUNT * system_count],
        failed_slots: 0,
    };

    let mut tokens = option_tokens(&data.user_options.decode(stage, index));
    let user_token_count = tokens.len();

    for system_index in 0..resource_count {
        tokens.extend(option_tokens(&data.system_options.decode(stage, system_index)));

        let seed = match modern {
            Some(profile) => {
                let slot = profile.index() * system_count + system_index as usize;
                let result = build_slot(preprocessor, shader_path, source, profile, stage, &tokens, ReflectionData::default());
                match result {
                    Ok(mut compiled) => {
                        baked.sub_data[slot] = compiled.write(byte_swap);
                        Some(compiled.reflection.buffers)
                    }
                    Err(err) => {
                        warn!(
                            "Skipping system option set {} of \"{}\" ({} variant {}): {}",
                            system_index,
                            shader_path.display(),
                            stage,
                            index,
                            err
                        );
                        baked.failed_slots += profiles.len();
                        None
                    }
                }
            }
            None => Some(Vec::new()),
        };

        if let Some(buffers) = seed {
            for profile in profiles.iter().copied().filter(|p| !p.is_modern()) {
                let slot = profile.index() * system_count + system_index as usize;
                let reflection = ReflectionData {
                    buffers: buffers.clone(),
                    ..Default::default()
                };
                match build_slot(preprocessor, shader_path, source, profile, stage, &tokens, reflection) {
                    Ok(mut compiled) => baked.sub_data[slot] = compiled.write(byte_swap),
                    Err(err) => {
                        warn!(
                            "Skipping {} slot {} of \"{}\" ({} variant {}): {}",
                            profile,
                            system_index,
                            shader_path.display(),
                            stage,
                            index,
                            err
                        );
                        baked.failed_slots += 1;
                    }
                }
            }
        }

        tokens.truncate(user_token_count);
    }

    Ok(baked)
}

/// Bakes a shader and every variant of every stage into packages.
///
/// The shader's own package comes first, keyed by `object_path`; variant
/// packages follow, keyed by their variant paths.
pub fn bake_shader(
    preprocessor: &dyn PlatformPreprocessor,
    object_path: &str,
    file_path: &Path,
    source: &str,
) -> Result<Vec<(String, ResourcePackage)>> {
    let mut data = ShaderPersistentData::from_source(object_path, source);
    let mut packages = vec![(
        object_path.to_string(),
        ResourcePackage::from_object(&mut data, preprocessor.byte_swap()),
    )];

    for stage in ShaderStage::ALL {
        let count = data.user_options.compute_option_set_count(stage);
        let count = u32::try_from(count)
            .map_err(|_| Error::InvalidParameter(format!("too many {stage} variants ({count})")))?;

        for index in 0..count {
            let baked = bake_variant(preprocessor, file_path, source, &data, stage, index)?;
            if baked.failed_slots > 0 {
                error!(
                    "{} of {} slots failed for \"{}\" {} variant {}",
                    baked.failed_slots,
                    baked.sub_data.len(),
                    object_path,
                    stage,
                    index
                );
            }
            let variant_path = format!("{object_path}/{}{index}", stage.tag());
            packages.push((variant_path, baked.into_package(object_path)));
        }

        info!("Baked {} {} variants of \"{}\"", count, stage, object_path);
    }

    Ok(packages)
}

type VariantKey = (String, ShaderStage, u32);

enum BakeState {
    Precaching(ShaderVariant, MemorySubData),
    Ready(Option<Arc<ShaderVariant>>),
}

struct BakeEntry {
    state: BakeState,
    request_count: usize,
}

/// Load override that bakes variants on demand
///
/// Concurrent requests for the same variant share one bake. The baked
/// variant is released once its last requester has finished.
pub struct BakingVariantLoader<P> {
    preprocessor: P,
    source_root: PathBuf,
    renderer: Option<Arc<dyn RendererBackend>>,
    latency: u32,
    entries: HashMap<VariantKey, BakeEntry>,
    requests: HashMap<LoadId, VariantKey>,
    next_id: u64,
}

impl<P: PlatformPreprocessor> BakingVariantLoader<P> {
    pub fn new(preprocessor: P) -> Self {
        BakingVariantLoader {
            preprocessor,
            source_root: PathBuf::new(),
            renderer: None,
            latency: 0,
            entries: HashMap::new(),
            requests: HashMap::new(),
            next_id: 0,
        }
    }

    /// Sets the directory shader paths are resolved against.
    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = root.into();
        self
    }

    /// Sets the renderer baked variants are precached for.
    pub fn renderer(mut self, renderer: Arc<dyn RendererBackend>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sets the simulated latency of slot loads, in polls.
    pub fn sub_data_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    pub fn preprocessor(&self) -> &P {
        &self.preprocessor
    }

    /// Number of variants currently held for outstanding requests.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn start(&self, shader_path: &str, data: &ShaderPersistentData, stage: ShaderStage, index: u32) -> Result<BakeState> {
        let file_path = self.source_root.join(shader_path);
        let source = if data.source.is_empty() {
            std::fs::read_to_string(&file_path)?
        } else {
            data.source.clone()
        };

        let baked = bake_variant(&self.preprocessor, &file_path, &source, data, stage, index)?;

        let mut variant = ShaderVariant::new(
            format!("{shader_path}/{}{index}", stage.tag()),
            format!("{}{index}", stage.tag()),
        );
        variant.load_persistent_data(VariantHeader {
            resource_count: baked.resource_count,
            shader: ObjectRef::Null,
        });

        let mut source = MemorySubData::new(baked.sub_data).with_latency(self.latency);
        variant.begin_precache_resource_data(&mut source, self.renderer.as_deref())?;
        Ok(BakeState::Precaching(variant, source))
    }
}

impl<P: PlatformPreprocessor> VariantLoadOverride for BakingVariantLoader<P> {
    fn begin_load_variant(
        &mut self,
        shader_path: &str,
        data: &ShaderPersistentData,
        stage: ShaderStage,
        index: u32,
    ) -> Option<LoadId> {
        let key = (shader_path.to_string(), stage, index);

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.request_count += 1;
        } else {
            let state = match self.start(shader_path, data, stage, index) {
                Ok(state) => state,
                Err(err) => {
                    error!("Failed to bake {} variant {} of \"{}\": {}", stage, index, shader_path, err);
                    return None;
                }
            };
            self.entries.insert(key.clone(), BakeEntry { state, request_count: 1 });
        }

        let id = LoadId::new(self.next_id);
        self.next_id += 1;
        self.requests.insert(id, key);
        Some(id)
    }

    fn try_finish_load_variant(&mut self, id: LoadId) -> Poll<Option<Arc<ShaderVariant>>> {
        let Some(key) = self.requests.get(&id) else {
            return Poll::Ready(None);
        };
        let Some(entry) = self.entries.get_mut(key) else {
            self.requests.remove(&id);
            return Poll::Ready(None);
        };

        if let BakeState::Precaching(variant, source) = &mut entry.state {
            if !variant.try_finish_precache_resource_data(source, self.renderer.as_deref()) {
                return Poll::Pending;
            }
            let variant = std::mem::replace(variant, ShaderVariant::new("", ""));
            entry.state = BakeState::Ready(Some(Arc::new(variant)));
        }

        let variant = match &entry.state {
            BakeState::Ready(variant) => variant.clone(),
            BakeState::Precaching(..) => None,
        };

        entry.request_count -= 1;
        if entry.request_count == 0 {
            self.entries.remove(key);
        }
        self.requests.remove(&id);
        Poll::Ready(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompileOutput;
    use crate::flags::StageFlags;
    use crate::options::Options;
    use crate::reflect::{BufferInfo, SamplerInfo};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Compiles to the token list and reflects a fixed layout
    #[derive(Default)]
    struct FakePreprocessor {
        compiles: RefCell<Vec<(ShaderProfile, ShaderStage, Vec<String>)>>,
        fail_compile: Option<(ShaderProfile, &'static str)>,
        fail_reflect: Option<ShaderProfile>,
    }

    impl PlatformPreprocessor for FakePreprocessor {
        fn byte_swap(&self) -> bool {
            false
        }

        fn shader_profiles(&self) -> &[ShaderProfile] {
            &ShaderProfile::ALL
        }

        fn compile_shader(
            &self,
            _shader_path: &Path,
            profile: ShaderProfile,
            stage: ShaderStage,
            _source: &str,
            tokens: &[Define],
        ) -> Result<CompileOutput> {
            let tokens: Vec<String> = tokens.iter().map(Define::to_string).collect();
            self.compiles.borrow_mut().push((profile, stage, tokens.clone()));

            if let Some((failing, token)) = self.fail_compile {
                if failing == profile && tokens.iter().any(|t| t == token) {
                    return Err(Error::Compilation {
                        messages: vec![format!("error X3000: {token}")],
                    });
                }
            }

            let mut bytecode = format!("{profile}:{}", tokens.join(",")).into_bytes();
            bytecode.resize(bytecode.len().next_multiple_of(4), b' ');
            Ok(CompileOutput { bytecode, ..Default::default() })
        }

        fn fill_shader_reflection_data(
            &self,
            profile: ShaderProfile,
            _bytecode: &[u8],
            data: &mut ReflectionData,
        ) -> Result<()> {
            if self.fail_reflect == Some(profile) {
                data.clear();
                return Err(Error::Reflection("rejected".into()));
            }
            if profile.is_modern() {
                data.buffers = vec![BufferInfo {
                    name: "PerView".into(),
                    size: 64,
                    ..Default::default()
                }];
            }
            data.samplers = vec![SamplerInfo {
                name: profile.to_string(),
                bind_index: 0,
            }];
            Ok(())
        }
    }

    fn data() -> ShaderPersistentData {
        ShaderPersistentData {
            system_options: Options::new().with_toggle("SHADOWS", StageFlags::PIXEL),
            user_options: Options::new()
                .with_toggle("FOG", StageFlags::all())
                .with_select("LIGHT_MODEL", ["Lambert", "Phong"], StageFlags::PIXEL, false),
            source: "float4 main() : COLOR { return 0; }".into(),
        }
    }

    fn slot(baked: &BakedVariant, profile: ShaderProfile, system_index: usize) -> CompiledShaderData {
        let index = profile.index() * baked.resource_count as usize + system_index;
        CompiledShaderData::read(&baked.sub_data[index], false).unwrap()
    }

    #[test]
    fn test_parse_variant_name() {
        assert_eq!(parse_variant_name("p3").unwrap(), (ShaderStage::Pixel, 3));
        assert_eq!(parse_variant_name("v0").unwrap(), (ShaderStage::Vertex, 0));
        for name in ["", "p", "x1", "p+1", "p-1", "pabc", "p99999999999"] {
            assert!(matches!(parse_variant_name(name), Err(Error::InvalidVariantName(_))), "{name}");
        }
    }

    #[test]
    fn test_option_tokens() {
        let data = data();
        let tokens: Vec<String> = option_tokens(&data.user_options.decode(ShaderStage::Pixel, 3))
            .iter()
            .map(Define::to_string)
            .collect();
        assert_eq!(tokens, ["FOG=1", "LIGHT_MODEL=1", "Phong=1"]);
        assert!(option_tokens(&OptionSet::default()).is_empty());
    }

    #[test]
    fn test_slot_layout() {
        let preprocessor = FakePreprocessor::default();
        let data = data();
        let baked = bake_variant(&preprocessor, Path::new("lit.hlsl"), &data.source, &data, ShaderStage::Pixel, 1).unwrap();

        assert_eq!(baked.resource_count, 2);
        assert_eq!(baked.sub_data.len(), 6);
        assert_eq!(baked.failed_slots, 0);

        let shadowed = slot(&baked, ShaderProfile::PcSm3, 1);
        assert_eq!(shadowed.bytecode.trim_ascii_end(), b"pc_sm3:FOG=1,LIGHT_MODEL=1,Lambert=1,SHADOWS=1");
        let plain = slot(&baked, ShaderProfile::PcSm2b, 0);
        assert_eq!(plain.bytecode.trim_ascii_end(), b"pc_sm2b:FOG=1,LIGHT_MODEL=1,Lambert=1");

        let compiles = preprocessor.compiles.borrow();
        let order: Vec<ShaderProfile> = compiles.iter().map(|(p, _, _)| *p).collect();
        assert_eq!(
            order,
            [
                ShaderProfile::PcSm4,
                ShaderProfile::PcSm2b,
                ShaderProfile::PcSm3,
                ShaderProfile::PcSm4,
                ShaderProfile::PcSm2b,
                ShaderProfile::PcSm3
            ]
        );
    }

    #[test]
    fn test_legacy_reflection_is_seeded() {
        let preprocessor = FakePreprocessor::default();
        let data = data();
        let baked = bake_variant(&preprocessor, Path::new("lit.hlsl"), &data.source, &data, ShaderStage::Vertex, 0).unwrap();

        assert_eq!(baked.resource_count, 1);
        let legacy = slot(&baked, ShaderProfile::PcSm2b, 0);
        assert_eq!(legacy.reflection.buffers[0].name, "PerView");
        assert_eq!(legacy.reflection.samplers[0].name, "pc_sm2b");
    }

    #[test]
    fn test_modern_failure_skips_system_set() {
        let preprocessor = FakePreprocessor {
            fail_compile: Some((ShaderProfile::PcSm4, "SHADOWS=1")),
            ..Default::default()
        };
        let data = data();
        let baked = bake_variant(&preprocessor, Path::new("lit.hlsl"), &data.source, &data, ShaderStage::Pixel, 0).unwrap();

        assert_eq!(baked.failed_slots, 3);
        for profile in ShaderProfile::ALL {
            assert!(baked.sub_data[profile.index() * 2 + 1].is_empty());
            assert!(!baked.sub_data[profile.index() * 2].is_empty());
        }
    }

    #[test]
    fn test_legacy_failure_skips_one_slot() {
        let preprocessor = FakePreprocessor {
            fail_reflect: Some(ShaderProfile::PcSm3),
            ..Default::default()
        };
        let data = data();
        let baked = bake_variant(&preprocessor, Path::new("lit.hlsl"), &data.source, &data, ShaderStage::Vertex, 1).unwrap();

        assert_eq!(baked.failed_slots, 1);
        assert!(baked.sub_data[ShaderProfile::PcSm3.index()].is_empty());
        assert!(!baked.sub_data[ShaderProfile::PcSm2b.index()].is_empty());
        assert!(!baked.sub_data[ShaderProfile::PcSm4.index()].is_empty());
    }

    #[test]
    fn test_invalid_index() {
        let data = data();
        let result = bake_variant(&FakePreprocessor::default(), Path::new("a"), "", &data, ShaderStage::Vertex, 2);
        assert!(matches!(result, Err(Error::InvalidIndex { count: 2, .. })));
    }

    #[test]
    fn test_into_package() {
        let data = data();
        let baked = bake_variant(&FakePreprocessor::default(), Path::new("a"), "", &data, ShaderStage::Pixel, 0).unwrap();
        let package = baked.clone().into_package("shaders/lit.hlsl");

        let mut header = VariantHeader::default();
        package.read_object(&mut header, false).unwrap();
        assert_eq!(header.resource_count, 2);
        assert_eq!(header.shader.resolve(&package.links), Some("shaders/lit.hlsl"));
        assert_eq!(package.sub_data, baked.sub_data);
    }

    #[test]
    fn test_bake_shader_packages() {
        let source = "//! @toggle FOG\n//! @select_p LIGHT_MODEL Lambert Phong\nfloat4 main() : COLOR { return 0; }\n";
        let packages = bake_shader(&FakePreprocessor::default(), "shaders/lit.hlsl", Path::new("lit.hlsl"), source).unwrap();

        let paths: Vec<&str> = packages.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "shaders/lit.hlsl",
                "shaders/lit.hlsl/v0",
                "shaders/lit.hlsl/v1",
                "shaders/lit.hlsl/p0",
                "shaders/lit.hlsl/p1",
                "shaders/lit.hlsl/p2",
                "shaders/lit.hlsl/p3",
            ]
        );
    }

    #[test]
    fn test_requests_share_one_bake() {
        let mut loader = BakingVariantLoader::new(FakePreprocessor::default()).sub_data_latency(1);
        let data = data();

        let first = loader.begin_load_variant("lit.hlsl", &data, ShaderStage::Pixel, 2).unwrap();
        let second = loader.begin_load_variant("lit.hlsl", &data, ShaderStage::Pixel, 2).unwrap();
        assert_ne!(first, second);
        assert_eq!(loader.preprocessor().compiles.borrow().len(), 6);
        assert_eq!(loader.entry_count(), 1);

        let a = loop {
            if let Poll::Ready(variant) = loader.try_finish_load_variant(first) {
                break variant.unwrap();
            }
        };
        assert_eq!(loader.entry_count(), 1, "second requester still holds the entry");

        let b = match loader.try_finish_load_variant(second) {
            Poll::Ready(variant) => variant.unwrap(),
            Poll::Pending => panic!("variant already ready"),
        };
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "p2");
        assert!(a.is_ready());
        assert_eq!(loader.entry_count(), 0);

        loader.begin_load_variant("lit.hlsl", &data, ShaderStage::Pixel, 2).unwrap();
        assert_eq!(loader.preprocessor().compiles.borrow().len(), 12);
    }

    #[test]
    fn test_bake_failure_returns_no_id() {
        let mut loader = BakingVariantLoader::new(FakePreprocessor::default());
        assert_eq!(loader.begin_load_variant("lit.hlsl", &data(), ShaderStage::Vertex, 5), None);
        assert!(matches!(loader.try_finish_load_variant(LoadId::new(0)), Poll::Ready(None)));
    }
}

//! Shader resource: option catalogs and variant addressing

use super::{LoadId, ShaderVariant, VariantLoadOverride, VariantLoader};
use crate::declare::parse_declarations;
use crate::flags::PropertyFlags;
use crate::options::Options;
use crate::serialize::{Serialize, Serializer};
use crate::target::ShaderStage;
use crate::{Error, Result};
use log::{error, info};
use std::fmt;
use std::sync::Arc;
use std::task::Poll;

/// Persisted state of a shader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderPersistentData {
    /// Options selected by the engine at draw time (one slot per set)
    pub system_options: Options,
    /// Options that select a variant
    pub user_options: Options,
    /// Shader source, kept for editor builds only
    pub source: String,
}

impl ShaderPersistentData {
    /// Builds the catalogs from the option declarations in `source`.
    pub fn from_source(shader_path: &str, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut system_options = Options::new();
        let mut user_options = Options::new();
        parse_declarations(shader_path, &source, &mut system_options, &mut user_options);

        ShaderPersistentData {
            system_options,
            user_options,
            source,
        }
    }
}

impl Serialize for ShaderPersistentData {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        self.system_options.serialize(s);
        self.user_options.serialize(s);

        s.push_property_flags(PropertyFlags::EDITOR_ONLY);
        s.serialize_string(&mut self.source);
        s.pop_property_flags();
    }
}

/// A shader and the entry point for requesting its variants
pub struct Shader {
    path: String,
    data: ShaderPersistentData,
    variant_counts: [u32; ShaderStage::COUNT],
    is_default_template: bool,
    load_override: Option<Box<dyn VariantLoadOverride>>,
    precache_all: bool,
    precached: Vec<Arc<ShaderVariant>>,
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("path", &self.path)
            .field("variant_counts", &self.variant_counts)
            .field("is_default_template", &self.is_default_template)
            .field("has_load_override", &self.load_override.is_some())
            .finish_non_exhaustive()
    }
}

impl Shader {
    /// Creates a shader. Variant counts stay zero until [`finalize_load`](Self::finalize_load).
    pub fn new(path: impl Into<String>, data: ShaderPersistentData) -> Self {
        Shader {
            path: path.into(),
            data,
            variant_counts: [0; ShaderStage::COUNT],
            is_default_template: false,
            load_override: None,
            precache_all: false,
            precached: Vec::new(),
        }
    }

    /// Creates the placeholder template shader, which has no variants.
    pub fn default_template() -> Self {
        Shader {
            is_default_template: true,
            ..Self::new("", ShaderPersistentData::default())
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn persistent_data(&self) -> &ShaderPersistentData {
        &self.data
    }

    pub fn system_options(&self) -> &Options {
        &self.data.system_options
    }

    pub fn user_options(&self) -> &Options {
        &self.data.user_options
    }

    pub fn is_default_template(&self) -> bool {
        self.is_default_template
    }

    /// Installs or removes the variant load override.
    pub fn set_variant_load_override(&mut self, load_override: Option<Box<dyn VariantLoadOverride>>) {
        self.load_override = load_override;
    }

    pub fn has_variant_load_override(&self) -> bool {
        self.load_override.is_some()
    }

    /// Requests that [`finalize_load`](Self::finalize_load) precache every variant.
    pub fn set_precache_all_variants(&mut self, enable: bool) {
        self.precache_all = enable;
    }

    /// Recomputes the per-stage variant counts from the user options.
    ///
    /// When precaching of all variants is enabled and an override is
    /// installed, every variant is loaded before this returns.
    pub fn finalize_load(&mut self) {
        for stage in ShaderStage::ALL {
            self.variant_counts[stage.index()] = if self.is_default_template {
                0
            } else {
                let count = self.data.user_options.compute_option_set_count(stage);
                u32::try_from(count).unwrap_or(u32::MAX)
            };
        }

        if self.precache_all && !self.is_default_template && self.load_override.is_some() {
            let count = self.precache_all_variants();
            info!("Precached {} variants of shader \"{}\"", count, self.path);
        }
    }

    /// Number of variants for `stage`.
    pub fn variant_count(&self, stage: ShaderStage) -> u32 {
        self.variant_counts[stage.index()]
    }

    /// Checks that `index` addresses a variant of `stage`.
    pub fn validate_index(&self, stage: ShaderStage, index: u32) -> Result<()> {
        let count = self.variant_count(stage);
        if index >= count {
            return Err(Error::InvalidIndex { stage, index, count });
        }
        Ok(())
    }

    /// Object path of a variant: the stage tag and index under the shader's path.
    pub fn variant_path(&self, stage: ShaderStage, index: u32) -> String {
        format!("{}/{}{}", self.path, stage.tag(), index)
    }

    /// Starts loading variant `index` of `stage`.
    ///
    /// Goes through the load override when one is installed, otherwise
    /// through `loader`. Returns `None` for an invalid index.
    pub fn begin_load_variant(
        &mut self,
        loader: &mut dyn VariantLoader,
        stage: ShaderStage,
        index: u32,
    ) -> Option<LoadId> {
        if let Err(err) = self.validate_index(stage, index) {
            error!("{} (shader \"{}\")", err, self.path);
            return None;
        }

        match self.load_override.as_mut() {
            Some(load_override) => load_override.begin_load_variant(&self.path, &self.data, stage, index),
            None => loader.begin_load_variant(&self.variant_path(stage, index)),
        }
    }

    /// Polls a load started with [`begin_load_variant`](Self::begin_load_variant).
    pub fn try_finish_load_variant(
        &mut self,
        loader: &mut dyn VariantLoader,
        id: LoadId,
    ) -> Poll<Option<Arc<ShaderVariant>>> {
        match self.load_override.as_mut() {
            Some(load_override) => load_override.try_finish_load_variant(id),
            None => loader.try_finish_load_variant(id),
        }
    }

    /// Loads every variant of every stage through the override, blocking until done.
    ///
    /// Returns the number of variants loaded. Does nothing without an override
    /// or for the default template. Loaded variants are kept alive by the shader.
    pub fn precache_all_variants(&mut self) -> usize {
        if self.is_default_template {
            return 0;
        }
        let Some(load_override) = self.load_override.as_mut() else {
            return 0;
        };

        let mut loaded = 0;
        for stage in ShaderStage::ALL {
            for index in 0..self.variant_counts[stage.index()] {
                let Some(id) = load_override.begin_load_variant(&self.path, &self.data, stage, index) else {
                    error!(
                        "Failed to begin loading {} variant {} of shader \"{}\"",
                        stage, index, self.path
                    );
                    continue;
                };

                let variant = loop {
                    match load_override.try_finish_load_variant(id) {
                        Poll::Ready(variant) => break variant,
                        Poll::Pending => std::thread::yield_now(),
                    }
                };

                match variant {
                    Some(variant) => {
                        self.precached.push(variant);
                        loaded += 1;
                    }
                    None => error!("Failed to load {} variant {} of shader \"{}\"", stage, index, self.path),
                }
            }
        }
        loaded
    }

    /// Variants kept alive by [`precache_all_variants`](Self::precache_all_variants).
    pub fn precached_variants(&self) -> &[Arc<ShaderVariant>] {
        &self.precached
    }
}

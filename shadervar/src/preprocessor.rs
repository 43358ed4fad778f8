//! Platform preprocessors: per-profile compilation and reflection

use crate::compile::{CompileOutput, CompileRequest, Define, NativeCompiler};
use crate::flags::CompileFlags;
use crate::include::DirectoryInclude;
use crate::reflect::{ReflectionData, reflector_for};
use crate::target::{ShaderProfile, ShaderStage};
use crate::{Error, Result};
use log::{Level, debug, error, log_enabled, warn};
use std::path::Path;

/// Entry point every variant is compiled with
pub const ENTRY_POINT: &str = "main";

/// Offline compiler and reflector for one target platform
pub trait PlatformPreprocessor {
    /// Whether persisted data for this platform is byte swapped.
    fn byte_swap(&self) -> bool;

    /// Profiles built for this platform, in slot order.
    fn shader_profiles(&self) -> &[ShaderProfile];

    /// Compiles `source` for a profile and stage with the given option tokens.
    ///
    /// On failure the diagnostics are returned in [`Error::Compilation`].
    fn compile_shader(
        &self,
        shader_path: &Path,
        profile: ShaderProfile,
        stage: ShaderStage,
        source: &str,
        tokens: &[Define],
    ) -> Result<CompileOutput>;

    /// Extracts reflection data from compiled bytecode.
    ///
    /// For legacy profiles `data.buffers` must hold the layout reflected from
    /// the shader model 4 build. On failure all three sets are left empty.
    fn fill_shader_reflection_data(
        &self,
        profile: ShaderProfile,
        bytecode: &[u8],
        data: &mut ReflectionData,
    ) -> Result<()>;
}

/// Preprocessor for the PC profiles (shader model 2b, 3 and 4)
#[derive(Debug, Clone)]
pub struct PcPreprocessor<C> {
    compiler: C,
}

impl<C: NativeCompiler> PcPreprocessor<C> {
    pub fn new(compiler: C) -> Self {
        PcPreprocessor { compiler }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Builds the compile request for a profile, stage and token list.
    pub fn request(
        shader_path: &Path,
        profile: ShaderProfile,
        stage: ShaderStage,
        source: &str,
        tokens: &[Define],
    ) -> CompileRequest {
        let macros = profile
            .macros()
            .iter()
            .map(|name| Define::new(*name, "1"))
            .chain(std::iter::once(Define::new(stage.macro_name(), "1")))
            .chain(tokens.iter().cloned());

        CompileRequest::new(source, ENTRY_POINT, profile.target(stage))
            .source_name(shader_path.to_string_lossy())
            .with_defines(macros)
            .flags(CompileFlags::VARIANT)
    }
}

impl<C: NativeCompiler> PlatformPreprocessor for PcPreprocessor<C> {
    fn byte_swap(&self) -> bool {
        false
    }

    fn shader_profiles(&self) -> &[ShaderProfile] {
        &ShaderProfile::ALL
    }

    fn compile_shader(
        &self,
        shader_path: &Path,
        profile: ShaderProfile,
        stage: ShaderStage,
        source: &str,
        tokens: &[Define],
    ) -> Result<CompileOutput> {
        for token in tokens {
            debug!("{} {} {}: defining {}", shader_path.display(), profile, stage, token);
        }

        let request = Self::request(shader_path, profile, stage, source, tokens);
        let mut include = DirectoryInclude::for_shader(shader_path);

        let output = match self.compiler.compile(&request, &mut include) {
            Ok(output) => output,
            Err(Error::Compilation { messages }) => {
                error!(
                    "Failed to compile \"{}\" for profile {} ({} stage):",
                    shader_path.display(),
                    profile,
                    stage
                );
                for message in &messages {
                    error!("{}", message);
                }
                return Err(Error::Compilation { messages });
            }
            Err(err) => {
                error!("Failed to compile \"{}\" for profile {}: {}", shader_path.display(), profile, err);
                return Err(err);
            }
        };

        for message in &output.messages {
            warn!("{}", message);
        }

        if log_enabled!(Level::Debug) {
            let counts = reflector_for(profile).instruction_counts(&output.bytecode, output.listing.as_deref());
            if let Some(counts) = counts {
                debug!(
                    "Compiled \"{}\" for profile {} ({} stage): {}",
                    shader_path.display(),
                    profile,
                    stage,
                    counts
                );
            }
        }

        Ok(output)
    }

    fn fill_shader_reflection_data(
        &self,
        profile: ShaderProfile,
        bytecode: &[u8],
        data: &mut ReflectionData,
    ) -> Result<()> {
        reflector_for(profile).fill(bytecode, data).inspect_err(|err| {
            data.clear();
            error!("Failed to reflect shader (profile {}): {}", profile, err);
        })
    }
}

//! Shader variant indexing, precaching, and offline preprocessing
//!
//! A shader declares preprocessor options in its source. Every combination
//! of the options that apply to a stage is one variant, addressed by a dense
//! index. Offline, each variant is compiled for every hardware profile and
//! stored with its reflection data; at runtime the variant is loaded by index
//! and precached into native shader objects.
//!
//! # Example
//!
//! ```
//! use shadervar::{SelectPair, ShaderPersistentData, ShaderStage};
//!
//! let source = r#"
//! //! @toggle FOG
//! //! @toggle_v SKIN
//! //! @select_p LIGHT_MODEL Lambert Phong
//! float4 main() : COLOR { return 0; }
//! "#;
//!
//! let data = ShaderPersistentData::from_source("shaders/lit.hlsl", source);
//! let options = &data.user_options;
//!
//! assert_eq!(options.compute_option_set_count(ShaderStage::Pixel), 4);
//! let index = options.encode(ShaderStage::Pixel, &["FOG"], &[SelectPair::new("LIGHT_MODEL", "Phong")]);
//! assert_eq!(index, 3);
//! assert_eq!(options.decode(ShaderStage::Pixel, index).toggles, ["FOG"]);
//! ```

mod bake;
mod compile;
mod declare;
mod error;
mod flags;
mod include;
mod options;
mod package;
mod preprocessor;
pub mod reflect;
pub mod resource;
pub mod serialize;
mod target;

pub use bake::{BakedVariant, BakingVariantLoader, bake_shader, bake_variant, option_tokens, parse_variant_name};
pub use compile::{CompileOutput, CompileRequest, Define, NativeCompiler, ProcessCompiler, split_diagnostics};
pub use declare::{parse_declarations, parse_line};
pub use error::{Error, Result};
pub use flags::{CompileFlags, PropertyFlags, StageFlags};
pub use include::{DirectoryInclude, IncludeHandler, IncludeType, MAX_INCLUDE_DEPTH, MemoryInclude, expand_includes};
pub use options::{OptionPair, OptionSet, Options, Select, SelectPair, Toggle};
pub use package::{PACKAGE_EXTENSION, PACKAGE_MAGIC, PACKAGE_VERSION, ResourcePackage, package_path};
pub use preprocessor::{ENTRY_POINT, PcPreprocessor, PlatformPreprocessor};
pub use resource::{Shader, ShaderPersistentData, ShaderVariant};
pub use target::{ShaderProfile, ShaderStage};

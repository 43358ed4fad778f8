//! Shader variant command-line tool

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use shadervar::reflect::CompiledShaderData;
use shadervar::resource::VariantHeader;
use shadervar::{
    OptionPair, Options, PcPreprocessor, ProcessCompiler, ResourcePackage, ShaderPersistentData, ShaderProfile,
    ShaderStage, StageFlags, bake_shader, option_tokens, package_path,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shadervar")]
#[command(about = "Shader variant catalog and package tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the options declared by a shader and its variant counts
    Options {
        /// Input HLSL file
        input: PathBuf,
    },

    /// Compute the variant index of an option assignment
    Encode {
        /// Input HLSL file
        input: PathBuf,

        /// Shader stage
        #[arg(short, long, value_enum)]
        stage: Stage,

        /// Option assignments (NAME=VALUE or NAME)
        #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
        options: Vec<String>,
    },

    /// Show the options and preprocessor tokens of a variant index
    Decode {
        /// Input HLSL file
        input: PathBuf,

        /// Shader stage
        #[arg(short, long, value_enum)]
        stage: Stage,

        /// Variant index
        index: u32,
    },

    /// Compile every variant of a shader into packages
    Bake {
        /// Input HLSL file
        input: PathBuf,

        /// Output directory for packages
        #[arg(short, long, default_value = "cache")]
        output: PathBuf,

        /// fxc-compatible compiler executable
        #[arg(short, long, env = "SHADERVAR_FXC", default_value = "fxc.exe")]
        compiler: PathBuf,

        /// Object path of the shader (default: the input path)
        #[arg(long)]
        object_path: Option<String>,

        /// Directory for temporary compiler files
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },

    /// Dump the contents of a package
    Inspect {
        /// Input package file
        input: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Stage {
    #[value(name = "vertex", alias = "v")]
    Vertex,
    #[value(name = "pixel", alias = "p")]
    Pixel,
}

impl From<Stage> for ShaderStage {
    fn from(s: Stage) -> Self {
        match s {
            Stage::Vertex => ShaderStage::Vertex,
            Stage::Pixel => ShaderStage::Pixel,
        }
    }
}

fn stages_to_string(stages: StageFlags) -> String {
    ShaderStage::ALL
        .iter()
        .filter(|stage| stages.contains(stage.mask()))
        .map(|stage| stage.tag())
        .collect()
}

fn load_source(input: &Path) -> Result<ShaderPersistentData, String> {
    let source =
        std::fs::read_to_string(input).map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
    Ok(ShaderPersistentData::from_source(&input.to_string_lossy(), source))
}

fn print_catalog(title: &str, options: &Options) {
    println!("{} ({} toggles, {} selects):", title, options.toggles().len(), options.selects().len());
    for toggle in options.toggles() {
        println!("  toggle {} [{}]", toggle.name, stages_to_string(toggle.stages));
    }
    for select in options.selects() {
        let optional = if select.optional { " (optional)" } else { "" };
        println!(
            "  select {} [{}]: {}{}",
            select.name,
            stages_to_string(select.stages),
            select.choices.join(" "),
            optional
        );
    }
    for stage in ShaderStage::ALL {
        println!("  {} sets: {}", stage, options.compute_option_set_count(stage));
    }
}

fn list_options(input: PathBuf) -> Result<(), String> {
    let data = load_source(&input)?;
    print_catalog("System options", &data.system_options);
    println!();
    print_catalog("User options", &data.user_options);
    Ok(())
}

fn encode_options(input: PathBuf, stage: Stage, options: Vec<String>) -> Result<(), String> {
    let data = load_source(&input)?;
    let pairs: Vec<OptionPair> = options.iter().map(|o| OptionPair::parse(o)).collect();

    for pair in &pairs {
        if !data.user_options.contains(&pair.name) {
            eprintln!("Warning: unknown option \"{}\" ignored", pair.name);
        }
    }

    println!("{}", data.user_options.encode_pairs(stage.into(), &pairs));
    Ok(())
}

fn decode_index(input: PathBuf, stage: Stage, index: u32) -> Result<(), String> {
    let data = load_source(&input)?;
    let stage = ShaderStage::from(stage);

    let count = data.user_options.compute_option_set_count(stage);
    if index as usize >= count {
        return Err(format!("Index {} out of range ({} {} variants)", index, count, stage));
    }

    let set = data.user_options.decode(stage, index);
    println!("Variant: {}{}", stage.tag(), index);
    for toggle in &set.toggles {
        println!("  {}", toggle);
    }
    for pair in &set.selects {
        println!("  {}={}", pair.name, pair.choice);
    }

    let tokens: Vec<String> = option_tokens(&set).iter().map(ToString::to_string).collect();
    println!("Tokens: {}", tokens.join(" "));
    Ok(())
}

fn bake(
    input: PathBuf,
    output: PathBuf,
    compiler: PathBuf,
    object_path: Option<String>,
    temp_dir: Option<PathBuf>,
) -> Result<(), String> {
    let source =
        std::fs::read_to_string(&input).map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
    let object_path = object_path.unwrap_or_else(|| input.to_string_lossy().replace('\\', "/"));

    let mut process = ProcessCompiler::new(compiler);
    if let Some(temp_dir) = temp_dir {
        process = process.temp_dir(temp_dir);
    }
    let preprocessor = PcPreprocessor::new(process);

    let packages = bake_shader(&preprocessor, &object_path, &input, &source).map_err(|e| format!("{}", e))?;

    for (path, package) in &packages {
        let file = package_path(&output, path);
        package
            .save(&file)
            .map_err(|e| format!("Failed to write {}: {}", file.display(), e))?;
        info!("Wrote {}", file.display());
    }

    eprintln!(
        "Baked {} -> {} ({} packages)",
        input.display(),
        output.display(),
        packages.len()
    );
    Ok(())
}

fn inspect_variant(package: &ResourcePackage) -> Result<(), String> {
    let mut header = VariantHeader::default();
    package.read_object(&mut header, false).map_err(|e| format!("{}", e))?;

    println!(
        "Variant of {} ({} slots per profile)",
        header.shader.resolve(&package.links).unwrap_or("<null>"),
        header.resource_count
    );

    let count = header.resource_count as usize;
    for (index, slot) in package.sub_data.iter().enumerate() {
        let profile = match count {
            0 => None,
            _ => ShaderProfile::from_index(index / count),
        };
        let profile = profile.map_or_else(|| "?".to_string(), |p| p.to_string());
        let system_index = index.checked_rem(count).unwrap_or(index);

        if slot.is_empty() {
            println!("  [{:2}] {} set {}: empty", index, profile, system_index);
            continue;
        }

        let data = CompiledShaderData::read(slot, false).map_err(|e| format!("Slot {}: {}", index, e))?;
        println!(
            "  [{:2}] {} set {}: {} bytes of bytecode",
            index,
            profile,
            system_index,
            data.bytecode.len()
        );
        for buffer in &data.reflection.buffers {
            println!("       cbuffer {} (slot {}, {} bytes)", buffer.name, buffer.index, buffer.size);
            for constant in &buffer.constants {
                println!(
                    "         {} @ {} ({} bytes, {} used)",
                    constant.name, constant.offset, constant.size, constant.used_size
                );
            }
        }
        for sampler in &data.reflection.samplers {
            println!("       sampler {} (s{})", sampler.name, sampler.bind_index);
        }
        for texture in &data.reflection.textures {
            println!("       texture {} (t{})", texture.name, texture.bind_index);
        }
    }
    Ok(())
}

fn inspect_package(input: PathBuf) -> Result<(), String> {
    let package = ResourcePackage::load(&input).map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;

    println!(
        "Package: {} bytes persistent, {} links, {} sub-data buffers",
        package.persistent.len(),
        package.links.len(),
        package.sub_data.len()
    );

    // Variants always link to their shader; shaders link to nothing
    if !package.links.is_empty() {
        return inspect_variant(&package);
    }

    let mut data = ShaderPersistentData::default();
    package.read_object(&mut data, false).map_err(|e| format!("{}", e))?;
    print_catalog("System options", &data.system_options);
    println!();
    print_catalog("User options", &data.user_options);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Options { input } => list_options(input),
        Commands::Encode { input, stage, options } => encode_options(input, stage, options),
        Commands::Decode { input, stage, index } => decode_index(input, stage, index),
        Commands::Bake {
            input,
            output,
            compiler,
            object_path,
            temp_dir,
        } => bake(input, output, compiler, object_path, temp_dir),
        Commands::Inspect { input } => inspect_package(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

//! Shader compilation API
//!
//! Compilation goes through the [`NativeCompiler`] trait. [`ProcessCompiler`]
//! drives an external fxc-compatible compiler executable; tests substitute
//! their own implementations.

use crate::flags::CompileFlags;
use crate::include::{IncludeHandler, expand_includes};
use crate::{Error, Result};
use log::{debug, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A preprocessor macro definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: String,
}

impl Define {
    /// Creates a new preprocessor define
    ///
    /// # Example
    /// ```
    /// use shadervar::Define;
    /// let define = Define::new("FOG", "1");
    /// assert_eq!(define.to_string(), "FOG=1");
    /// ```
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Define {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a define with an empty value
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

impl std::fmt::Display for Define {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Everything a compiler needs to build one shader
///
/// # Example
/// ```
/// use shadervar::{CompileFlags, CompileRequest};
///
/// let request = CompileRequest::new("float4 main() : COLOR { return 0; }", "main", "ps_2_b")
///     .source_name("solid.hlsl")
///     .define("HELIUM_TYPE_PIXEL", "1")
///     .flags(CompileFlags::VARIANT);
/// assert_eq!(request.defines().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CompileRequest {
    source: String,
    source_name: String,
    entry_point: String,
    target: String,
    defines: Vec<Define>,
    flags: CompileFlags,
}

impl CompileRequest {
    /// Creates a request with the required parameters.
    pub fn new(source: impl Into<String>, entry_point: impl Into<String>, target: impl Into<String>) -> Self {
        CompileRequest {
            source: source.into(),
            source_name: String::from("shader.hlsl"),
            entry_point: entry_point.into(),
            target: target.into(),
            defines: Vec::new(),
            flags: CompileFlags::empty(),
        }
    }

    /// Sets the source file name (used in diagnostics and include resolution).
    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Adds a preprocessor define.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push(Define::new(name, value));
        self
    }

    /// Adds multiple pre-built defines.
    pub fn with_defines<I>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = Define>,
    {
        self.defines.extend(defines);
        self
    }

    /// Sets compilation flags (replaces any existing flags).
    pub fn flags(mut self, flags: CompileFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds compilation flags (bitwise OR with existing).
    pub fn with_flags(mut self, flags: CompileFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn source_file_name(&self) -> &str {
        &self.source_name
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn defines(&self) -> &[Define] {
        &self.defines
    }

    pub fn compile_flags(&self) -> CompileFlags {
        self.flags
    }
}

/// Result of a successful compilation
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// The compiled bytecode
    pub bytecode: Vec<u8>,
    /// Diagnostic messages (warnings), one per line
    pub messages: Vec<String>,
    /// Disassembly listing, if the compiler produced one
    pub listing: Option<String>,
}

/// A native shader compiler
///
/// Failures are reported as [`Error::Compilation`] carrying the compiler's
/// diagnostics.
pub trait NativeCompiler {
    fn compile(&self, request: &CompileRequest, include: &mut dyn IncludeHandler) -> Result<CompileOutput>;
}

/// Splits a compiler diagnostics blob into one message per line.
///
/// Lines are separated by `\n` or `\0`; empty lines are dropped.
pub fn split_diagnostics(blob: &str) -> Vec<String> {
    blob.split(['\n', '\0'])
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Compiles by running an fxc-compatible executable
///
/// The include-expanded source is written to a temporary file; bytecode and
/// listing are read back from the files named by `/Fo` and `/Fc`.
///
/// # Example
/// ```no_run
/// use shadervar::ProcessCompiler;
///
/// let compiler = ProcessCompiler::new("fxc.exe").arg("/Ges").temp_dir("target/shadervar");
/// ```
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<OsString>,
    temp_dir: PathBuf,
}

impl ProcessCompiler {
    /// Creates a compiler running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ProcessCompiler {
            program: program.into(),
            args: Vec::new(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Adds an extra argument passed before the generated switches.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the directory for temporary source and output files.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Builds the command-line switches for a request.
    pub fn switches(request: &CompileRequest, output: &Path, listing: &Path) -> Vec<OsString> {
        let flags = request.compile_flags();
        let mut args: Vec<OsString> = vec![
            "/nologo".into(),
            "/T".into(),
            request.target().into(),
            "/E".into(),
            request.entry_point().into(),
        ];

        if flags.contains(CompileFlags::SKIP_OPTIMIZATION) {
            args.push("/Od".into());
        } else {
            args.push(format!("/O{}", flags.optimization_level()).into());
        }
        if flags.contains(CompileFlags::PACK_MATRIX_ROW_MAJOR) {
            args.push("/Zpr".into());
        }
        if flags.contains(CompileFlags::PACK_MATRIX_COLUMN_MAJOR) {
            args.push("/Zpc".into());
        }
        if flags.contains(CompileFlags::WARNINGS_ARE_ERRORS) {
            args.push("/WX".into());
        }
        if flags.contains(CompileFlags::DEBUG) {
            args.push("/Zi".into());
        }

        for define in request.defines() {
            args.push("/D".into());
            args.push(define.to_string().into());
        }

        args.push("/Fo".into());
        args.push(output.into());
        args.push("/Fc".into());
        args.push(listing.into());
        args
    }
}

impl NativeCompiler for ProcessCompiler {
    fn compile(&self, request: &CompileRequest, include: &mut dyn IncludeHandler) -> Result<CompileOutput> {
        let source = expand_includes(request.source(), request.source_file_name(), include)?;

        std::fs::create_dir_all(&self.temp_dir)?;
        let dir = tempfile::Builder::new().prefix("shadervar").tempdir_in(&self.temp_dir)?;
        let source_path = dir.path().join("shader.hlsl");
        let output_path = dir.path().join("shader.bin");
        let listing_path = dir.path().join("shader.lst");
        std::fs::write(&source_path, source)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(Self::switches(request, &output_path, &listing_path))
            .arg(&source_path);
        debug!("Running {:?}", command);

        let output = command.output()?;

        let mut messages = split_diagnostics(&String::from_utf8_lossy(&output.stderr));
        messages.extend(split_diagnostics(&String::from_utf8_lossy(&output.stdout)));

        if !output.status.success() {
            return Err(Error::Compilation { messages });
        }

        let bytecode = std::fs::read(&output_path)?;
        if bytecode.is_empty() {
            messages.push(format!("{} produced no bytecode", self.program.display()));
            return Err(Error::Compilation { messages });
        }
        let listing = std::fs::read_to_string(&listing_path).ok();

        let dir_path = dir.path().to_path_buf();
        if let Err(err) = dir.close() {
            warn!("Failed to remove {}: {}", dir_path.display(), err);
        }

        Ok(CompileOutput {
            bytecode,
            messages,
            listing,
        })
    }
}

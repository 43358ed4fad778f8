//! Include handler trait for custom #include resolution

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maximum `#include` nesting depth accepted by [`expand_includes`]
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Include type (local or system)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeType {
    /// Local include (#include "file.h")
    Local,
    /// System include (#include <file.h>)
    System,
}

/// Trait for custom include file resolution
///
/// # Example
/// ```
/// use shadervar::{IncludeHandler, IncludeType, Result};
///
/// struct Fixed;
///
/// impl IncludeHandler for Fixed {
///     fn open(&mut self, _include_type: IncludeType, _filename: &str) -> Result<Vec<u8>> {
///         Ok(b"#define FIXED 1".to_vec())
///     }
/// }
/// ```
pub trait IncludeHandler {
    /// Opens an include file and returns its contents.
    fn open(&mut self, include_type: IncludeType, filename: &str) -> Result<Vec<u8>>;
}

/// Resolves includes relative to a shader's directory, then any extra search paths.
#[derive(Debug, Clone, Default)]
pub struct DirectoryInclude {
    search_paths: Vec<PathBuf>,
}

impl DirectoryInclude {
    /// Creates a handler scoped to the directory containing `shader_path`.
    pub fn for_shader(shader_path: impl AsRef<Path>) -> Self {
        let dir = shader_path
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        DirectoryInclude { search_paths: vec![dir] }
    }

    /// Adds a search path (builder pattern).
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Returns the search paths.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl IncludeHandler for DirectoryInclude {
    fn open(&mut self, _include_type: IncludeType, filename: &str) -> Result<Vec<u8>> {
        for search_path in &self.search_paths {
            let path = search_path.join(filename);
            if path.is_file() {
                return std::fs::read(&path).map_err(Into::into);
            }
        }

        Err(Error::IncludeNotFound(filename.to_string()))
    }
}

/// In-memory include handler for testing or embedded includes.
///
/// # Example
/// ```
/// use shadervar::MemoryInclude;
///
/// let mut handler = MemoryInclude::new();
/// handler.add("common.hlsl", b"float4 white = float4(1,1,1,1);");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryInclude {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryInclude {
    /// Creates a new empty memory include handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to the handler.
    pub fn add(&mut self, filename: &str, contents: &[u8]) {
        self.files.insert(filename.to_string(), contents.to_vec());
    }

    /// Adds a file (builder pattern).
    pub fn with_file(mut self, filename: &str, contents: &[u8]) -> Self {
        self.add(filename, contents);
        self
    }
}

impl IncludeHandler for MemoryInclude {
    fn open(&mut self, _include_type: IncludeType, filename: &str) -> Result<Vec<u8>> {
        self.files
            .get(filename)
            .cloned()
            .ok_or_else(|| Error::IncludeNotFound(filename.to_string()))
    }
}

/// Parses an `#include "file"` or `#include <file>` directive.
fn parse_include(line: &str) -> Option<(IncludeType, &str)> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start().strip_prefix("include")?.trim();
    if let Some(name) = rest.strip_prefix('"') {
        return name.split_once('"').map(|(name, _)| (IncludeType::Local, name));
    }
    rest.strip_prefix('<')?
        .split_once('>')
        .map(|(name, _)| (IncludeType::System, name))
}

/// Replaces `#include` directives with the contents provided by `handler`.
///
/// `#line` directives are emitted around each inclusion so diagnostics keep
/// pointing at the original files.
pub fn expand_includes(source: &str, source_name: &str, handler: &mut dyn IncludeHandler) -> Result<String> {
    let mut output = String::with_capacity(source.len());
    expand_into(&mut output, source, source_name, handler, 0)?;
    Ok(output)
}

fn expand_into(
    output: &mut String,
    source: &str,
    source_name: &str,
    handler: &mut dyn IncludeHandler,
    depth: usize,
) -> Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(Error::InvalidParameter(format!(
            "#include nesting deeper than {MAX_INCLUDE_DEPTH} levels in \"{source_name}\""
        )));
    }

    for (line_index, line) in source.lines().enumerate() {
        let Some((include_type, filename)) = parse_include(line) else {
            output.push_str(line);
            output.push('\n');
            continue;
        };

        let contents = handler.open(include_type, filename)?;
        let contents = std::str::from_utf8(&contents)?;

        output.push_str(&format!("#line 1 \"{filename}\"\n"));
        expand_into(output, contents, filename, handler, depth + 1)?;
        output.push_str(&format!("#line {} \"{}\"\n", line_index + 2, source_name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_include() {
        let mut handler = MemoryInclude::new().with_file("test.hlsl", b"float x = 1.0;");

        let result = handler.open(IncludeType::Local, "test.hlsl");
        assert_eq!(result.unwrap(), b"float x = 1.0;");

        let missing = handler.open(IncludeType::Local, "missing.hlsl");
        assert!(matches!(missing, Err(Error::IncludeNotFound(_))));
    }

    #[test]
    fn test_parse_include() {
        assert_eq!(parse_include("#include \"common.hlsl\""), Some((IncludeType::Local, "common.hlsl")));
        assert_eq!(parse_include("  #  include <lighting.hlsl>"), Some((IncludeType::System, "lighting.hlsl")));
        assert_eq!(parse_include("// #include \"x\""), None);
        assert_eq!(parse_include("#define X 1"), None);
    }

    #[test]
    fn test_expand_nested() {
        let mut handler = MemoryInclude::new()
            .with_file("a.hlsl", b"#include \"b.hlsl\"\nfloat a;")
            .with_file("b.hlsl", b"float b;");

        let expanded = expand_includes("#include \"a.hlsl\"\nfloat main;", "main.hlsl", &mut handler).unwrap();
        assert_eq!(
            expanded,
            "#line 1 \"a.hlsl\"\n#line 1 \"b.hlsl\"\nfloat b;\n#line 2 \"a.hlsl\"\nfloat a;\n#line 2 \"main.hlsl\"\nfloat main;\n"
        );
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let mut handler = MemoryInclude::new().with_file("self.hlsl", b"#include \"self.hlsl\"");
        let result = expand_includes("#include \"self.hlsl\"", "main.hlsl", &mut handler);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_directory_include_resolves_next_to_shader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.hlsl"), b"float common;").unwrap();

        let mut handler = DirectoryInclude::for_shader(dir.path().join("main.hlsl"));
        assert_eq!(handler.open(IncludeType::Local, "common.hlsl").unwrap(), b"float common;");
        assert!(handler.open(IncludeType::Local, "missing.hlsl").is_err());
    }
}

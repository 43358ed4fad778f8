//! Option declarations embedded in shader source
//!
//! Options are declared in special comment lines:
//!
//! ```text
//! //! @toggle FOG
//! //! @toggle_v SKIN
//! //! @select_p LIGHT_MODEL Lambert Phong
//! //! @sysselect SHADOWS NONE PCF VSM
//! ```
//!
//! `@toggle`/`@select` declare user options, `@systoggle`/`@sysselect` declare
//! system options. An optional `_<stages>` suffix restricts the option to the
//! listed stages (`v`, `p`). A select whose first choice is `NONE` is optional.

use crate::flags::StageFlags;
use crate::options::Options;
use log::{error, warn};

const LINE_PREFIX: &str = "//!";
const TOKEN_DELIMITERS: &[char] = &[' ', '\t', '\u{0b}', '\u{0c}'];
const OPTIONAL_MARKER: &str = "NONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Toggle { system: bool },
    Select { system: bool },
}

impl Command {
    fn parse(command: &str) -> Option<Self> {
        match command {
            "@toggle" => Some(Command::Toggle { system: false }),
            "@select" => Some(Command::Select { system: false }),
            "@systoggle" => Some(Command::Toggle { system: true }),
            "@sysselect" => Some(Command::Select { system: true }),
            _ => None,
        }
    }
}

/// Parses every declaration line of `source` into the system and user catalogs.
///
/// `shader_path` is only used in log messages. Invalid declarations are logged
/// and skipped; a name that is already declared keeps its first declaration.
pub fn parse_declarations(shader_path: &str, source: &str, system: &mut Options, user: &mut Options) {
    for line in source.split(['\n', '\r']) {
        parse_line(shader_path, line, system, user);
    }
}

/// Parses a single source line. Lines without the `//!` prefix are ignored.
pub fn parse_line(shader_path: &str, line: &str, system: &mut Options, user: &mut Options) {
    let Some(rest) = line.strip_prefix(LINE_PREFIX) else {
        return;
    };

    let tokens: Vec<&str> = rest.split(TOKEN_DELIMITERS).filter(|t| !t.is_empty()).collect();
    if tokens.len() < 2 {
        return;
    }

    let command_parts: Vec<&str> = tokens[0].split('_').collect();
    if command_parts.len() > 2 {
        return;
    }
    let Some(command) = Command::parse(command_parts[0]) else {
        return;
    };

    let name = tokens[1];
    if system.contains(name) || user.contains(name) {
        error!(
            "Duplicate option name \"{}\" found in shader \"{}\". Only the first option will be used.",
            name, shader_path
        );
        return;
    }

    let stages = match command_parts.get(1) {
        Some(tags) => StageFlags::from_tags(tags),
        None => StageFlags::all(),
    };

    match command {
        Command::Toggle { system: is_system } => {
            if tokens.len() > 2 {
                warn!(
                    "Extra tokens for toggle command \"{}\" in shader \"{}\" ignored.",
                    name, shader_path
                );
            }

            let catalog = if is_system { system } else { user };
            catalog.add_toggle(name, stages);
        }
        Command::Select { system: is_system } => {
            let optional = tokens.get(2) == Some(&OPTIONAL_MARKER);
            let first_choice = if optional { 3 } else { 2 };
            if tokens.len() <= first_choice {
                error!(
                    "Missing options for select command \"{}\" in shader \"{}\".",
                    name, shader_path
                );
                return;
            }

            let catalog = if is_system { system } else { user };
            catalog.add_select(name, tokens[first_choice..].iter().copied(), stages, optional);
        }
    }
}

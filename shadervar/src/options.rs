//! Shader option catalogs and variant indexing
//!
//! A catalog lists a shader's preprocessor options: boolean toggles followed by
//! multi-choice selects. For a given stage the applicable options form a
//! mixed-radix number, toggles first, lowest digit first:
//!
//! * a toggle is a base-2 digit,
//! * a select is a base-`choices + optional` digit, where the extra value of an
//!   optional select means "unset".
//!
//! The digit order is the catalog order and must not change once variants have
//! been baked, otherwise existing indices decode to different option sets.
//!
//! # Example
//! ```
//! use shadervar::{Options, SelectPair, ShaderStage, StageFlags};
//!
//! let options = Options::new()
//!     .with_toggle("FOG", StageFlags::all())
//!     .with_select("LIGHT_MODEL", ["Lambert", "Phong"], StageFlags::PIXEL, false);
//!
//! let index = options.encode(ShaderStage::Pixel, &["FOG"], &[SelectPair::new("LIGHT_MODEL", "Phong")]);
//! assert_eq!(index, 3);
//!
//! let set = options.decode(ShaderStage::Pixel, index);
//! assert_eq!(set.toggles, vec!["FOG".to_string()]);
//! ```

use crate::flags::StageFlags;
use crate::serialize::{Serialize, Serializer, serialize_vec};
use crate::target::ShaderStage;

/// Boolean preprocessor option
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Toggle {
    /// Macro name
    pub name: String,
    /// Stages the toggle applies to
    pub stages: StageFlags,
}

/// Multi-choice preprocessor option
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Select {
    /// Option name (defined as a macro when a choice is set)
    pub name: String,
    /// Choice names, each defined as a macro when chosen
    pub choices: Vec<String>,
    /// Stages the select applies to
    pub stages: StageFlags,
    /// Whether the select may be left unset
    pub optional: bool,
}

impl Select {
    /// Number of digit values this select contributes.
    pub fn radix(&self) -> usize {
        self.choices.len() + usize::from(self.optional)
    }

    /// Position of `choice` in the choice list.
    pub fn choice_offset(&self, choice: &str) -> Option<usize> {
        self.choices.iter().position(|c| c == choice)
    }
}

/// A select option set to one of its choices
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectPair {
    /// Select name
    pub name: String,
    /// Chosen value
    pub choice: String,
}

impl SelectPair {
    pub fn new(name: impl Into<String>, choice: impl Into<String>) -> Self {
        SelectPair {
            name: name.into(),
            choice: choice.into(),
        }
    }
}

/// Generic `name = value` option assignment
///
/// Used by [`Options::encode_pairs`] where toggles and selects are given in a
/// single list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionPair {
    pub name: String,
    pub value: String,
}

impl OptionPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        OptionPair {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parses `NAME=VALUE`; a bare `NAME` means `NAME=1`.
    pub fn parse(s: &str) -> Self {
        s.split_once('=')
            .map(|(n, v)| OptionPair::new(n.trim(), v.trim()))
            .unwrap_or_else(|| OptionPair::new(s.trim(), "1"))
    }

    /// Returns false for the disabled sentinels: empty, `0`, and `false`.
    pub fn is_enabled(&self) -> bool {
        !matches!(self.value.as_str(), "" | "0" | "false")
    }
}

/// Options selected by a single variant index
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet {
    /// Enabled toggles, in catalog order
    pub toggles: Vec<String>,
    /// Chosen selects, in catalog order (unset optional selects are absent)
    pub selects: Vec<SelectPair>,
}

impl OptionSet {
    /// Returns true if no toggle is enabled and no select is set.
    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty() && self.selects.is_empty()
    }
}

/// Catalog of toggle and select options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    toggles: Vec<Toggle>,
    selects: Vec<Select>,
}

impl Options {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a toggle (builder pattern).
    pub fn with_toggle(mut self, name: impl Into<String>, stages: StageFlags) -> Self {
        self.add_toggle(name, stages);
        self
    }

    /// Appends a select (builder pattern).
    pub fn with_select<I, C>(mut self, name: impl Into<String>, choices: I, stages: StageFlags, optional: bool) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.add_select(name, choices, stages, optional);
        self
    }

    /// Appends a toggle.
    pub fn add_toggle(&mut self, name: impl Into<String>, stages: StageFlags) {
        self.toggles.push(Toggle {
            name: name.into(),
            stages,
        });
    }

    /// Appends a select.
    pub fn add_select<I, C>(&mut self, name: impl Into<String>, choices: I, stages: StageFlags, optional: bool)
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.selects.push(Select {
            name: name.into(),
            choices: choices.into_iter().map(Into::into).collect(),
            stages,
            optional,
        });
    }

    pub fn toggles(&self) -> &[Toggle] {
        &self.toggles
    }

    pub fn selects(&self) -> &[Select] {
        &self.selects
    }

    /// Returns true if a toggle or select named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.toggles.iter().any(|t| t.name == name) || self.selects.iter().any(|s| s.name == name)
    }

    fn applicable_toggles(&self, stage: ShaderStage) -> impl Iterator<Item = &Toggle> {
        let mask = stage.mask();
        self.toggles.iter().filter(move |t| t.stages.intersects(mask))
    }

    fn applicable_selects(&self, stage: ShaderStage) -> impl Iterator<Item = &Select> {
        let mask = stage.mask();
        self.selects.iter().filter(move |s| s.stages.intersects(mask))
    }

    /// Number of distinct option sets (variants) for `stage`.
    pub fn compute_option_set_count(&self, stage: ShaderStage) -> usize {
        let toggles = self.applicable_toggles(stage).count();
        let count = self
            .applicable_selects(stage)
            .fold(1usize, |count, select| count.saturating_mul(select.radix()));

        count.checked_shl(toggles as u32).unwrap_or(usize::MAX)
    }

    /// Computes the variant index of a set of enabled toggles and select choices.
    ///
    /// Names that match no option, choices that match no listed choice, and
    /// missing non-optional selects contribute nothing. A missing optional
    /// select encodes as its "unset" value. Only the first pair of each
    /// select name is considered, even when its choice is empty.
    pub fn encode<T: AsRef<str>>(&self, stage: ShaderStage, toggles: &[T], selects: &[SelectPair]) -> u32 {
        self.encode_with(
            stage,
            |name| toggles.iter().any(|t| t.as_ref() == name),
            |name| {
                selects
                    .iter()
                    .find(|pair| pair.name == name)
                    .filter(|pair| !pair.choice.is_empty())
                    .map(|pair| pair.choice.as_str())
            },
        )
    }

    /// Computes the variant index from one flat list of `name = value` pairs.
    ///
    /// Only the first pair of each name is considered. A toggle is enabled
    /// when that pair's value is not empty, `0`, or `false`; a select takes
    /// the value as its choice.
    pub fn encode_pairs(&self, stage: ShaderStage, pairs: &[OptionPair]) -> u32 {
        self.encode_with(
            stage,
            |name| pairs.iter().find(|pair| pair.name == name).is_some_and(OptionPair::is_enabled),
            |name| {
                pairs
                    .iter()
                    .find(|pair| pair.name == name)
                    .filter(|pair| !pair.value.is_empty())
                    .map(|pair| pair.value.as_str())
            },
        )
    }

    fn encode_with<'a>(
        &self,
        stage: ShaderStage,
        is_enabled: impl Fn(&str) -> bool,
        choice_of: impl Fn(&str) -> Option<&'a str>,
    ) -> u32 {
        let mut index = 0u32;
        let mut weight = 1u32;

        for toggle in self.applicable_toggles(stage) {
            if is_enabled(&toggle.name) {
                index |= weight;
            }
            weight = weight.wrapping_shl(1);
        }

        for select in self.applicable_selects(stage) {
            let offset = match choice_of(&select.name) {
                Some(choice) => select
                    .choice_offset(choice)
                    .or_else(|| select.optional.then_some(select.choices.len())),
                None => select.optional.then_some(select.choices.len()),
            };

            if let Some(offset) = offset {
                index = index.wrapping_add((offset as u32).wrapping_mul(weight));
            }
            weight = weight.wrapping_mul(select.radix() as u32);
        }

        index
    }

    /// Recovers the option set encoded by `index`.
    pub fn decode(&self, stage: ShaderStage, index: u32) -> OptionSet {
        let mut set = OptionSet::default();
        let mut index = index;

        for toggle in self.applicable_toggles(stage) {
            if index & 1 != 0 {
                set.toggles.push(toggle.name.clone());
            }
            index >>= 1;
        }

        for select in self.applicable_selects(stage) {
            let radix = select.radix() as u32;
            if radix == 0 {
                continue;
            }

            let digit = (index % radix) as usize;
            index /= radix;

            if let Some(choice) = select.choices.get(digit) {
                set.selects.push(SelectPair::new(select.name.clone(), choice.clone()));
            }
        }

        set
    }
}

impl Serialize for Toggle {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        let mut bits = self.stages.bits();
        s.serialize_u32(&mut bits);
        self.stages = StageFlags::from_bits_truncate(bits);
    }
}

impl Serialize for Select {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(&mut self.name);
        serialize_vec(s, &mut self.choices);
        let mut bits = self.stages.bits();
        s.serialize_u32(&mut bits);
        self.stages = StageFlags::from_bits_truncate(bits);
        s.serialize_bool(&mut self.optional);
    }
}

impl Serialize for Options {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        serialize_vec(s, &mut self.toggles);
        serialize_vec(s, &mut self.selects);
    }
}

//! Bidirectional binary serialization
//!
//! Records describe their layout once through [`Serialize`]; the same schema is
//! then driven by a [`BinarySerializer`] when writing and a [`Deserializer`]
//! when reading. Every field is passed by `&mut`: a writer reads from it, a
//! reader overwrites it (or leaves it untouched when the stream runs short).
//!
//! # Example
//! ```
//! use shadervar::serialize::{BinarySerializer, Deserializer, Serialize, Serializer};
//!
//! #[derive(Default, Debug, PartialEq)]
//! struct Header {
//!     count: u32,
//!     name: String,
//! }
//!
//! impl Serialize for Header {
//!     fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
//!         s.serialize_u32(&mut self.count);
//!         s.serialize_string(&mut self.name);
//!     }
//! }
//!
//! let mut writer = BinarySerializer::new();
//! writer.begin_serialize();
//! Header { count: 3, name: "basic".into() }.serialize(&mut writer);
//! writer.end_serialize();
//! let bytes = writer.into_bytes();
//!
//! let mut reader = Deserializer::new(&bytes);
//! reader.begin_serialize();
//! let mut header = Header::default();
//! header.serialize(&mut reader);
//! assert!(reader.end_serialize());
//! assert_eq!(header.name, "basic");
//! ```

mod deserializer;
mod serializer;

pub use deserializer::Deserializer;
pub use serializer::BinarySerializer;

use crate::flags::PropertyFlags;

/// Sentinel written for a null object reference
pub const NULL_LINK_INDEX: u32 = u32::MAX;

/// Reference to another object, stored as an index into a link table
///
/// References are never resolved while reading: the referenced object may not
/// be loaded yet. The raw link index is kept and resolved later against the
/// link table of the containing package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectRef {
    /// No object
    #[default]
    Null,
    /// Unresolved index into a link table
    Link(u32),
}

impl ObjectRef {
    /// Returns the raw link index, or [`NULL_LINK_INDEX`] for a null reference
    pub fn link_index(&self) -> u32 {
        match self {
            ObjectRef::Null => NULL_LINK_INDEX,
            ObjectRef::Link(index) => *index,
        }
    }

    /// Builds a reference from a raw link index
    pub fn from_link_index(index: u32) -> Self {
        if index == NULL_LINK_INDEX {
            ObjectRef::Null
        } else {
            ObjectRef::Link(index)
        }
    }

    /// Resolves the reference against a link table of object paths
    pub fn resolve<'a>(&self, links: &'a [String]) -> Option<&'a str> {
        match self {
            ObjectRef::Null => None,
            ObjectRef::Link(index) => links.get(*index as usize).map(String::as_str),
        }
    }
}

/// Direction-agnostic serializer interface
pub trait Serializer {
    /// Returns true when values are read into the passed references.
    fn is_loading(&self) -> bool;

    /// Returns true once a read has run past the end of the stream.
    fn is_end_of_stream(&self) -> bool {
        false
    }

    fn serialize_bool(&mut self, value: &mut bool);
    fn serialize_u8(&mut self, value: &mut u8);
    fn serialize_u16(&mut self, value: &mut u16);
    fn serialize_u32(&mut self, value: &mut u32);
    fn serialize_u64(&mut self, value: &mut u64);
    fn serialize_i32(&mut self, value: &mut i32);
    fn serialize_f32(&mut self, value: &mut f32);

    /// Length-prefixed (u32) UTF-8 string.
    fn serialize_string(&mut self, value: &mut String);

    /// Length-prefixed (u32) byte blob.
    fn serialize_bytes(&mut self, value: &mut Vec<u8>);

    /// Object reference, stored as a raw link index.
    fn serialize_object_ref(&mut self, value: &mut ObjectRef);

    /// Pushes `flags` combined with the current top of the property flag stack.
    fn push_property_flags(&mut self, flags: PropertyFlags);

    /// Pops the property flag stack.
    fn pop_property_flags(&mut self);

    /// Returns false while the current property is flagged as editor-only.
    fn should_serialize_current_property(&self) -> bool;
}

/// Types with a binary layout
pub trait Serialize {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S);
}

impl Serialize for String {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_string(self);
    }
}

impl Serialize for Vec<u8> {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_bytes(self);
    }
}

impl Serialize for u32 {
    fn serialize<S: Serializer + ?Sized>(&mut self, s: &mut S) {
        s.serialize_u32(self);
    }
}

/// Serializes a u32-count-prefixed array of records.
///
/// When reading, the destination is replaced only if every element was read
/// in full.
pub fn serialize_vec<S, T>(s: &mut S, values: &mut Vec<T>)
where
    S: Serializer + ?Sized,
    T: Serialize + Default,
{
    if !s.should_serialize_current_property() {
        return;
    }

    let mut count = u32::try_from(values.len()).unwrap_or(u32::MAX);
    s.serialize_u32(&mut count);

    if !s.is_loading() {
        for value in values.iter_mut().take(count as usize) {
            value.serialize(s);
        }
        return;
    }

    if s.is_end_of_stream() {
        return;
    }

    let mut loaded = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let mut value = T::default();
        value.serialize(s);
        if s.is_end_of_stream() {
            return;
        }
        loaded.push(value);
    }

    *values = loaded;
}

/// Property flag stack shared by both serializer directions
#[derive(Debug, Clone, Default)]
pub(crate) struct PropertyFlagStack {
    stack: Vec<PropertyFlags>,
}

impl PropertyFlagStack {
    pub(crate) fn push(&mut self, flags: PropertyFlags) {
        let top = self.top();
        self.stack.push(top | flags);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn top(&self) -> PropertyFlags {
        self.stack.last().copied().unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.stack.clear();
    }

    pub(crate) fn should_serialize(&self) -> bool {
        !self.top().contains(PropertyFlags::EDITOR_ONLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_flags_inherit() {
        let mut stack = PropertyFlagStack::default();
        assert!(stack.should_serialize());

        stack.push(PropertyFlags::EDITOR_ONLY);
        stack.push(PropertyFlags::empty());
        assert!(!stack.should_serialize(), "nested push keeps editor-only bit");

        stack.pop();
        stack.pop();
        assert!(stack.should_serialize());

        // Popping an empty stack is harmless
        stack.pop();
        assert_eq!(stack.top(), PropertyFlags::empty());
    }

    #[test]
    fn test_object_ref_link_index() {
        assert_eq!(ObjectRef::from_link_index(NULL_LINK_INDEX), ObjectRef::Null);
        assert_eq!(ObjectRef::from_link_index(2), ObjectRef::Link(2));
        assert_eq!(ObjectRef::Link(7).link_index(), 7);

        let links = vec!["shaders/basic.hlsl".to_string()];
        assert_eq!(ObjectRef::Link(0).resolve(&links), Some("shaders/basic.hlsl"));
        assert_eq!(ObjectRef::Link(1).resolve(&links), None);
        assert_eq!(ObjectRef::Null.resolve(&links), None);
    }
}

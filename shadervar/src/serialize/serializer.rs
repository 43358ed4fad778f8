//! Binary writer

use super::{ObjectRef, PropertyFlagStack, Serializer};
use crate::flags::PropertyFlags;

/// Writes records into a growable byte buffer
///
/// Mirrors [`Deserializer`](super::Deserializer): the same property flag stack
/// decides which fields are emitted, and byte swapping applies to every
/// primitive written after it is enabled.
#[derive(Debug, Default)]
pub struct BinarySerializer {
    buffer: Vec<u8>,
    byte_swap: bool,
    flags: PropertyFlagStack,
}

impl BinarySerializer {
    /// Creates an empty serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables byte swapping for subsequent writes.
    pub fn set_byte_swapping(&mut self, swap: bool) {
        self.byte_swap = swap;
    }

    /// Starts a pass, discarding anything written by a previous one.
    pub fn begin_serialize(&mut self) {
        self.buffer.clear();
        self.flags.clear();
    }

    /// Ends a pass.
    pub fn end_serialize(&mut self) {
        self.flags.clear();
    }

    /// Bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the serializer, returning the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Pads the buffer with zeros up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let padded = self.buffer.len().next_multiple_of(alignment);
        self.buffer.resize(padded, 0);
    }

    /// Appends raw bytes without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

macro_rules! write_primitive {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, value: &mut $ty) {
            if self.flags.should_serialize() {
                let value = if self.byte_swap { value.swap_bytes() } else { *value };
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        }
    };
}

impl Serializer for BinarySerializer {
    fn is_loading(&self) -> bool {
        false
    }

    fn serialize_bool(&mut self, value: &mut bool) {
        let mut byte = u8::from(*value);
        self.serialize_u8(&mut byte);
    }

    write_primitive!(serialize_u8, u8);
    write_primitive!(serialize_u16, u16);
    write_primitive!(serialize_u32, u32);
    write_primitive!(serialize_u64, u64);
    write_primitive!(serialize_i32, i32);

    fn serialize_f32(&mut self, value: &mut f32) {
        let mut bits = value.to_bits();
        self.serialize_u32(&mut bits);
    }

    fn serialize_string(&mut self, value: &mut String) {
        if !self.flags.should_serialize() {
            return;
        }
        let mut len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.serialize_u32(&mut len);
        self.buffer.extend_from_slice(&value.as_bytes()[..len as usize]);
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>) {
        if !self.flags.should_serialize() {
            return;
        }
        let mut len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.serialize_u32(&mut len);
        self.buffer.extend_from_slice(&value[..len as usize]);
    }

    fn serialize_object_ref(&mut self, value: &mut ObjectRef) {
        let mut index = value.link_index();
        self.serialize_u32(&mut index);
    }

    fn push_property_flags(&mut self, flags: PropertyFlags) {
        self.flags.push(flags);
    }

    fn pop_property_flags(&mut self) {
        self.flags.pop();
    }

    fn should_serialize_current_property(&self) -> bool {
        self.flags.should_serialize()
    }
}

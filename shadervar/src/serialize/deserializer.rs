//! Sequential binary reader

use super::{ObjectRef, PropertyFlagStack, Serializer};
use crate::flags::PropertyFlags;

/// Reads serialized records from a flat buffer
///
/// A short read, or a string that is not valid UTF-8, sets a sticky
/// end-of-stream flag and leaves the destination untouched; every later read in the same pass becomes a no-op. Object
/// references are read as raw link indices and recorded in
/// [`pending_links`](Deserializer::pending_links) for later resolution.
#[derive(Debug, Default)]
pub struct Deserializer<'a> {
    buffer: &'a [u8],
    offset: usize,
    end_of_stream: bool,
    byte_swap: bool,
    flags: PropertyFlagStack,
    pending_links: Vec<u32>,
}

impl<'a> Deserializer<'a> {
    /// Creates a deserializer bound to `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        let mut deserializer = Deserializer::default();
        deserializer.prepare(buffer);
        deserializer
    }

    /// Binds a new buffer and rewinds the cursor.
    pub fn prepare(&mut self, buffer: &'a [u8]) {
        self.buffer = buffer;
        self.offset = 0;
        self.end_of_stream = false;
    }

    /// Enables or disables byte swapping for all subsequent primitive reads.
    pub fn set_byte_swapping(&mut self, swap: bool) {
        self.byte_swap = swap;
    }

    /// Returns true if primitive reads are byte swapped.
    pub fn byte_swapping(&self) -> bool {
        self.byte_swap
    }

    /// Starts a pass: clears the sticky failure and the property flag stack.
    pub fn begin_serialize(&mut self) {
        self.end_of_stream = false;
        self.flags.clear();
        self.pending_links.clear();
    }

    /// Ends a pass, returning true if no read ran short.
    pub fn end_serialize(&mut self) -> bool {
        !self.end_of_stream
    }

    /// Current cursor position in bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// Link indices read by [`serialize_object_ref`](Serializer::serialize_object_ref) this pass.
    pub fn pending_links(&self) -> &[u32] {
        &self.pending_links
    }

    /// Takes `N` bytes from the cursor, or marks end of stream.
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.end_of_stream || !self.flags.should_serialize() {
            return None;
        }

        let bytes = self
            .buffer
            .get(self.offset..self.offset + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok());

        match bytes {
            Some(bytes) => {
                self.offset += N;
                Some(bytes)
            }
            None => {
                self.end_of_stream = true;
                None
            }
        }
    }

    fn take_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.end_of_stream {
            return None;
        }

        let end = self.offset.checked_add(len);
        match end.and_then(|end| self.buffer.get(self.offset..end)) {
            Some(slice) => {
                self.offset += len;
                Some(slice)
            }
            None => {
                self.end_of_stream = true;
                None
            }
        }
    }
}

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:literal) => {
        fn $name(&mut self, value: &mut $ty) {
            if let Some(bytes) = self.take::<$size>() {
                let raw = <$ty>::from_le_bytes(bytes);
                *value = if self.byte_swap { raw.swap_bytes() } else { raw };
            }
        }
    };
}

impl Serializer for Deserializer<'_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    fn serialize_bool(&mut self, value: &mut bool) {
        let mut byte = u8::from(*value);
        self.serialize_u8(&mut byte);
        *value = byte != 0;
    }

    read_primitive!(serialize_u8, u8, 1);
    read_primitive!(serialize_u16, u16, 2);
    read_primitive!(serialize_u32, u32, 4);
    read_primitive!(serialize_u64, u64, 8);
    read_primitive!(serialize_i32, i32, 4);

    fn serialize_f32(&mut self, value: &mut f32) {
        let mut bits = value.to_bits();
        self.serialize_u32(&mut bits);
        *value = f32::from_bits(bits);
    }

    fn serialize_string(&mut self, value: &mut String) {
        let mut bytes = Vec::new();
        self.serialize_bytes(&mut bytes);
        if self.end_of_stream || !self.flags.should_serialize() {
            return;
        }
        match String::from_utf8(bytes) {
            Ok(string) => *value = string,
            Err(_) => self.end_of_stream = true,
        }
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>) {
        if !self.flags.should_serialize() {
            return;
        }

        let mut len = 0u32;
        self.serialize_u32(&mut len);
        if let Some(slice) = self.take_slice(len as usize) {
            *value = slice.to_vec();
        }
    }

    fn serialize_object_ref(&mut self, value: &mut ObjectRef) {
        if let Some(bytes) = self.take::<4>() {
            let raw = u32::from_le_bytes(bytes);
            let index = if self.byte_swap { raw.swap_bytes() } else { raw };
            *value = ObjectRef::from_link_index(index);
            if let ObjectRef::Link(link) = value {
                self.pending_links.push(*link);
            }
        }
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

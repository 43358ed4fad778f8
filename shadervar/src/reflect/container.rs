//! DXBC bytecode container

use crate::{Error, Result};

/// Container magic
pub const DXBC_MAGIC: [u8; 4] = *b"DXBC";

/// Resource definition chunk (constant buffers and bound resources)
pub const CHUNK_RDEF: [u8; 4] = *b"RDEF";

/// Statistics chunk (instruction counts)
pub const CHUNK_STAT: [u8; 4] = *b"STAT";

/// Offset of the chunk count in the container header
const HEADER_SIZE: usize = 32;

/// A parsed DXBC container: a list of fourcc-tagged chunks
#[derive(Debug, Clone)]
pub struct DxbcContainer<'a> {
    chunks: Vec<([u8; 4], &'a [u8])>,
}

impl<'a> DxbcContainer<'a> {
    /// Parses the container header and chunk table.
    ///
    /// Layout: magic, 16-byte checksum, version (1), total size, chunk count,
    /// then one absolute offset per chunk. Each chunk starts with its fourcc
    /// and data size.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.get(..4) != Some(&DXBC_MAGIC[..]) {
            return Err(Error::InvalidContainer("missing DXBC magic".into()));
        }

        let total_size = read_u32(bytes, 24)? as usize;
        if total_size > bytes.len() {
            return Err(Error::InvalidContainer(format!(
                "container claims {} bytes but only {} are available",
                total_size,
                bytes.len()
            )));
        }
        let bytes = &bytes[..total_size];

        let chunk_count = read_u32(bytes, 28)? as usize;
        let mut chunks = Vec::with_capacity(chunk_count.min(64));
        for i in 0..chunk_count {
            let offset = read_u32(bytes, HEADER_SIZE + i * 4)? as usize;
            let fourcc = read_fourcc(bytes, offset)?;
            let size = read_u32(bytes, offset + 4)? as usize;
            let data = offset
                .checked_add(8)
                .and_then(|start| bytes.get(start..start.checked_add(size)?))
                .ok_or_else(|| {
                    Error::InvalidContainer(format!(
                        "chunk {} extends past the end of the container",
                        String::from_utf8_lossy(&fourcc)
                    ))
                })?;
            chunks.push((fourcc, data));
        }

        Ok(DxbcContainer { chunks })
    }

    /// Returns true if `bytes` starts with the DXBC magic.
    pub fn is_dxbc(bytes: &[u8]) -> bool {
        bytes.starts_with(&DXBC_MAGIC)
    }

    /// Returns the data of the first chunk tagged `fourcc`.
    pub fn chunk(&self, fourcc: [u8; 4]) -> Option<&'a [u8]> {
        self.chunks.iter().find(|(tag, _)| *tag == fourcc).map(|(_, data)| *data)
    }

    /// Number of chunks in the container.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Reads a little-endian u32 at `offset`.
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::InvalidContainer(format!("read of 4 bytes at offset {offset} is out of bounds")))
}

/// Reads a little-endian u16 at `offset`.
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    offset
        .checked_add(2)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| <[u8; 2]>::try_from(slice).ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| Error::InvalidContainer(format!("read of 2 bytes at offset {offset} is out of bounds")))
}

pub(crate) fn read_fourcc(bytes: &[u8], offset: usize) -> Result<[u8; 4]> {
    read_u32(bytes, offset).map(u32::to_le_bytes)
}

/// Reads a NUL-terminated string at `offset`.
pub(crate) fn read_cstr(bytes: &[u8], offset: usize) -> Result<String> {
    let tail = bytes
        .get(offset..)
        .ok_or_else(|| Error::InvalidContainer(format!("string offset {offset} is out of bounds")))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::InvalidContainer(format!("unterminated string at offset {offset}")))?;
    Ok(std::str::from_utf8(&tail[..end])?.to_owned())
}

//! Resource packages (`.svpk`)
//!
//! A package stores one object: its persistent header bytes, the link table
//! its object references index into, and its sub-data buffers.
//!
//! ```text
//! "SVPK"  u32 version
//! bytes   persistent header
//! u32     link count, then length-prefixed object paths
//! u32     sub-data count, then length-prefixed buffers
//! ```

use crate::serialize::{BinarySerializer, Deserializer, ObjectRef, Serialize, Serializer, serialize_vec};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Package file magic
pub const PACKAGE_MAGIC: [u8; 4] = *b"SVPK";

/// Current package format version
pub const PACKAGE_VERSION: u32 = 1;

/// File extension of package files
pub const PACKAGE_EXTENSION: &str = "svpk";

/// Path of the package holding `object_path` under `root`.
///
/// # Example
/// ```
/// use std::path::Path;
/// let path = shadervar::package_path(Path::new("cache"), "shaders/lit.hlsl/p3");
/// assert_eq!(path, Path::new("cache/shaders/lit.hlsl/p3.svpk"));
/// ```
pub fn package_path(root: &Path, object_path: &str) -> PathBuf {
    root.join(format!("{object_path}.{PACKAGE_EXTENSION}"))
}

/// One persisted object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackage {
    /// Serialized persistent data of the object
    pub persistent: Vec<u8>,
    /// Sub-data buffers, loaded on demand
    pub sub_data: Vec<Vec<u8>>,
    /// Object paths referenced by link index from the persistent data
    pub links: Vec<String>,
}

impl ResourcePackage {
    /// Creates a package from an object's persistent data.
    pub fn from_object<T: Serialize>(object: &mut T, byte_swap: bool) -> Self {
        let mut s = BinarySerializer::new();
        s.set_byte_swapping(byte_swap);
        s.begin_serialize();
        object.serialize(&mut s);
        s.end_serialize();

        ResourcePackage {
            persistent: s.into_bytes(),
            ..Default::default()
        }
    }

    /// Adds a link and returns a reference to it.
    pub fn add_link(&mut self, object_path: impl Into<String>) -> ObjectRef {
        let object_path = object_path.into();
        let index = match self.links.iter().position(|link| *link == object_path) {
            Some(index) => index,
            None => {
                self.links.push(object_path);
                self.links.len() - 1
            }
        };
        ObjectRef::Link(index as u32)
    }

    /// Deserializes the persistent data into `object`.
    pub fn read_object<T: Serialize>(&self, object: &mut T, byte_swap: bool) -> Result<()> {
        let mut d = Deserializer::new(&self.persistent);
        d.set_byte_swapping(byte_swap);
        d.begin_serialize();
        object.serialize(&mut d);
        if !d.end_serialize() {
            return Err(Error::StreamTruncated { offset: d.offset() });
        }

        if let Some(link) = d.pending_links().iter().find(|link| **link as usize >= self.links.len()) {
            return Err(Error::InvalidContainer(format!(
                "link index {} out of range ({} links)",
                link,
                self.links.len()
            )));
        }
        Ok(())
    }

    /// Encodes the package file.
    pub fn write(&self) -> Vec<u8> {
        let mut persistent = self.persistent.clone();
        let mut links = self.links.clone();
        let mut sub_data = self.sub_data.clone();
        let mut version = PACKAGE_VERSION;

        let mut s = BinarySerializer::new();
        s.begin_serialize();
        s.write_raw(&PACKAGE_MAGIC);
        s.serialize_u32(&mut version);
        s.serialize_bytes(&mut persistent);
        serialize_vec(&mut s, &mut links);
        serialize_vec(&mut s, &mut sub_data);
        s.end_serialize();
        s.into_bytes()
    }

    /// Decodes a package file.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let Some(body) = bytes.strip_prefix(&PACKAGE_MAGIC[..]) else {
            return Err(Error::InvalidContainer("missing SVPK magic".into()));
        };

        let mut d = Deserializer::new(body);
        d.begin_serialize();

        let mut version = 0;
        d.serialize_u32(&mut version);
        if d.end_serialize() && version != PACKAGE_VERSION {
            return Err(Error::InvalidContainer(format!("unsupported package version {version}")));
        }

        let mut package = ResourcePackage::default();
        d.serialize_bytes(&mut package.persistent);
        serialize_vec(&mut d, &mut package.links);
        serialize_vec(&mut d, &mut package.sub_data);

        if !d.end_serialize() {
            return Err(Error::StreamTruncated {
                offset: d.offset() + PACKAGE_MAGIC.len(),
            });
        }
        Ok(package)
    }

    /// Writes the package to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.write())?;
        Ok(())
    }

    /// Reads a package from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        Self::read(&std::fs::read(path)?)
    }
}

//! On-disk layout of the embedding index.
//!
//! Two artifacts live side by side in the index directory:
//! - `metadata.json`: JSON array of `MetadataEntry`, one per row
//! - `embeddings.bin`: fixed header followed by `rows * dim` little-endian f32
//!
//! The header pins the BLAKE3 digest of the metadata bytes, so a blob is only
//! ever paired with the exact metadata it was written with.

use anyhow::Result;
use std::path::{Path, PathBuf};

use materia_core::error::Error;

pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
pub const METADATA_FILE: &str = "metadata.json";

pub const MAGIC: [u8; 4] = *b"MTEV";
pub const FORMAT_VERSION: u16 = 1;
/// magic(4) + version(2) + reserved(2) + dim(4) + rows(4) + digest(32)
pub const HEADER_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub dim: u32,
    pub rows: u32,
    pub metadata_digest: [u8; 32],
}

impl BlobHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dim.to_le_bytes());
        buf[12..16].copy_from_slice(&self.rows.to_le_bytes());
        buf[16..48].copy_from_slice(&self.metadata_digest);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(corrupt(format!("embedding blob truncated ({} bytes)", buf.len())));
        }
        if buf[0..4] != MAGIC {
            return Err(corrupt("embedding blob has wrong magic".to_string()));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported embedding blob version {}", version)));
        }
        let dim = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let rows = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        if dim == 0 && rows > 0 {
            return Err(corrupt("embedding blob has rows but zero dimension".to_string()));
        }
        let mut metadata_digest = [0u8; 32];
        metadata_digest.copy_from_slice(&buf[16..48]);
        Ok(Self { dim, rows, metadata_digest })
    }

    /// Byte length of the vector body that must follow the header.
    pub fn body_len(&self) -> usize { self.rows as usize * self.dim as usize * 4 }
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub embeddings: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self { embeddings: dir.join(EMBEDDINGS_FILE), metadata: dir.join(METADATA_FILE) }
    }
}

pub(crate) fn corrupt(msg: String) -> anyhow::Error { Error::Configuration(msg).into() }

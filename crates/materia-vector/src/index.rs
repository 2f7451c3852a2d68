use anyhow::Result;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use materia_core::types::MetadataEntry;

use crate::schema::{corrupt, ArtifactPaths, BlobHeader, HEADER_LEN};

/// One indexed record: its vector, the vector's L2 norm, and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub vector: Vec<f32>,
    pub norm: f32,
    pub entry: MetadataEntry,
}

/// Vectors and metadata held together per row, so the two can never drift
/// out of alignment in memory. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    dim: usize,
    rows: Vec<IndexRow>,
}

impl EmbeddingIndex {
    pub fn new(dim: usize) -> Self { Self { dim, rows: Vec::new() } }

    pub fn with_capacity(dim: usize, capacity: usize) -> Self { Self { dim, rows: Vec::with_capacity(capacity) } }

    /// Zip two parallel sequences into rows; lengths and dimensions must agree.
    pub fn from_parts(dim: usize, entries: Vec<MetadataEntry>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if entries.len() != vectors.len() {
            return Err(corrupt(format!("{} metadata rows but {} vectors", entries.len(), vectors.len())));
        }
        let mut index = Self::with_capacity(dim, entries.len());
        for (entry, vector) in entries.into_iter().zip(vectors) { index.push(entry, vector)?; }
        Ok(index)
    }

    pub fn push(&mut self, entry: MetadataEntry, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(corrupt(format!("vector has dimension {} but index expects {}", vector.len(), self.dim)));
        }
        let norm = l2_norm(&vector);
        self.rows.push(IndexRow { vector, norm, entry });
        Ok(())
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn rows(&self) -> &[IndexRow] { &self.rows }
    pub fn entry(&self, i: usize) -> &MetadataEntry { &self.rows[i].entry }

    /// Write both artifacts to temp files in `dir`, then rename them into
    /// place. Nothing is replaced unless both temp files were fully written,
    /// and a failed blob rename restores the previous metadata.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let paths = ArtifactPaths::in_dir(dir);
        let entries: Vec<&MetadataEntry> = self.rows.iter().map(|r| &r.entry).collect();
        let metadata = serde_json::to_vec_pretty(&entries)?;
        let header = BlobHeader {
            dim: u32::try_from(self.dim)?,
            rows: u32::try_from(self.rows.len())?,
            metadata_digest: *blake3::hash(&metadata).as_bytes(),
        };

        let mut meta_tmp = NamedTempFile::new_in(dir)?;
        meta_tmp.write_all(&metadata)?;
        meta_tmp.as_file().sync_all()?;

        let mut blob_tmp = NamedTempFile::new_in(dir)?;
        {
            let mut w = BufWriter::new(blob_tmp.as_file_mut());
            w.write_all(&header.to_bytes())?;
            for row in &self.rows {
                for x in &row.vector { w.write_all(&x.to_le_bytes())?; }
            }
            w.flush()?;
        }
        blob_tmp.as_file().sync_all()?;

        let previous_metadata = if paths.metadata.is_file() { Some(fs::read(&paths.metadata)?) } else { None };
        meta_tmp.persist(&paths.metadata).map_err(|e| e.error)?;
        if let Err(e) = blob_tmp.persist(&paths.embeddings) {
            // put the old metadata back so the previous pair still loads
            restore_metadata(dir, &paths, previous_metadata.as_deref())?;
            return Err(e.error.into());
        }
        sync_dir(dir)?;
        info!(dir = %dir.display(), rows = self.rows.len(), dim = self.dim, "saved embedding index");
        Ok(())
    }

    /// `Ok(None)` when there is no embedding blob in `dir`. A blob whose
    /// metadata is missing, altered, or of a different length is an error.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let paths = ArtifactPaths::in_dir(dir);
        if !paths.embeddings.exists() { return Ok(None); }
        let blob = fs::read(&paths.embeddings)?;
        let header = BlobHeader::from_bytes(&blob)?;
        if !paths.metadata.exists() {
            return Err(corrupt(format!("{} exists without {}", paths.embeddings.display(), paths.metadata.display())));
        }
        let metadata = fs::read(&paths.metadata)?;
        if blake3::hash(&metadata).as_bytes() != &header.metadata_digest {
            return Err(corrupt(format!("{} does not match {}", paths.metadata.display(), paths.embeddings.display())));
        }
        let entries: Vec<MetadataEntry> = serde_json::from_slice(&metadata)
            .map_err(|e| corrupt(format!("unreadable {}: {}", paths.metadata.display(), e)))?;
        if entries.len() != header.rows as usize {
            return Err(corrupt(format!("metadata has {} rows, blob has {}", entries.len(), header.rows)));
        }
        let body = &blob[HEADER_LEN..];
        if body.len() != header.body_len() {
            return Err(corrupt(format!("embedding body is {} bytes, expected {}", body.len(), header.body_len())));
        }

        let dim = header.dim as usize;
        let vectors: Vec<Vec<f32>> = if header.rows == 0 {
            Vec::new()
        } else {
            body.chunks_exact(dim * 4)
                .map(|row| row.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect())
                .collect()
        };
        let index = Self::from_parts(dim, entries, vectors)?;
        info!(rows = index.len(), dim, "loaded embedding index");
        Ok(Some(index))
    }

    /// Cosine similarity of `query` against every row, using stored norms.
    pub fn cosine_scores(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dim {
            return Err(materia_core::error::Error::Query(format!(
                "query dimension {} != index dimension {}",
                query.len(),
                self.dim
            ))
            .into());
        }
        let q_norm = l2_norm(query);
        Ok(self.rows.iter().map(|r| cosine(query, q_norm, &r.vector, r.norm)).collect())
    }
}

/// Read a metadata table on its own (realtime mode).
pub fn read_metadata(path: &Path) -> Result<Vec<MetadataEntry>> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("unreadable {}: {}", path.display(), e)))
}

fn restore_metadata(dir: &Path, paths: &ArtifactPaths, previous: Option<&[u8]>) -> Result<()> {
    match previous {
        Some(bytes) => {
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&paths.metadata).map_err(|e| e.error)?;
        }
        None => fs::remove_file(&paths.metadata)?,
    }
    warn!(path = %paths.metadata.display(), "embedding blob not replaced, restored previous metadata");
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> { Ok(()) }

pub fn l2_norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

/// Zero-norm operands score 0.0.
pub fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    let denom = a_norm * b_norm;
    if denom <= f32::EPSILON { return 0.0; }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / denom
}

//! IVDX (image vector index) binary sidecar format and store.
//!
//! Format overview (little-endian):
//!
//! Header:
//!   Magic: "IVDX" (4 bytes)
//!   Version: u16
//!   Count: u32
//!   HeaderCRC32: u32 (CRC32 of header bytes before this field)
//!
//! Entries (variable size, `Count` of them):
//!   IdLen: u32
//!   Id: bytes (UTF-8, the image path)
//!   Dimension: u32
//!   Components: Dimension x f32
//!
//! Entries carry their own dimension because the embedding length follows
//! whichever backend was active when the image was indexed; a query only
//! scores entries whose dimension matches. Mutations rewrite the file via a
//! temp-and-rename so a crash never leaves a half-written index.

use anyhow::{Context, Result, bail};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const IVDX_MAGIC: [u8; 4] = *b"IVDX";
pub const IVDX_VERSION: u16 = 1;

/// Persistent vector store with brute-force cosine search.
pub struct VectorStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Vec<f32>>>,
}

impl VectorStore {
    /// Open the store at `path`, loading the sidecar if present.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.is_file() {
            let loaded = read_index(path)
                .with_context(|| format!("load vector index {}", path.display()))?;
            info!(
                path = %path.display(),
                entries = loaded.len(),
                "loaded vector index"
            );
            loaded
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Insert or replace the embedding for `id` and persist.
    pub fn add_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            bail!("refusing to store an empty embedding for {id}");
        }
        let mut entries = self.entries.write();
        entries.insert(id.to_string(), embedding.to_vec());
        self.persist(&entries)
    }

    /// Remove the embedding for `id` and persist. No error if absent.
    pub fn remove_embedding(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(id).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    /// Nearest-first ids by cosine similarity to `query`.
    ///
    /// Entries whose dimension differs from the query are skipped; at most
    /// `top_k` results are returned, fewer if the index is smaller.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        if top_k == 0 || query.is_empty() {
            return Vec::new();
        }
        let entries = self.entries.read();
        let mut hits: Vec<(String, f32)> = entries
            .iter()
            .filter(|(_, v)| v.len() == query.len())
            .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(top_k);
        hits
    }

    fn persist(&self, entries: &BTreeMap<String, Vec<f32>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create vector index dir {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("ivdx.tmp");
        write_index(&tmp, entries)
            .with_context(|| format!("write vector index {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace vector index {}", self.path.display()))?;
        debug!(entries = entries.len(), "vector index persisted");
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

fn write_index(path: &Path, entries: &BTreeMap<String, Vec<f32>>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    let mut header = Vec::with_capacity(10);
    header.extend_from_slice(&IVDX_MAGIC);
    header.extend_from_slice(&IVDX_VERSION.to_le_bytes());
    let count = u32::try_from(entries.len()).context("too many vector entries")?;
    header.extend_from_slice(&count.to_le_bytes());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header);
    writer.write_all(&header)?;
    writer.write_all(&hasher.finalize().to_le_bytes())?;

    for (id, embedding) in entries {
        let id_bytes = id.as_bytes();
        let id_len = u32::try_from(id_bytes.len()).context("id too long")?;
        writer.write_all(&id_len.to_le_bytes())?;
        writer.write_all(id_bytes)?;
        let dim = u32::try_from(embedding.len()).context("embedding too long")?;
        writer.write_all(&dim.to_le_bytes())?;
        for component in embedding {
            writer.write_all(&component.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_index(path: &Path) -> Result<BTreeMap<String, Vec<f32>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header_bytes = Vec::new();

    let magic = read_exact::<4, _>(&mut reader, &mut header_bytes).context("read IVDX magic")?;
    if magic != IVDX_MAGIC {
        bail!("invalid IVDX magic: {magic:?}");
    }
    let version = read_u16_le(&mut reader, &mut header_bytes).context("read IVDX version")?;
    if version != IVDX_VERSION {
        bail!("unsupported IVDX version: {version}");
    }
    let count = read_u32_le(&mut reader, &mut header_bytes).context("read entry count")?;

    let crc_expected = read_u32_le(&mut reader, &mut Vec::new()).context("read header crc")?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_bytes);
    let crc_actual = hasher.finalize();
    if crc_actual != crc_expected {
        bail!("header CRC mismatch (expected {crc_expected:#010x}, got {crc_actual:#010x})");
    }

    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let id_len = read_u32_le(&mut reader, &mut Vec::new()).context("read id length")? as usize;
        let mut id_bytes = vec![0u8; id_len];
        reader.read_exact(&mut id_bytes).context("read id")?;
        let id = String::from_utf8(id_bytes).context("id is not valid UTF-8")?;

        let dim = read_u32_le(&mut reader, &mut Vec::new()).context("read dimension")? as usize;
        let mut embedding = Vec::with_capacity(dim);
        let mut buf = [0u8; 4];
        for _ in 0..dim {
            reader.read_exact(&mut buf).context("read component")?;
            embedding.push(f32::from_le_bytes(buf));
        }
        entries.insert(id, embedding);
    }
    Ok(entries)
}

fn read_exact<const N: usize, R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    accum.extend_from_slice(&buf);
    Ok(buf)
}

fn read_u16_le<R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<u16> {
    let buf = read_exact::<2, _>(reader, accum)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<u32> {
    let buf = read_exact::<4, _>(reader, accum)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(tmp: &tempfile::TempDir) -> VectorStore {
        VectorStore::open(&tmp.path().join("vectors.ivdx")).unwrap()
    }

    #[test]
    fn roundtrips_through_disk() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("vectors.ivdx");
        {
            let store = VectorStore::open(&path).unwrap();
            store.add_embedding("/pics/a.jpg", &[1.0, 0.0, 0.0]).unwrap();
            store.add_embedding("/pics/b.jpg", &[0.0, 1.0, 0.0]).unwrap();
        }
        let reopened = VectorStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains("/pics/a.jpg"));
        assert!(reopened.contains("/pics/b.jpg"));
    }

    #[test]
    fn search_is_nearest_first() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.add_embedding("x", &[1.0, 0.0]).unwrap();
        store.add_embedding("y", &[0.7, 0.7]).unwrap();
        store.add_embedding("z", &[0.0, 1.0]).unwrap();

        let hits = store.search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "x");
        assert_eq!(hits[1].0, "y");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn search_skips_mismatched_dimensions() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.add_embedding("two", &[1.0, 0.0]).unwrap();
        store.add_embedding("three", &[1.0, 0.0, 0.0]).unwrap();

        let hits = store.search(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "two");
    }

    #[test]
    fn removal_is_idempotent() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.add_embedding("a", &[1.0]).unwrap();
        store.remove_embedding("a").unwrap();
        store.remove_embedding("a").unwrap();
        store.remove_embedding("never-there").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_header_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("vectors.ivdx");
        {
            let store = VectorStore::open(&path).unwrap();
            store.add_embedding("a", &[1.0, 2.0]).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[6] ^= 0xff; // flip a bit inside the count field
        fs::write(&path, bytes).unwrap();

        assert!(VectorStore::open(&path).is_err());
    }

    #[test]
    fn fewer_than_top_k_is_fine() {
        let tmp = tempdir().unwrap();
        let store = store(&tmp);
        store.add_embedding("only", &[0.5, 0.5]).unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 10).len(), 1);
        assert!(store.search(&[1.0, 0.0], 0).is_empty());
    }
}

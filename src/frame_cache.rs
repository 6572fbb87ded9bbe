//! On-disk cache of decoded GIF frame sequences.
//!
//! Decoding and resizing every frame of a large GIF is slow, so the result is
//! stored once per (source path, transform options) pair and reused on later
//! runs. Entries are never invalidated automatically; `clear()` drops them.
//!
//! # File format
//!
//! All integers little-endian.
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | magic `IDFC` |
//! | 4 | 2 | version (1) |
//! | 6 | 4 | frame count |
//! | 10 | 4 | pixel bytes per frame |
//! | 14 | 4 | CRC-32 (ISO-HDLC) of the body |
//! | 18 | .. | body: per frame, u32 delay in ms, then the pixels |

use std::fs;
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_32_ISO_HDLC};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use idisplay_transport::PixelBuffer;

use crate::pipeline::{Frame, TransformOptions};

const MAGIC: &[u8; 4] = b"IDFC";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 18;
const EXTENSION: &str = "frames";

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cache entry: {0}")]
    Malformed(String),

    #[error("Cannot serialize cache key: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Identifies one cached frame sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    file_name: String,
}

impl CacheKey {
    /// Hash the source path and the canonical JSON of the options
    pub fn new(source: &Path, options: &TransformOptions) -> Result<Self, CacheError> {
        let options_json = serde_json::to_string(options)?;
        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(options_json.as_bytes());
        let digest = hasher.finalize();

        let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frames".to_string());
        Ok(Self {
            file_name: format!("{stem}-{hex}.{EXTENSION}"),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// A file in the cache directory
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub path: PathBuf,
    pub size: u64,
}

/// Directory-backed frame cache
#[derive(Debug, Clone)]
pub struct FrameCache {
    dir: PathBuf,
}

impl FrameCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cache/idisplay` or the platform equivalent
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("idisplay")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(&self, source: &Path, options: &TransformOptions) -> Result<CacheKey, CacheError> {
        CacheKey::new(source, options)
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Load a cached sequence
    ///
    /// Missing, unreadable or corrupt entries all return None so the caller
    /// falls back to decoding the source.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Frame>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        match decode(&bytes) {
            Ok(frames) => {
                debug!("Cache hit {} ({} frames)", key.file_name(), frames.len());
                Some(frames)
            }
            Err(e) => {
                warn!("Ignoring cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a sequence, replacing any previous entry atomically
    pub fn put(&self, key: &CacheKey, frames: &[Frame]) -> Result<(), CacheError> {
        let bytes = encode(frames)?;
        fs::create_dir_all(&self.dir)?;

        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!(
            ".{}.{:08x}.tmp",
            key.file_name(),
            rand::random::<u32>()
        ));
        if let Err(e) = fs::write(&tmp_path, &bytes).and_then(|_| fs::rename(&tmp_path, &final_path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        debug!("Cached {} frames as {}", frames.len(), key.file_name());
        Ok(())
    }

    /// List cache files with their sizes
    pub fn entries(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            entries.push(CacheEntryInfo {
                size: entry.metadata()?.len(),
                path,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Remove every cache file, returning how many were deleted
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = self.entries()?;
        for entry in &entries {
            fs::remove_file(&entry.path)?;
        }
        Ok(entries.len())
    }
}

fn encode(frames: &[Frame]) -> Result<Vec<u8>, CacheError> {
    let pixel_len = frames
        .first()
        .map(|f| f.pixels.len())
        .ok_or_else(|| CacheError::Malformed("no frames to cache".to_string()))?;

    let mut body = Vec::with_capacity(frames.len() * (4 + pixel_len));
    for frame in frames {
        body.extend_from_slice(&frame.delay_ms.to_le_bytes());
        body.extend_from_slice(frame.pixels.as_bytes());
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&(pixel_len as u32).to_le_bytes());
    out.extend_from_slice(&CRC32.checksum(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn decode(bytes: &[u8]) -> Result<Vec<Frame>, CacheError> {
    let malformed = |msg: &str| CacheError::Malformed(msg.to_string());

    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(malformed("bad magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(CacheError::Malformed(format!("unsupported version {version}")));
    }
    let count = read_u32(bytes, 6) as usize;
    let pixel_len = read_u32(bytes, 10) as usize;
    let crc = read_u32(bytes, 14);
    if count == 0 {
        return Err(malformed("zero frames"));
    }

    let body = &bytes[HEADER_LEN..];
    let stride = 4 + pixel_len;
    if body.len() != count.saturating_mul(stride) {
        return Err(malformed("length mismatch"));
    }
    if CRC32.checksum(body) != crc {
        return Err(malformed("checksum mismatch"));
    }

    body.chunks_exact(stride)
        .map(|chunk| {
            let delay_ms = read_u32(chunk, 0);
            let pixels = PixelBuffer::from_bgr(chunk[4..].to_vec())
                .map_err(|e| CacheError::Malformed(e.to_string()))?;
            Ok(Frame { pixels, delay_ms })
        })
        .collect()
}

//! On-disk persistence of the function-hash table and the result table.
//!
//! Both tables live in one directory as `functions.bin` and `results.bin`.
//! Each file is framed as:
//!
//! ```text
//! [u32 LE header length][bincode CacheHeader][bincode payload]
//! ```
//!
//! The header carries magic bytes, the format version, the tool version
//! that wrote the file, and a checksum of the payload. Writes go to a
//! sibling `.tmp` file that is renamed into place, so an aborted run leaves
//! either the old file or the new one. Reads are fail-soft: anything that
//! does not validate is discarded with a warning and the run starts cold.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ori_test_ir::ContentHash;

use super::TestCache;
use crate::change_detection::HashSnapshot;
use crate::error::CacheError;
use crate::report::Warning;

/// Magic bytes identifying an Ori test cache file.
const CACHE_MAGIC: [u8; 4] = *b"ORIT";

/// Current format version. Increment on breaking changes to the header,
/// the payload layout, or the hashing scheme.
const CACHE_FORMAT_VERSION: u32 = 1;

const FUNCTIONS_FILE: &str = "functions.bin";
const RESULTS_FILE: &str = "results.bin";

/// Header prepended to every cache file for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheHeader {
    magic: [u8; 4],
    format_version: u32,
    tool_version: String,
    checksum: ContentHash,
}

/// What [`CacheStore::load`] found on disk.
#[derive(Debug, Default)]
pub struct LoadedCache {
    /// Function hashes of the last complete run; `None` means cold.
    pub snapshot: Option<HashSnapshot>,
    pub results: TestCache,
    /// One entry per discarded file.
    pub warnings: Vec<Warning>,
}

/// Reads and writes the persisted cache in one directory.
#[derive(Clone, Debug)]
pub struct CacheStore {
    dir: PathBuf,
    tool_version: String,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, tool_version: impl Into<String>) -> Self {
        CacheStore {
            dir: dir.into(),
            tool_version: tool_version.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn functions_path(&self) -> PathBuf {
        self.dir.join(FUNCTIONS_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    /// Load both tables.
    ///
    /// Never fails. A missing file is a silent cold start; an unreadable one
    /// is a cold start plus a [`Warning::CacheDiscarded`].
    pub fn load(&self) -> LoadedCache {
        let mut loaded = LoadedCache::default();

        match self.read::<HashSnapshot>(&self.functions_path()) {
            Ok(snapshot) => loaded.snapshot = snapshot,
            Err(e) => loaded.warnings.push(discarded(&e)),
        }
        match self.read::<TestCache>(&self.results_path()) {
            Ok(results) => loaded.results = results.unwrap_or_default(),
            Err(e) => loaded.warnings.push(discarded(&e)),
        }

        tracing::debug!(
            dir = %self.dir.display(),
            functions = loaded.snapshot.as_ref().map_or(0, HashSnapshot::len),
            results = loaded.results.len(),
            discarded = loaded.warnings.len(),
            "loaded test cache"
        );
        loaded
    }

    /// Replace the persisted function-hash table.
    pub fn save_functions(&self, snapshot: &HashSnapshot) -> Result<(), CacheError> {
        self.write(&self.functions_path(), snapshot)
    }

    /// Replace the persisted result table.
    pub fn save_results(&self, results: &TestCache) -> Result<(), CacheError> {
        self.write(&self.results_path(), results)
    }

    /// Delete the persisted function-hash table so the next load is cold.
    ///
    /// Used when the result table could not be written. Missing is fine.
    pub fn discard_functions(&self) -> Result<(), CacheError> {
        let path = self.functions_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "discarded function hashes");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    /// Read and validate one file. `Ok(None)` if it does not exist.
    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CacheError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let payload = self.unframe(path, &raw)?;
        bincode::deserialize(payload)
            .map(Some)
            .map_err(|e| CacheError::Serialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Validate the header and return the payload slice.
    fn unframe<'a>(&self, path: &Path, raw: &'a [u8]) -> Result<&'a [u8], CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let len_bytes: [u8; 4] = raw
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| invalid("file shorter than header length"))?;
        let header_end = (u32::from_le_bytes(len_bytes) as usize).saturating_add(4);
        let header_bytes = raw
            .get(4..header_end)
            .ok_or_else(|| invalid("truncated header"))?;
        let header: CacheHeader =
            bincode::deserialize(header_bytes).map_err(|e| invalid(&e.to_string()))?;

        if header.magic != CACHE_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: CACHE_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.tool_version != self.tool_version {
            return Err(CacheError::ToolVersionMismatch {
                path: path.to_path_buf(),
                expected: self.tool_version.clone(),
                actual: header.tool_version,
            });
        }

        let payload = &raw[header_end..];
        let actual = ContentHash::of_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(payload)
    }

    /// Serialize `value` and atomically replace `path` with it.
    fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        let serialization = |e: bincode::Error| CacheError::Serialization {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let io = |e: std::io::Error, at: &Path| CacheError::Io {
            path: at.to_path_buf(),
            source: e,
        };

        let payload = bincode::serialize(value).map_err(serialization)?;
        let header = CacheHeader {
            magic: CACHE_MAGIC,
            format_version: CACHE_FORMAT_VERSION,
            tool_version: self.tool_version.clone(),
            checksum: ContentHash::of_bytes(&payload),
        };
        let output = frame(&header, &payload).map_err(serialization)?;

        fs::create_dir_all(&self.dir).map_err(|e| io(e, &self.dir))?;
        let tmp = tmp_path(path);
        fs::write(&tmp, &output).map_err(|e| io(e, &tmp))?;
        fs::rename(&tmp, path).map_err(|e| io(e, path))?;

        tracing::debug!(path = %path.display(), bytes = output.len(), "wrote test cache");
        Ok(())
    }
}

/// `[u32 LE header length][header][payload]`.
fn frame(header: &CacheHeader, payload: &[u8]) -> Result<Vec<u8>, bincode::Error> {
    let header_bytes = bincode::serialize(header)?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        Box::new(bincode::ErrorKind::Custom("cache header too large".to_string()))
    })?;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(payload);
    Ok(output)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn discarded(error: &CacheError) -> Warning {
    tracing::warn!(path = %error.path().display(), %error, "discarding test cache");
    Warning::CacheDiscarded {
        path: error.path().clone(),
        reason: error.to_string(),
    }
}

//! Hit-File Format
//!
//! A hit-file is one tracker's snapshot: a 4-byte magic, a little-endian
//! format version, then the bincode-encoded [`HitFile`].

use crate::fsutil::write_atomic;
use crate::model::PointId;
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Leading bytes of every hit-file
pub const HIT_FILE_MAGIC: [u8; 4] = *b"CWHT";
/// Current hit-file format version
pub const HIT_FILE_VERSION: u32 = 1;
/// Extension used for hit-files
pub const HIT_FILE_EXTENSION: &str = "hits";

/// Snapshot of one module instance's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitFile {
    /// Module identifier
    pub module: String,
    /// Run correlation id
    pub run_id: String,
    /// Fingerprint of the map the module was instrumented with
    pub fingerprint: String,
    /// Non-zero counts by point
    pub hits: BTreeMap<PointId, u64>,
}

impl HitFile {
    /// Create a hit-file body
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        run_id: impl Into<String>,
        fingerprint: impl Into<String>,
        hits: BTreeMap<PointId, u64>,
    ) -> Self {
        Self {
            module: module.into(),
            run_id: run_id.into(),
            fingerprint: fingerprint.into(),
            hits,
        }
    }

    /// Encode with header
    pub fn encode(&self) -> CovResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(64 + self.hits.len() * 12);
        bytes.extend_from_slice(&HIT_FILE_MAGIC);
        bytes.extend_from_slice(&HIT_FILE_VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, self)?;
        Ok(bytes)
    }

    /// Decode bytes read from `path`
    pub fn decode(bytes: &[u8], path: &Path) -> CovResult<Self> {
        if bytes.len() < 8 {
            return Err(CovError::corrupt(path, "file is shorter than its header"));
        }
        if bytes[..4] != HIT_FILE_MAGIC {
            return Err(CovError::corrupt(path, "not a hit-file (bad magic)"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version != HIT_FILE_VERSION {
            return Err(CovError::corrupt(
                path,
                format!("unsupported format version {version} (expected {HIT_FILE_VERSION})"),
            ));
        }
        bincode::deserialize(&bytes[8..]).map_err(|e| CovError::corrupt(path, e.to_string()))
    }

    /// Publish atomically
    pub fn write(&self, path: &Path) -> CovResult<()> {
        write_atomic(path, &self.encode()?)
    }

    /// Read a hit-file; `Ok(None)` when it does not exist
    pub fn read(path: &Path) -> CovResult<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode(&bytes, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Sum of all counts
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.hits.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }
}

/// File name for one tracker instance
#[must_use]
pub fn hit_file_name(module: &str, run_id: &str, pid: u32, instance: u32) -> String {
    format!(
        "{}.{}.{pid}.{instance}.{HIT_FILE_EXTENSION}",
        sanitize(module),
        sanitize(run_id)
    )
}

/// Glob matching every hit-file of a run (or of any run)
#[must_use]
pub fn hit_file_pattern(run_id: Option<&str>) -> String {
    match run_id {
        Some(id) => format!("*.{}.*.*.{HIT_FILE_EXTENSION}", sanitize(id)),
        None => format!("*.{HIT_FILE_EXTENSION}"),
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

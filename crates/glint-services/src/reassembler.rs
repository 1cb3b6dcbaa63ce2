//! Reassembly — concatenates stored payloads into the output artifact.
//!
//! Output is a best-effort concatenation in index order. Nothing here checks
//! that the bytes match the file the sender started from; under the tolerant
//! policy the result may have holes, which are listed in `Assembled::missing`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};

use crate::chunk_store::ChunkStore;

/// What to do about indices that never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    /// Leave the gap out without comment.
    Skip,
    /// Leave the gap out and log a warning per missing index.
    Warn,
}

/// A reassembled transfer, ready to hand to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    /// Name to save under, derived from the session's file tag.
    pub file_name: String,
    pub data: Bytes,
    /// Ascending indices absent from `data`.
    pub missing: Vec<u32>,
}

impl Assembled {
    /// Concatenate payloads `0..total` from `store`.
    pub fn from_store(file_name: String, store: &ChunkStore, total: u32, gaps: GapPolicy) -> Self {
        let mut data = BytesMut::new();
        let mut missing = Vec::new();

        for index in 0..total {
            match store.get(index) {
                Some(payload) => data.extend_from_slice(&payload),
                None => {
                    if gaps == GapPolicy::Warn {
                        tracing::warn!(index, total, "missing chunk during reassembly");
                    }
                    missing.push(index);
                }
            }
        }

        Self {
            file_name,
            data: data.freeze(),
            missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Write `artifact` into `dir` as `dir/<file_name>`.
///
/// Writes are atomic: write to a temp file, then rename. An existing file
/// of the same name is replaced.
pub fn write_artifact(dir: &Path, artifact: &Assembled) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;

    let path = dir.join(&artifact.file_name);
    let tmp_path = dir.join(format!(".{}.tmp", artifact.file_name));
    {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
        file.write_all(&artifact.data)
            .context("failed to write reassembled data")?;
        file.sync_all().context("failed to sync output to disk")?;
    }

    fs::rename(&tmp_path, &path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    tracing::info!(
        path = %path.display(),
        bytes = artifact.data.len(),
        missing = artifact.missing.len(),
        "transfer written"
    );
    Ok(path)
}

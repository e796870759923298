//! Deleted-document codec.
//!
//! A segment's deletions live next to its data as `<stem>.del`: a `u64` LE
//! payload byte count followed by the deleted offsets as `u32` LE. Writes
//! append: the existing file is copied to a temp sibling, the header is
//! rewritten with the grown byte count, the new offsets are appended, and
//! the temp file is renamed over the original so a concurrent reader never
//! observes a half-written file.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use quiver_core::QuiverError;

pub const DELETED_DOCS_SUFFIX: &str = ".del";
const TEMP_SUFFIX: &str = ".del.tmp";

/// Offset of a deleted document within its segment.
pub type DocOffset = u32;

const OFFSET_BYTES: usize = std::mem::size_of::<DocOffset>();
const HEADER_BYTES: usize = std::mem::size_of::<u64>();

/// The set of deleted offsets for one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDocs {
    offsets: Vec<DocOffset>,
}

impl DeletedDocs {
    pub fn new(offsets: Vec<DocOffset>) -> Self {
        Self { offsets }
    }

    pub fn offsets(&self) -> &[DocOffset] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Reader/writer for the `.del` file format.
pub struct DeletedDocsFormat;

impl DeletedDocsFormat {
    /// The on-disk path for a segment stem, e.g. `seg_42` -> `seg_42.del`.
    pub fn file_path(stem: &Path) -> PathBuf {
        append_suffix(stem, DELETED_DOCS_SUFFIX)
    }

    /// Read the full deleted set for `stem`.
    pub fn read(stem: &Path) -> Result<DeletedDocs, QuiverError> {
        let path = Self::file_path(stem);
        let mut file = fs::File::open(&path)?;

        let num_bytes = read_header(&mut file, &path)?;
        let payload_len = file.metadata()?.len().saturating_sub(HEADER_BYTES as u64);
        if num_bytes != payload_len {
            return Err(QuiverError::Codec(format!(
                "corrupt deleted docs header in {}: header claims {} payload bytes, file has {}",
                path.display(),
                num_bytes,
                payload_len
            )));
        }
        let mut payload = vec![0u8; num_bytes as usize];
        file.read_exact(&mut payload)?;

        let offsets = payload
            .chunks_exact(OFFSET_BYTES)
            .map(|chunk| DocOffset::from_le_bytes(chunk.try_into().expect("chunk size checked")))
            .collect();

        Ok(DeletedDocs { offsets })
    }

    /// Append `deleted` to the set stored for `stem`.
    ///
    /// Writes go to a temp copy which atomically replaces the original, so
    /// a search reading the old file concurrently is never torn.
    pub fn write(stem: &Path, deleted: &DeletedDocs) -> Result<(), QuiverError> {
        let path = Self::file_path(stem);
        let temp = append_suffix(stem, TEMP_SUFFIX);

        let exists = path.exists();
        if exists {
            fs::copy(&path, &temp)?;
        }

        // A fresh file must not inherit leftovers from a temp a crashed
        // writer left behind.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!exists)
            .open(&temp)?;

        let old_bytes = if exists { read_header(&mut file, &temp)? } else { 0 };
        let new_bytes = old_bytes + (deleted.len() * OFFSET_BYTES) as u64;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&new_bytes.to_le_bytes())?;

        file.seek(SeekFrom::End(0))?;
        let mut payload = Vec::with_capacity(deleted.len() * OFFSET_BYTES);
        for offset in deleted.offsets() {
            payload.extend_from_slice(&offset.to_le_bytes());
        }
        file.write_all(&payload)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &path)?;
        debug!(
            path = %path.display(),
            appended = deleted.len(),
            total_bytes = new_bytes,
            "deleted docs written"
        );
        Ok(())
    }

    /// Number of deleted offsets stored for `stem`, from the header alone.
    pub fn read_size(stem: &Path) -> Result<usize, QuiverError> {
        let path = Self::file_path(stem);
        let mut file = fs::File::open(&path)?;
        let num_bytes = read_header(&mut file, &path)?;
        Ok(num_bytes as usize / OFFSET_BYTES)
    }
}

fn append_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut os = stem.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn read_header(file: &mut fs::File, path: &Path) -> Result<u64, QuiverError> {
    let mut header = [0u8; HEADER_BYTES];
    file.read_exact(&mut header)?;
    let num_bytes = u64::from_le_bytes(header);
    if num_bytes % OFFSET_BYTES as u64 != 0 {
        return Err(QuiverError::Codec(format!(
            "corrupt deleted docs header in {}: {} is not a multiple of {}",
            path.display(),
            num_bytes,
            OFFSET_BYTES
        )));
    }
    Ok(num_bytes)
}

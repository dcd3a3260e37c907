pub mod walkdir_source;

use crate::backup::result_error::result::Result;
use chrono::{DateTime, Utc};
use dyn_iter::DynIter;
use getset::{CopyGetters, Getters};
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

/// A single regular file to be written into a backup archive.
///
/// Only exists while a source is being walked. The metadata is captured at
/// walk time and is what the tar header records.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct ArchiveEntry {
    /// Absolute path on the filesystem.
    #[getset(get = "pub")]
    src: Arc<Path>,

    /// Name inside the archive: `src` with the source root stripped.
    #[getset(get = "pub")]
    dst: Arc<Path>,

    #[getset(get_copy = "pub")]
    size: u64,

    #[getset(get_copy = "pub")]
    modified: DateTime<Utc>,

    /// Permission bits (`st_mode & 0o7777` on unix).
    #[getset(get_copy = "pub")]
    mode: u32,
}

impl ArchiveEntry {
    pub fn new<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(
        src: A,
        dst: B,
        metadata: &Metadata,
    ) -> Result<ArchiveEntry> {
        Ok(Self {
            src: src.into(),
            dst: dst.into(),
            size: metadata.len(),
            modified: metadata.modified()?.into(),
            mode: permission_bits(metadata),
        })
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Produces the entries of one backup source, in the order they are archived.
///
/// The iterator yields `Err` for walk failures. Consumers stop at the first
/// one so an incomplete archive is never published.
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}

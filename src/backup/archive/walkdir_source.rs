use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};

use bon::Builder;
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// One configured directory tree to back up.
///
/// Walks `src_dir` recursively in file-name order. Hidden entries (base name
/// starting with `.`) are skipped at every depth, together with everything
/// under a hidden directory. Directories themselves are never emitted, so an
/// empty subdirectory does not appear in the archive.
#[derive(Clone, Debug, Serialize, Deserialize, Builder, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct SourceDir {
    #[builder(into)]
    src_dir: PathBuf,
}

impl From<PathBuf> for SourceDir {
    fn from(src_dir: PathBuf) -> Self {
        SourceDir { src_dir }
    }
}

impl SourceDir {
    /// Base name used as the archive name prefix.
    pub fn base_name(&self) -> Result<String> {
        self.src_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidSourceDir(self.src_dir.clone()))
    }
}

impl ArchiveEntryIterable for SourceDir {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.src_dir.is_dir() {
            tracing::error!(
                "Source directory does not exist or is not a directory: {:?}",
                self.src_dir
            );
            return Err(Error::InvalidSourceDir(self.src_dir.clone()))
                .add_fn_name(function_path!());
        }

        tracing::debug!("Scanning directory {:?}", self.src_dir);

        let src_dir = self.src_dir.clone();

        let entries = WalkDir::new(&self.src_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|de| de.depth() == 0 || !is_hidden(de.file_name()))
            .filter_map(move |res| match res {
                Ok(de) => process_dir_entry(de, &src_dir),
                Err(e) => Some(Err(e.into())),
            })
            .map(move |res| res.add_fn_name(function_path!()));

        Ok(entries.into_dyn_iter())
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

fn process_dir_entry<P: AsRef<Path>>(
    de: DirEntry,
    base_src_dir: P,
) -> Option<Result<ArchiveEntry>> {
    let file_type = de.file_type();
    if file_type.is_dir() {
        return None;
    }
    if !file_type.is_file() {
        tracing::warn!("Skipping {:?}, not a regular file", de.path());
        return None;
    }

    let res = de
        .metadata()
        .map_err(Error::from)
        .and_then(|metadata| {
            let dst = de.path().strip_prefix(base_src_dir.as_ref()).map_err(|e| {
                Error::from(e).add_msg(format!(
                    "Stripping {:?} from {:?} failed",
                    base_src_dir.as_ref(),
                    de.path()
                ))
            })?;
            ArchiveEntry::new(de.path(), dst, &metadata)
        });

    if let Ok(entry) = &res {
        tracing::trace!("Including file: {:?} -> {:?}", entry.src(), entry.dst());
    }
    Some(res)
}

use crate::backup::compress;
use crate::backup::encrypt;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::tar::TAR_FILE_EXT;
use chrono::{DateTime, Duration, Utc};
use function_name::named;
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

pub static DEFAULT_RETENTION_DAYS: i64 = 7;

/// Age-based retention for one output directory tree.
///
/// The filesystem is the catalog: every sweep re-walks the tree and judges
/// archives by their modification time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    retention_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// What a sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_files: Vec<PathBuf>,
    pub removed_dirs: Vec<PathBuf>,
}

impl SweepReport {
    pub fn deleted_any(&self) -> bool {
        !self.deleted_files.is_empty()
    }
}

impl RetentionPolicy {
    /// Anything `<= 0` falls back to [`DEFAULT_RETENTION_DAYS`].
    pub fn from_days(days: i64) -> Self {
        if days <= 0 {
            Self::default()
        } else {
            Self {
                retention_days: days,
            }
        }
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    pub fn retention(&self) -> Duration {
        Duration::try_days(self.retention_days).unwrap_or(Duration::MAX)
    }

    /// True when `modified` is strictly older than `now - retention`.
    pub fn is_expired(&self, modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.checked_sub_signed(self.retention())
            .is_some_and(|cutoff| modified < cutoff)
    }

    pub fn sweep<P: AsRef<Path>>(&self, out_dir: P) -> Result<SweepReport> {
        self.sweep_at(out_dir, Utc::now())
    }

    /// Deletes expired archives under `out_dir`, then every directory that
    /// is left empty.
    ///
    /// The walk is contents-first, so a directory is inspected only after
    /// everything beneath it was handled and parents emptied by the sweep
    /// are pruned in the same pass. `out_dir` itself is never removed. The
    /// first I/O error aborts the sweep.
    #[named]
    pub fn sweep_at<P: AsRef<Path>>(&self, out_dir: P, now: DateTime<Utc>) -> Result<SweepReport> {
        let out_dir = out_dir.as_ref();
        let mut report = SweepReport::default();
        tracing::debug!(
            "Sweeping {:?} for archives older than {} days",
            out_dir,
            self.retention_days
        );

        for de in WalkDir::new(out_dir).min_depth(1).contents_first(true) {
            let de = de.map_err(Error::from).add_fn_name(function_path!())?;
            let path = de.path();
            if de.file_type().is_dir() {
                if is_empty_dir(path)? {
                    tracing::info!("Removing empty directory {:?}", path);
                    std::fs::remove_dir(path)
                        .map_err(Error::from)
                        .add_msg(format!("Removing directory {path:?} failed"))
                        .add_fn_name(function_path!())?;
                    report.removed_dirs.push(path.to_path_buf());
                }
            } else if de.file_type().is_file() && is_archive_file_name(de.file_name()) {
                let modified: DateTime<Utc> = de
                    .metadata()
                    .map_err(Error::from)
                    .and_then(|m| Ok(m.modified()?))
                    .add_fn_name(function_path!())?
                    .into();
                if self.is_expired(modified, now) {
                    tracing::info!("Removing out of retention file {:?}", path);
                    std::fs::remove_file(path)
                        .map_err(Error::from)
                        .add_msg(format!("Removing archive {path:?} failed"))
                        .add_fn_name(function_path!())?;
                    report.deleted_files.push(path.to_path_buf());
                }
            }
        }

        Ok(report)
    }
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

static ARCHIVE_SUFFIXES: OnceLock<Vec<String>> = OnceLock::new();

/// Every file name suffix this tool can produce: `.tar`, `.tar.gz`,
/// `.tar.xz`, each optionally followed by `.age`.
pub fn archive_suffixes() -> &'static [String] {
    ARCHIVE_SUFFIXES.get_or_init(|| {
        compress::known_file_exts()
            .into_iter()
            .cartesian_product(encrypt::known_file_exts())
            .map(|(c, e)| {
                std::iter::once(TAR_FILE_EXT)
                    .chain(c)
                    .chain(e)
                    .fold(String::new(), |acc, ext| acc + "." + ext)
            })
            .collect_vec()
    })
}

pub fn is_archive_file_name<S: AsRef<std::ffi::OsStr>>(name: S) -> bool {
    let name = name.as_ref().to_string_lossy();
    archive_suffixes()
        .iter()
        .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn touch(path: &Path, modified: DateTime<Utc>) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let f = File::create(path).unwrap();
        f.set_modified(SystemTime::from(modified)).unwrap();
    }

    #[test]
    fn test_from_days_defaults() {
        assert_eq!(RetentionPolicy::from_days(0).retention_days(), 7);
        assert_eq!(RetentionPolicy::from_days(-3).retention_days(), 7);
        assert_eq!(RetentionPolicy::from_days(30).retention_days(), 30);
        assert!(!RetentionPolicy::from_days(i64::MAX).is_expired(DateTime::UNIX_EPOCH, Utc::now()));
    }

    #[test]
    fn test_is_expired_is_strict() {
        let now = Utc::now();
        let policy = RetentionPolicy::from_days(7);
        assert!(!policy.is_expired(now - Duration::days(7), now));
        assert!(policy.is_expired(now - Duration::days(7) - Duration::seconds(1), now));
        assert!(!policy.is_expired(now - Duration::days(1), now));
    }

    #[test]
    fn test_archive_file_names() {
        assert!(is_archive_file_name("project_2024-01-01_00-00-00.tar.gz"));
        assert!(is_archive_file_name("project_2024-01-01_00-00-00.tar.xz"));
        assert!(is_archive_file_name("project.tar"));
        assert!(is_archive_file_name("project.tar.gz.age"));
        assert!(!is_archive_file_name("project.tar.gz.tmp"));
        assert!(!is_archive_file_name("notes.txt"));
        assert!(!is_archive_file_name(".tar.gz"));
        assert_eq!(archive_suffixes().len(), 6);
    }

    #[test]
    fn test_sweep_deletes_only_expired_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let old = dir.path().join("project_old.tar.gz");
        let recent = dir.path().join("project_recent.tar.gz");
        touch(&old, now - Duration::days(10));
        touch(&recent, now - Duration::days(1));
        let policy = RetentionPolicy::from_days(7);

        let report = policy.sweep_at(dir.path(), now).unwrap();

        assert_eq!(report.deleted_files, vec![old.clone()]);
        assert!(report.deleted_any());
        assert!(!old.exists());
        assert!(recent.exists());

        let report = policy.sweep_at(dir.path(), now).unwrap();
        assert!(!report.deleted_any());
        assert!(report.removed_dirs.is_empty());
        assert!(recent.exists());
    }

    #[test]
    fn test_sweep_ignores_non_archives() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let notes = dir.path().join("notes.txt");
        let partial = dir.path().join("project.tar.gz.tmp");
        let encrypted = dir.path().join("project.tar.gz.age");
        touch(&notes, now - Duration::days(30));
        touch(&partial, now - Duration::days(30));
        touch(&encrypted, now - Duration::days(30));

        let report = RetentionPolicy::default().sweep_at(dir.path(), now).unwrap();

        assert_eq!(report.deleted_files, vec![encrypted]);
        assert!(notes.exists());
        assert!(partial.exists());
    }

    #[test]
    fn test_sweep_prunes_emptied_directories_bottom_up() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let nested = dir.path().join("host/project/project_old.tar.gz");
        let kept = dir.path().join("other/project_new.tar.gz");
        touch(&nested, now - Duration::days(10));
        touch(&kept, now - Duration::days(1));
        std::fs::create_dir_all(dir.path().join("already_empty")).unwrap();

        let report = RetentionPolicy::default().sweep_at(dir.path(), now).unwrap();

        assert_eq!(report.deleted_files, vec![nested]);
        assert!(!dir.path().join("host").exists());
        assert!(!dir.path().join("already_empty").exists());
        assert!(dir.path().join("other").exists());
        assert!(kept.exists());
        assert!(dir.path().exists());
        assert_eq!(report.removed_dirs.len(), 3);
    }

    #[test]
    fn test_sweep_keeps_dirs_with_non_empty_children() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let kept = dir.path().join("a/b/project_new.tar.gz");
        touch(&kept, now - Duration::days(1));

        let report = RetentionPolicy::default().sweep_at(dir.path(), now).unwrap();

        assert!(report.removed_dirs.is_empty());
        assert!(dir.path().join("a/b").exists());
    }

    #[test]
    fn test_sweep_keeps_empty_out_dir() {
        let dir = TempDir::new().unwrap();
        let report = RetentionPolicy::default().sweep(dir.path()).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_sweep_missing_out_dir_fails() {
        let dir = TempDir::new().unwrap();
        assert!(RetentionPolicy::default()
            .sweep(dir.path().join("missing"))
            .is_err());
    }
}

use crate::backup::archive::walkdir_source::SourceDir;
use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::cancel::CancelToken;
use crate::backup::compress::{CompressorBuilder, CompressorConfig};
use crate::backup::encrypt::EncryptorConfig;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::status;
use bon::Builder;
use chrono::{DateTime, Local, TimeZone};
use function_name::named;
use getset::Getters;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError, Read, Write};
use std::path::{Path, PathBuf};

pub static TAR_FILE_EXT: &str = "tar";
static TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Totals for one written tar stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TarStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Header for a regular file, taken from the metadata captured at walk time.
fn entry_header(entry: &ArchiveEntry) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(entry.size());
    header.set_mode(entry.mode());
    header.set_mtime(u64::try_from(entry.modified().timestamp()).unwrap_or_default());
    header
}

/// Streams `entries` into a tar container on top of `writer`.
///
/// Stops at the first failed entry and checks `cancel` before each file.
/// A file whose size changed since it was walked fails the stream, since its
/// header is already fixed. Returns the writer once the end-of-archive blocks
/// are written.
pub fn write_tar<W, I>(entries: I, writer: W, cancel: &CancelToken) -> Result<(W, TarStats)>
where
    W: Write,
    I: IntoIterator<Item = Result<ArchiveEntry>>,
{
    let mut builder = tar::Builder::new(writer);
    let mut stats = TarStats::default();

    for entry in entries {
        cancel.check()?;
        let entry = entry?;
        let file = File::open(entry.src())
            .map_err(Error::from)
            .add_msg(format!("Opening {:?} failed", entry.src()))?;
        let len = file.metadata()?.len();
        if len != entry.size() {
            return Err(Error::from(std::io::Error::other(format!(
                "{:?} changed size while archiving ({} -> {len} bytes)",
                entry.src(),
                entry.size()
            ))));
        }
        let mut header = entry_header(&entry);
        builder
            .append_data(&mut header, entry.dst(), file.take(entry.size()))
            .map_err(Error::from)
            .add_msg(format!("Appending {:?} failed", entry.src()))?;
        stats.entries += 1;
        stats.bytes += entry.size();
    }

    tracing::debug!("Processed {} archive entries", stats.entries);
    Ok((builder.into_inner()?, stats))
}

/// Writes one archive per source into `out_dir`.
///
/// Output is named `<source base name>_<local time>.tar[.<compression>]`
/// and is written under a `.tmp` name first, so a failed or cancelled run
/// never leaves a partial archive behind. Two runs on the same source within
/// the same second produce the same name and the later one wins.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct ArchiveWriter {
    #[builder(into)]
    out_dir: PathBuf,
    #[builder(default)]
    compressor: CompressorConfig,
    #[builder(default)]
    encryptor: EncryptorConfig,
}

impl ArchiveWriter {
    /// `tar` plus the compression extension, e.g. `tar.gz`.
    pub fn archive_ext(&self) -> String {
        std::iter::once(TAR_FILE_EXT)
            .chain(self.compressor.file_ext())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn archive_file_name<Tz: TimeZone>(&self, source: &SourceDir, dt: &DateTime<Tz>) -> Result<String>
    where
        Tz::Offset: Display,
    {
        Ok(format!(
            "{}_{}.{}",
            source.base_name()?,
            dt.format(TIME_FORMAT),
            self.archive_ext()
        ))
    }

    /// Archives `source`, then encrypts it when an encryptor is configured.
    ///
    /// Returns the path of the final artifact. If encryption fails, the
    /// plaintext archive is left in place and the error is returned.
    #[named]
    pub fn create_archive<Tz: TimeZone>(
        &self,
        source: &SourceDir,
        dt: &DateTime<Tz>,
        cancel: &CancelToken,
    ) -> Result<PathBuf>
    where
        Tz::Offset: Display,
    {
        std::fs::create_dir_all(&self.out_dir)
            .map_err(Error::from)
            .add_msg(format!("Creating output dir {:?} failed", self.out_dir))?;

        let file_name = self.archive_file_name(source, dt)?;
        let file_path = self.out_dir.join(&file_name);
        let file_path_tmp = self.out_dir.join(format!("{file_name}.tmp"));

        let write_res = self
            .write_archive(source, &file_path_tmp, cancel)
            .and_then(|stats| {
                std::fs::rename(&file_path_tmp, &file_path)?;
                Ok(stats)
            });

        let stats = match write_res {
            Ok(stats) => stats,
            Err(mut e) => {
                if file_path_tmp.exists() {
                    if let Err(e2) = std::fs::remove_file(&file_path_tmp) {
                        e = e.chain(
                            Error::from(e2)
                                .add_msg(format!("Delete tmp file {file_path_tmp:?} failed")),
                        );
                    }
                }
                return Err(e)
                    .add_msg(format!("Archiving {:?} failed", source.src_dir()))
                    .add_fn_name(function_path!());
            }
        };

        tracing::info!(
            "Wrote {:?} ({} files, {} bytes before compression)",
            file_path,
            stats.entries,
            stats.bytes
        );

        if !self.encryptor.is_enabled() {
            return Ok(file_path);
        }

        status::print(status::encrypting(&file_path));
        match self.encryptor.encrypt_file(&file_path) {
            Ok(encrypted) => {
                status::print(status::encrypted(&encrypted));
                Ok(encrypted)
            }
            Err(e) => {
                status::print(status::encrypt_failed(&file_path, &e));
                Err(e).add_fn_name(function_path!())
            }
        }
    }

    fn write_archive<P: AsRef<Path>>(
        &self,
        source: &SourceDir,
        path: P,
        cancel: &CancelToken,
    ) -> Result<TarStats> {
        let entries = source.archive_entry_iterator()?;
        let writer = File::create(path.as_ref())
            .map(BufWriter::new)
            .map_err(Error::from)
            .and_then(|f| self.compressor.build_compressor(f))
            .map(BufWriter::new)?;

        let (writer, stats) = write_tar(entries, writer, cancel)?;

        writer
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .finish()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()?;

        Ok(stats)
    }
}

/// Archives `source_dir` into `output_root` as `.tar.gz`, encrypting the
/// result with `passphrase` when one is given.
pub fn create_archive<P1: AsRef<Path>, P2: AsRef<Path>>(
    source_dir: P1,
    output_root: P2,
    passphrase: Option<&RedactedString>,
) -> Result<PathBuf> {
    let writer = ArchiveWriter::builder()
        .out_dir(output_root.as_ref())
        .encryptor(passphrase.cloned().map(EncryptorConfig::from).unwrap_or_default())
        .build();
    let source = SourceDir::from(source_dir.as_ref().to_path_buf());
    writer.create_archive(&source, &Local::now(), &CancelToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::compress::xz::XzConfig;
    use crate::backup::encrypt::age::decrypt_archive;
    use chrono::NaiveDate;
    use flate2::read::GzDecoder;
    use itertools::Itertools;
    use liblzma::read::XzDecoder;
    use std::collections::BTreeMap;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_project(root: &Path) -> PathBuf {
        let project = root.join("project");
        std::fs::create_dir_all(project.join("sub")).unwrap();
        std::fs::write(project.join("a.txt"), "alpha").unwrap();
        std::fs::write(project.join(".hidden"), "do not archive").unwrap();
        std::fs::write(project.join("sub/b.txt"), "bravo").unwrap();
        project
    }

    fn read_tar<R: Read>(reader: R) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut content = Vec::new();
                e.read_to_end(&mut content).unwrap();
                (name, content)
            })
            .collect()
    }

    fn fixed_time() -> DateTime<chrono::Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 3)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_archive_file_name() {
        let writer = ArchiveWriter::builder().out_dir("/backups").build();
        let source = SourceDir::from(PathBuf::from("/data/project"));

        let name = writer.archive_file_name(&source, &fixed_time()).unwrap();
        assert_eq!(name, "project_2024-03-09_07-05-03.tar.gz");

        let writer = ArchiveWriter::builder()
            .out_dir("/backups")
            .compressor(CompressorConfig::None)
            .build();
        let name = writer.archive_file_name(&source, &fixed_time()).unwrap();
        assert_eq!(name, "project_2024-03-09_07-05-03.tar");
    }

    #[test]
    fn test_create_archive_gzip_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let out_dir = temp_dir.path().join("backups");

        let archive = create_archive(&project, &out_dir, None).unwrap();

        let name = archive.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("project_"));
        assert!(name.ends_with(".tar.gz"));
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 1);

        let contents = read_tar(GzDecoder::new(File::open(&archive).unwrap()));
        assert_eq!(contents.keys().collect_vec(), vec!["a.txt", "sub/b.txt"]);
        assert_eq!(contents["a.txt"], b"alpha");
        assert_eq!(contents["sub/b.txt"], b"bravo");
    }

    #[test]
    fn test_create_archive_xz() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let writer = ArchiveWriter::builder()
            .out_dir(temp_dir.path().join("out"))
            .compressor(CompressorConfig::Xz(XzConfig::default()))
            .build();

        let archive = writer
            .create_archive(
                &SourceDir::from(project),
                &fixed_time(),
                &CancelToken::new(),
            )
            .unwrap();

        assert!(archive.to_string_lossy().ends_with(".tar.xz"));
        let contents = read_tar(XzDecoder::new(File::open(&archive).unwrap()));
        assert_eq!(contents.len(), 2);
    }

    #[test]
    fn test_create_archive_with_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let out_dir = temp_dir.path().join("backups");
        let passphrase = RedactedString::from("hunter2hunter2");

        let archive = create_archive(&project, &out_dir, Some(&passphrase)).unwrap();

        assert!(archive.to_string_lossy().ends_with(".tar.gz.age"));
        let files = std::fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect_vec();
        assert_eq!(files, vec![archive.clone()]);

        let mut tarball = Vec::new();
        decrypt_archive(File::open(&archive).unwrap(), &passphrase, &mut tarball).unwrap();
        let contents = read_tar(GzDecoder::new(tarball.as_slice()));
        assert_eq!(contents.keys().collect_vec(), vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_create_archive_creates_missing_out_dir() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let out_dir = temp_dir.path().join("deep/nested/backups");

        let archive = create_archive(&project, &out_dir, None).unwrap();
        assert!(archive.starts_with(&out_dir));
    }

    #[test]
    fn test_missing_source_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join("backups");

        let res = create_archive(temp_dir.path().join("missing"), &out_dir, None);

        assert!(res.is_err());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_write_removes_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let out_dir = temp_dir.path().join("backups");
        let writer = ArchiveWriter::builder().out_dir(&out_dir).build();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = writer
            .create_archive(&SourceDir::from(project), &fixed_time(), &cancel)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_aborts_whole_source() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let locked = project.join("sub/locked.txt");
        std::fs::write(&locked, "locked").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // Running as root, permissions are not enforced.
            return;
        }
        let out_dir = temp_dir.path().join("backups");

        let res = create_archive(&project, &out_dir, None);

        assert!(res.is_err());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_encryption_keeps_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let out_dir = temp_dir.path().join("backups");
        // A directory squatting on the encryption tmp name makes encryption fail.
        std::fs::create_dir_all(out_dir.join("project_2024-03-09_07-05-03.tar.gz.age.tmp")).unwrap();
        let writer = ArchiveWriter::builder()
            .out_dir(&out_dir)
            .encryptor(EncryptorConfig::from(RedactedString::from("hunter2hunter2")))
            .build();

        let res = writer.create_archive(
            &SourceDir::from(project),
            &fixed_time(),
            &CancelToken::new(),
        );

        assert!(res.is_err());
        let plaintext = out_dir.join("project_2024-03-09_07-05-03.tar.gz");
        assert!(plaintext.is_file());
        assert_eq!(read_tar(GzDecoder::new(File::open(&plaintext).unwrap())).len(), 2);
        assert!(!out_dir.join("project_2024-03-09_07-05-03.tar.gz.age").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_header_carries_walked_metadata() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let file = project.join("a.txt");
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o640)).unwrap();
        let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        let entries = SourceDir::from(project).archive_entry_iterator().unwrap();

        let (bytes, _) = write_tar(entries, Vec::new(), &CancelToken::new()).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let headers = archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                (name, e.header().mode().unwrap(), e.header().mtime().unwrap(), e.size())
            })
            .collect_vec();
        assert_eq!(headers[0], ("a.txt".to_owned(), 0o640, 1_700_000_000, 5));
        assert_eq!(headers[1].0, "sub/b.txt");
    }

    #[test]
    fn test_write_tar_counts_entries() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_project(temp_dir.path());
        let entries = SourceDir::from(project).archive_entry_iterator().unwrap();

        let (bytes, stats) = write_tar(entries, Vec::new(), &CancelToken::new()).unwrap();

        assert_eq!(stats, TarStats { entries: 2, bytes: 10 });
        assert_eq!(read_tar(bytes.as_slice()).len(), 2);
    }
}

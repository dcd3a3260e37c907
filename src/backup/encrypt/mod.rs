pub mod age;

use crate::backup::encrypt::age::AgeEncryptorConfig;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg};
use ::age::stream::StreamWriter;
use derive_more::From;
use function_name::named;
use io_enum::Write;
use std::fs::File;
use std::io::{BufReader, BufWriter, IntoInnerError, Write};
use std::path::{Path, PathBuf};
use std::result;

#[derive(Write, From)]
pub enum Encryptor<W: Write> {
    None(W),
    AgeEncryptor(StreamWriter<W>),
}

#[derive(Clone, Default, From, Debug)]
pub enum EncryptorConfig {
    #[default]
    None,
    Age(AgeEncryptorConfig),
}

impl From<RedactedString> for EncryptorConfig {
    fn from(passphrase: RedactedString) -> Self {
        EncryptorConfig::Age(AgeEncryptorConfig::Passphrase { passphrase })
    }
}

pub trait EncryptorBuilder<W: Write> {
    fn build_encryptor(&self, writer: W) -> Result<Encryptor<W>>;
}

impl<W: Write> Finish<W> for Encryptor<W> {
    fn finish(self) -> result::Result<W, std::io::Error> {
        match self {
            Encryptor::None(w) => Ok(w),
            Encryptor::AgeEncryptor(w) => w.finish(),
        }
    }
}

impl<W: Write> EncryptorBuilder<W> for EncryptorConfig {
    fn build_encryptor(&self, writer: W) -> Result<Encryptor<W>> {
        match self {
            EncryptorConfig::None => Ok(writer.into()),
            EncryptorConfig::Age(age) => age.build_encryptor(writer),
        }
        .add_debug_object_and_fn_name(self.clone(), "build_encryptor")
    }
}

pub static AGE_FILE_EXT: &str = "age";

impl FileExtProvider for EncryptorConfig {
    fn file_ext(&self) -> Option<&'static str> {
        match self {
            EncryptorConfig::None => None,
            EncryptorConfig::Age(_) => Some(AGE_FILE_EXT),
        }
    }
}

/// Every encryption extension this tool may produce, `None` for plaintext.
pub fn known_file_exts() -> [Option<&'static str>; 2] {
    [None, Some(AGE_FILE_EXT)]
}

impl EncryptorConfig {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, EncryptorConfig::None)
    }

    /// Encrypts a finished archive next to itself and deletes the plaintext.
    ///
    /// Ciphertext goes to `<archive>.<ext>.tmp` first and is renamed into place
    /// once the stream is finished. The plaintext is removed only after that
    /// rename, so on any failure the plaintext stays and no encrypted file
    /// exists. If only the final plaintext delete fails, both files remain, a
    /// warning is logged and the encrypted path is still returned. With
    /// [`EncryptorConfig::None`] the plaintext path is returned as is.
    #[named]
    pub fn encrypt_file<P: AsRef<Path>>(&self, plaintext: P) -> Result<PathBuf> {
        let plaintext = plaintext.as_ref();
        let Some(ext) = self.file_ext() else {
            return Ok(plaintext.to_path_buf());
        };

        let mut encrypted = plaintext.as_os_str().to_owned();
        encrypted.push(format!(".{ext}"));
        let encrypted = PathBuf::from(encrypted);
        let mut tmp = encrypted.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tracing::debug!("Encrypting {:?} into {:?}", plaintext, encrypted);
        let write_res = self
            .write_encrypted(plaintext, &tmp)
            .and_then(|_| std::fs::rename(&tmp, &encrypted).map_err(Error::from));

        if let Err(mut e) = write_res {
            if tmp.exists() {
                if let Err(e2) = std::fs::remove_file(&tmp) {
                    e = e.chain(Error::from(e2).add_msg(format!("Delete tmp file {tmp:?} failed")));
                }
            }
            return Err(e)
                .add_msg(format!("Encrypting {plaintext:?} failed, plaintext kept"))
                .add_fn_name(function_path!());
        }

        discard_plaintext(plaintext);
        Ok(encrypted)
    }

    fn write_encrypted(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(src)?);
        let mut writer = File::create(dst)
            .map(BufWriter::new)
            .map_err(Error::from)
            .and_then(|f| self.build_encryptor(f))
            .map(BufWriter::new)?;

        std::io::copy(&mut reader, &mut writer)?;

        writer
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .finish()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()?;

        Ok(())
    }
}

/// Returns whether `plaintext` is gone. A leftover copy is only worth a warning.
fn discard_plaintext(plaintext: &Path) -> bool {
    match std::fs::remove_file(plaintext) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Encrypted archive written but plaintext {plaintext:?} was not deleted: {e}");
            false
        }
    }
}

/// Encrypts `archive` with `passphrase`, returning the encrypted path.
pub fn encrypt_archive<P: AsRef<Path>>(archive: P, passphrase: &RedactedString) -> Result<PathBuf> {
    EncryptorConfig::from(passphrase.clone()).encrypt_file(archive)
}

/// Streams the plaintext of the encrypted archive at `path` into `writer`.
#[named]
pub fn decrypt_file<P: AsRef<Path>, W: Write>(
    path: P,
    passphrase: &RedactedString,
    writer: &mut W,
) -> Result<u64> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(Error::from)
        .and_then(|reader| self::age::decrypt_archive(reader, passphrase, writer))
        .add_msg(format!("Decrypting {path:?} failed"))
        .add_fn_name(function_path!())
}

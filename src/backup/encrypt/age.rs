use crate::backup::encrypt::{Encryptor, EncryptorBuilder};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::result::Result;
use age::secrecy::SecretString;
use derive_more::From;
use std::io::{Read, Write};

/// Age encryption settings.
///
/// Only passphrase (scrypt) recipients are supported, which keeps the output
/// readable with `age -d` and the same passphrase.
#[derive(From, Clone, Debug)]
pub enum AgeEncryptorConfig {
    Passphrase { passphrase: RedactedString },
}

impl<W: Write> EncryptorBuilder<W> for AgeEncryptorConfig {
    fn build_encryptor(&self, writer: W) -> Result<Encryptor<W>> {
        match self {
            AgeEncryptorConfig::Passphrase { passphrase } => {
                tracing::debug!("Initializing Age encryption with passphrase");
                Ok(age::Encryptor::with_user_passphrase(secret(passphrase))
                    .wrap_output(writer)?
                    .into())
            }
        }
    }
}

fn secret(passphrase: &RedactedString) -> SecretString {
    SecretString::from(passphrase.inner().clone())
}

/// Streams the plaintext of an age passphrase-encrypted archive into `writer`.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_archive<R: Read, W: Write>(
    reader: R,
    passphrase: &RedactedString,
    writer: &mut W,
) -> Result<u64> {
    let identity = age::scrypt::Identity::new(secret(passphrase));
    let mut plaintext =
        age::Decryptor::new(reader)?.decrypt(std::iter::once(&identity as &dyn age::Identity))?;
    Ok(std::io::copy(&mut plaintext, writer)?)
}

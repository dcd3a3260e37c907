use crate::backup::archive::walkdir_source::SourceDir;
use crate::backup::compress::CompressorConfig;
use crate::backup::encrypt::EncryptorConfig;
use crate::backup::function_path;
use crate::backup::notifications::discord::DiscordWebhookConfig;
use crate::backup::notifications::NotificationConfig;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::{RetentionPolicy, DEFAULT_RETENTION_DAYS};
use crate::backup::tar::ArchiveWriter;
use crate::backup::validate::{validate_dir_exist_or_created, validate_webhook_url};
use function_name::named;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

pub static DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub static DEFAULT_OUTPUT_DIR_NAME: &str = "backups";
pub static DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 10;
/// One step of `interval`.
pub static INTERVAL_UNIT: Duration = Duration::from_secs(3600);

/// Everything one run needs, read from a YAML file.
///
/// ```yaml
/// source_dirs:
///   - /home/me/projects/site
/// output_dir: /mnt/backups
/// retention_days: 14
/// interval: 24
/// encryption_key: hunter2
/// discord: https://discord.com/api/webhooks/...
/// compressor:
///   compressor_type: xz
///   level: 6
/// ```
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    #[validate(length(min = 1, message = "at least one source directory is required"))]
    pub source_dirs: Vec<SourceDir>,
    #[serde(default = "default_output_dir")]
    #[validate(custom(function = validate_dir_exist_or_created))]
    pub output_dir: PathBuf,
    /// Values `<= 0` fall back to 7 days.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Hours between runs, `0` runs once.
    #[serde(default)]
    #[validate(range(min = 0, message = "interval must be 0 or greater"))]
    pub interval: i64,
    /// Empty means no encryption.
    #[serde(default)]
    pub encryption_key: Option<RedactedString>,
    /// Webhook URL, empty means no notification.
    #[serde(default)]
    #[validate(custom(function = validate_webhook_url))]
    pub discord: Option<String>,
    #[serde(default)]
    #[validate(custom(function = validate_compressor))]
    pub compressor: CompressorConfig,
    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,
}

/// `$HOME/backups`, or `./backups` when there is no home directory.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_OUTPUT_DIR_NAME)
}

fn validate_compressor(compressor: &CompressorConfig) -> std::result::Result<(), ValidationError> {
    compressor.validate().map_err(|e| {
        ValidationError::new("InvalidCompressor").with_message(e.to_string().into())
    })
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_notification_timeout_secs() -> u64 {
    DEFAULT_NOTIFICATION_TIMEOUT_SECS
}

impl BackupConfig {
    /// Reads, parses and validates the config at `path`.
    ///
    /// Validation creates `output_dir` when it is missing.
    #[named]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .add_msg(format!("Open config failed: {path:?}"))
            .and_then(|f| Self::from_reader(f).add_msg(format!("Parse YAML config failed: {path:?}")))
            .add_fn_name(function_path!())?;

        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {path:?}"))
            .add_fn_name(function_path!())?;

        tracing::debug!("Loaded config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_yml::from_reader(reader)?)
    }

    /// The configured passphrase, ignoring an empty one.
    pub fn passphrase(&self) -> Option<&RedactedString> {
        self.encryption_key.as_ref().filter(|k| !k.is_empty())
    }

    /// Picks the passphrase from the command line or the config file.
    ///
    /// Giving a non-empty passphrase in both places is an error.
    pub fn resolve_encryptor(&self, cli_passphrase: Option<RedactedString>) -> Result<EncryptorConfig> {
        let cli_passphrase = cli_passphrase.filter(|p| !p.is_empty());
        match (cli_passphrase, self.passphrase()) {
            (Some(_), Some(_)) => Err(Error::ConflictingPassphrase),
            (Some(p), None) => Ok(p.into()),
            (None, Some(p)) => Ok(p.clone().into()),
            (None, None) => Ok(EncryptorConfig::None),
        }
    }

    pub fn notification(&self) -> Option<NotificationConfig> {
        self.discord
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| {
                DiscordWebhookConfig::builder()
                    .url(url)
                    .timeout(Duration::from_secs(self.notification_timeout_secs))
                    .build()
                    .into()
            })
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from_days(self.retention_days)
    }

    /// Time between two runs when one `interval` step lasts `unit`, `None`
    /// when the tool should run once.
    pub fn interval_in(&self, unit: Duration) -> Option<Duration> {
        u64::try_from(self.interval)
            .ok()
            .filter(|steps| *steps > 0)
            .map(|steps| {
                u32::try_from(steps)
                    .ok()
                    .and_then(|steps| unit.checked_mul(steps))
                    .unwrap_or(Duration::MAX)
            })
    }

    pub fn archive_writer(&self, encryptor: EncryptorConfig) -> ArchiveWriter {
        ArchiveWriter::builder()
            .out_dir(self.output_dir.clone())
            .compressor(self.compressor.clone())
            .encryptor(encryptor)
            .build()
    }
}

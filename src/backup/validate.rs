//! Custom `validator` checks for configuration values.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access output_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

/// Empty means "notifications disabled" and is accepted.
pub fn validate_webhook_url<S: AsRef<str>>(url: S) -> Result<(), ValidationError> {
    let url = url.as_ref();
    if url.is_empty() || url.starts_with("https://") || url.starts_with("http://") {
        return Ok(());
    }

    Err(ValidationError::new("InvalidWebhookUrl")
        .with_message(format!("webhook url must start with http:// or https://, got {url:?}").into()))
}

use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    AgeDecrypt(#[from] age::DecryptError),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Ctrlc(#[from] ctrlc::Error),
    #[error("Passphrase given both on the command line and as encryption_key in the config, use only one")]
    ConflictingPassphrase,
    #[error("Source {0:?} is not a readable directory")]
    InvalidSourceDir(PathBuf),
    #[error("Webhook responded with status {status}: {body}")]
    WebhookStatus { status: u16, body: String },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFunctionName { fn_name: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> AddDebugObjectAndFnName<S, O> for Error {
    fn add_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Self::WithFunctionName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn webhook_status<S: Into<String>>(status: u16, body: S) -> Self {
        Self::WebhookStatus {
            status,
            body: body.into(),
        }
    }

    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// True when this error, or any error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::WithMsg { error, .. }
            | Error::WithFunctionName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.is_cancelled(),
            Error::LotsOfError(v) => v.iter().any(Error::is_cancelled),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_add_msg() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error).add_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_add_fn_name_display() {
        let error = Error::from(std::io::Error::other("disk full")).add_fn_name("write_archive");
        let error_str = error.to_string();

        assert!(error_str.starts_with("write_archive failed:"));
        assert!(error_str.contains("  disk full"));
    }

    #[test]
    fn test_error_add_debug_object_and_fn_name() {
        let error = Error::from(std::io::Error::other("file not found"))
            .add_debug_object_and_fn_name(42, "test_function");
        let error_str = error.to_string();

        assert!(error_str.contains("42 test_function failed"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_chain_flattens() {
        let inner = Error::from(std::io::Error::other("error1"))
            .chain(Error::from(std::io::Error::other("error2")));
        let outer = inner.chain(Error::Cancelled);

        assert!(outer.is_cancelled());
        match outer {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    fn test_error_chain() {
        let error1 = Error::from(std::io::Error::other("error1"));
        let error2 = Error::from(std::io::Error::other("error2"));

        let chained = error1.chain(error2);
        assert_eq!(chained.into_iter().count(), 2);
    }

    #[test]
    fn test_is_cancelled_sees_through_wrappers() {
        let error = Error::Cancelled
            .add_msg("Archiving /data")
            .add_fn_name("create_archive");
        assert!(error.is_cancelled());

        let error = Error::from(std::io::Error::other("nope")).add_msg("Archiving /data");
        assert!(!error.is_cancelled());
    }

    #[test]
    fn test_webhook_status_display() {
        let error = Error::webhook_status(404, "Unknown Webhook");
        assert_eq!(
            error.to_string(),
            "Webhook responded with status 404: Unknown Webhook"
        );
    }
}

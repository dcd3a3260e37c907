//! # backubrr
//!
//! Periodic directory backups: every configured source directory becomes a
//! timestamped `.tar.gz`, optionally encrypted with a passphrase, and old
//! archives are swept once they fall out of retention.
//!
//! ## Features
//!
//! - **Archiving**: recursive walk that skips hidden files and directories
//! - **Compression**: gzip by default, XZ (LZMA) or a bare tar on request
//! - **Encryption**: age with a scrypt passphrase, plaintext removed afterwards
//! - **Retention**: age-based deletion plus pruning of empty directories
//! - **Notifications**: a Discord webhook summary after every run
//! - **Scheduling**: run once, or every N hours with graceful Ctrl-C
//!
//! ## Quick Start
//!
//! ```no_run
//! use backubrr::backup::cancel::CancelToken;
//! use backubrr::backup::run_loop::{RunLoop, RunSettings};
//!
//! let settings = RunSettings::builder().config_path("config.yaml").build();
//! let report = RunLoop::new(settings).run(&CancelToken::new())?;
//! println!("{report:?}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;

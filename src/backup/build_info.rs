use getset::Getters;
use std::fmt::{Display, Formatter};

pub static VERSION_ENV: &str = "BACKUBRR_VERSION";
pub static COMMIT_ENV: &str = "BACKUBRR_COMMIT";
pub static DATE_ENV: &str = "BACKUBRR_DATE";
static UNKNOWN: &str = "unknown";
static SHORT_COMMIT_LEN: usize = 7;

/// Version metadata printed by `backubrr version`.
///
/// Built once at startup. Release builds inject the values through the
/// `BACKUBRR_*` environment variables, development builds fall back to the
/// crate version and `unknown`.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BuildInfo {
    version: String,
    commit: String,
    date: String,
}

impl BuildInfo {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            version: get(VERSION_ENV).unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
            commit: get(COMMIT_ENV).unwrap_or_else(|| UNKNOWN.to_owned()),
            date: get(DATE_ENV).unwrap_or_else(|| UNKNOWN.to_owned()),
        }
    }

    pub fn short_commit(&self) -> &str {
        match self.commit.char_indices().nth(SHORT_COMMIT_LEN) {
            Some((idx, _)) => &self.commit[..idx],
            None => &self.commit,
        }
    }
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "backubrr {} (commit {}, built {})",
            self.version,
            self.short_commit(),
            self.date
        )
    }
}

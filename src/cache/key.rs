//! Cache key layout.
//!
//! `{name}:cacher:{arg1}:{arg2}:...` for the entry and the same plus
//! `:locker` for its lease. Two calls with the same name and arguments share
//! both the cache slot and the lock.

use std::fmt;

const CACHER_SEGMENT: &str = "cacher";
const LOCKER_SUFFIX: &str = ":locker";

/// Resolved keys for one cached lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entry: String,
    lock: String,
    args: Vec<String>,
}

impl CacheKey {
    /// Builds the keys for `args` under cache `name`. Arguments are joined
    /// verbatim and in order.
    pub fn new<S: AsRef<str>>(name: &str, args: &[S]) -> Self {
        let args: Vec<String> = args.iter().map(|arg| arg.as_ref().to_string()).collect();

        let mut entry = format!("{}:{}", name, CACHER_SEGMENT);
        for arg in &args {
            entry.push(':');
            entry.push_str(arg);
        }
        let lock = format!("{}{}", entry, LOCKER_SUFFIX);

        Self { entry, lock, args }
    }

    /// Key of the cached entry.
    pub fn entry_key(&self) -> &str {
        &self.entry
    }

    /// Key of the lease guarding the entry.
    pub fn lock_key(&self) -> &str {
        &self.lock
    }

    /// Lookup arguments, passed unchanged to the source.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entry)
    }
}

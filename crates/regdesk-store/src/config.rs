//! Store configuration.
//!
//! Reads from `REGDESK_*` environment variables, falling back to
//! development defaults. Explicit constructors exist for tests and for
//! callers that resolve configuration elsewhere.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which key/value backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Single-file embedded SQLite store.
    Sqlite,
    /// Networked Redis store.
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        };
        f.write_str(s)
    }
}

impl FromStr for BackendKind {
    type Err = BackendKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(BackendKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`BackendKind`] string.
#[derive(Debug, Clone)]
pub struct BackendKindParseError(pub String);

impl fmt::Display for BackendKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid storage backend: {:?}", self.0)
    }
}

impl std::error::Error for BackendKindParseError {}

// ---------------------------------------------------------------------------

/// Configuration for the persistence subsystem.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Which backend to connect to.
    pub backend: BackendKind,
    /// Database file path for the embedded backend.
    pub sqlite_path: PathBuf,
    /// Connection URL for the networked backend.
    pub redis_url: String,
    /// Session time-to-live in seconds. `<= 0` means sessions never
    /// expire.
    pub session_ttl_seconds: i64,
    /// Plan-record time-to-live in seconds. `<= 0` means plans never
    /// expire.
    pub plan_ttl_seconds: i64,
    /// Bound on how long `connect()` may wait for the backend.
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Default embedded database file.
    pub const DEFAULT_SQLITE_PATH: &str = "./regdesk.db";
    /// Default networked backend URL.
    pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
    /// Default session TTL: 24 hours.
    pub const DEFAULT_SESSION_TTL: i64 = 86_400;
    /// Default plan TTL: 7 days.
    pub const DEFAULT_PLAN_TTL: i64 = 604_800;

    /// Build a config from the environment.
    ///
    /// Recognized variables: `REGDESK_STORAGE_BACKEND` (`sqlite` or
    /// `redis`), `REGDESK_DATABASE_PATH`, `REGDESK_REDIS_URL`,
    /// `REGDESK_SESSION_TTL`, `REGDESK_PLAN_TTL`. Unset or unparsable
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        let backend = env::var("REGDESK_STORAGE_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(BackendKind::Sqlite);
        let sqlite_path = env::var("REGDESK_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_SQLITE_PATH));
        let redis_url =
            env::var("REGDESK_REDIS_URL").unwrap_or_else(|_| Self::DEFAULT_REDIS_URL.to_owned());
        let session_ttl_seconds = env::var("REGDESK_SESSION_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_SESSION_TTL);
        let plan_ttl_seconds = env::var("REGDESK_PLAN_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_PLAN_TTL);

        Self {
            backend,
            sqlite_path,
            redis_url,
            session_ttl_seconds,
            plan_ttl_seconds,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Build a config for the embedded backend at an explicit path
    /// (useful for tests and CLI flags).
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite_path: path.into(),
            ..Self::defaults()
        }
    }

    /// Build a config for the networked backend at an explicit URL.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: url.into(),
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite_path: PathBuf::from(Self::DEFAULT_SQLITE_PATH),
            redis_url: Self::DEFAULT_REDIS_URL.to_owned(),
            session_ttl_seconds: Self::DEFAULT_SESSION_TTL,
            plan_ttl_seconds: Self::DEFAULT_PLAN_TTL,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_display_roundtrip() {
        let variants = [BackendKind::Sqlite, BackendKind::Redis];
        for v in &variants {
            let s = v.to_string();
            let parsed: BackendKind = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn backend_kind_invalid() {
        let result = "memcached".parse::<BackendKind>();
        assert!(result.is_err());
    }

    #[test]
    fn sqlite_constructor_sets_path() {
        let cfg = StoreConfig::sqlite("/tmp/test.db");
        assert_eq!(cfg.backend, BackendKind::Sqlite);
        assert_eq!(cfg.sqlite_path, PathBuf::from("/tmp/test.db"));
        assert_eq!(cfg.session_ttl_seconds, StoreConfig::DEFAULT_SESSION_TTL);
        assert_eq!(cfg.plan_ttl_seconds, StoreConfig::DEFAULT_PLAN_TTL);
    }

    #[test]
    fn redis_constructor_sets_url() {
        let cfg = StoreConfig::redis("redis://remote:6380");
        assert_eq!(cfg.backend, BackendKind::Redis);
        assert_eq!(cfg.redis_url, "redis://remote:6380");
    }
}

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CHRONICLE_PROFILE`. When set (e.g. `WORK`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CHRONICLE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            fetch: FetchConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:  database={}", self.storage.database_path.display());
        tracing::info!(
            "  fetch:    lookback_days={}, retention_days={}",
            self.fetch.default_lookback_days,
            self.fetch
                .retention_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(keep forever)".to_string())
        );
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let database_path = profiled_env_opt(p, "CHRONICLE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);
        Self { database_path }
    }
}

/// `~/.local/share/chronicle/chronicle.db` (platform data dir), or
/// `chronicle.db` in the working directory when no data dir is known.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("chronicle").join("chronicle.db"))
        .unwrap_or_else(|| PathBuf::from("chronicle.db"))
}

// ── Fetch window / retention ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// How far back `fetch` reaches when no `--start` is given.
    pub default_lookback_days: u32,
    /// Events older than this are removed by `prune`; `None` keeps everything.
    pub retention_days: Option<u32>,
}

impl FetchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_lookback_days: profiled_env_u32(p, "CHRONICLE_LOOKBACK_DAYS", 30),
            retention_days: profiled_env_opt(p, "CHRONICLE_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .filter(|d: &u32| *d > 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; every test uses its own profile prefix
    // so they never observe each other's values.

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("CFGTEST_A_CHRONICLE_LOOKBACK_DAYS", "7");
        let config = Config::for_profile("cfgtest_a");
        assert_eq!(config.profile, "CFGTEST_A");
        assert_eq!(config.fetch.default_lookback_days, 7);
        env::remove_var("CFGTEST_A_CHRONICLE_LOOKBACK_DAYS");
    }

    #[test]
    fn profiled_db_path_is_used() {
        env::set_var("CFGTEST_B_CHRONICLE_DB_PATH", "/tmp/chronicle-test.db");
        let config = Config::for_profile("CFGTEST_B");
        assert_eq!(
            config.storage.database_path,
            PathBuf::from("/tmp/chronicle-test.db")
        );
        env::remove_var("CFGTEST_B_CHRONICLE_DB_PATH");
    }

    #[test]
    fn zero_retention_means_keep_forever() {
        env::set_var("CFGTEST_C_CHRONICLE_RETENTION_DAYS", "0");
        let config = Config::for_profile("CFGTEST_C");
        assert_eq!(config.fetch.retention_days, None);
        env::remove_var("CFGTEST_C_CHRONICLE_RETENTION_DAYS");
    }

    #[test]
    fn default_profile_label() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
    }
}

//! Loader configuration with defaults and `HUGEMAP_*` environment overrides.
//!
//! With no variables set the library behaves exactly like a plain
//! hugetlbfs-aware `mmap` replacement: huge pages requested first, 64 MiB
//! read chunks, progress every GiB.

use std::env;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },

    #[error("validation error: {0}")]
    Validation(String),
}

// ── Keys and defaults ───────────────────────────────────────────────

pub const ENV_ENABLED: &str = "HUGEMAP_ENABLED";
pub const ENV_HUGETLB: &str = "HUGEMAP_HUGETLB";
pub const ENV_CHUNK_MB: &str = "HUGEMAP_CHUNK_MB";
pub const ENV_PROGRESS_MB: &str = "HUGEMAP_PROGRESS_MB";
pub const ENV_LOG: &str = "HUGEMAP_LOG";

const MIB: usize = 1024 * 1024;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * MIB;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1024 * MIB as u64;

// ── LoaderConfig ────────────────────────────────────────────────────

/// Tunables for the redirect path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// When false every call is delegated to the real primitive.
    pub enabled: bool,
    /// Request `MAP_HUGETLB` before falling back to ordinary anonymous memory.
    pub use_huge_pages: bool,
    /// Upper bound on a single `read` during the streamed load.
    pub chunk_size: usize,
    /// Bytes between progress log lines.
    pub progress_interval: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_huge_pages: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl LoaderConfig {
    /// Build a config from `HUGEMAP_*` environment variables merged on top
    /// of [`LoaderConfig::default`], then validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var(ENV_ENABLED) {
            cfg.enabled = parse_env_bool(ENV_ENABLED, &v)?;
        }
        if let Ok(v) = env::var(ENV_HUGETLB) {
            cfg.use_huge_pages = parse_env_bool(ENV_HUGETLB, &v)?;
        }
        if let Ok(v) = env::var(ENV_CHUNK_MB) {
            let mb = parse_env_usize(ENV_CHUNK_MB, &v)?;
            cfg.chunk_size = mb.checked_mul(MIB).ok_or_else(|| invalid(ENV_CHUNK_MB, &v))?;
        }
        if let Ok(v) = env::var(ENV_PROGRESS_MB) {
            let mb = parse_env_usize(ENV_PROGRESS_MB, &v)? as u64;
            cfg.progress_interval =
                mb.checked_mul(MIB as u64).ok_or_else(|| invalid(ENV_PROGRESS_MB, &v))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the loader cannot make progress with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size must be > 0".into()));
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::Validation("progress_interval must be > 0".into()));
        }
        Ok(())
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvVar { key: key.to_string(), value: value.to_string() }
}

fn parse_env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_env_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid(key, value))
}

//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - sql2ddlog.toml (default configuration)
//! - sql2ddlog.local.toml (git-ignored local overrides)
//! - Environment variables (SQL2DDLOG_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # sql2ddlog.toml
//! [naming]
//! max_suffix = 10000
//!
//! [emit]
//! include_prelude = true
//! imports = ["sql", "sqlop"]
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SQL2DDLOG_SEMANTICS__NULL_AWARE_OPERATORS=false
//! SQL2DDLOG_BATCH__PARALLEL=true
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub semantics: SemanticsConfig,
    #[serde(default)]
    pub emit: EmitConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generated-name settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Largest numeric suffix tried before giving up on a name
    #[serde(default = "default_max_suffix")]
    pub max_suffix: u32,

    /// Base name of row variables (`v`, `v0`, `v1`, ...)
    #[serde(default = "default_row_variable_prefix")]
    pub row_variable_prefix: String,

    /// Hint used for unnamed temporaries (`Rtmp`, `Ttmp`, `TRtmp`)
    #[serde(default = "default_temp_hint")]
    pub temp_hint: String,
}

/// Translation semantics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticsConfig {
    /// Compile operators over nullable operands to the `a_<op>_<L><R>` helpers.
    /// When false such operators are rejected with `NullabilityMismatch`.
    #[serde(default = "default_true")]
    pub null_aware_operators: bool,
}

/// Program emission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitConfig {
    /// Emit imports and catalog declarations ahead of the views
    #[serde(default = "default_true")]
    pub include_prelude: bool,

    /// Modules imported by the prelude
    #[serde(default = "default_imports")]
    pub imports: Vec<String>,
}

/// Batch compilation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BatchConfig {
    /// Compile views of a batch in parallel
    #[serde(default)]
    pub parallel: bool,

    /// Worker threads for parallel batches
    /// 0 = use the global rayon pool
    #[serde(default)]
    pub num_threads: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_suffix() -> u32 {
    10_000
}
fn default_row_variable_prefix() -> String {
    "v".to_string()
}
fn default_temp_hint() -> String {
    "tmp".to_string()
}
fn default_true() -> bool {
    true
}
fn default_imports() -> Vec<String> {
    vec!["sql".to_string(), "sqlop".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            max_suffix: default_max_suffix(),
            row_variable_prefix: default_row_variable_prefix(),
            temp_hint: default_temp_hint(),
        }
    }
}

impl Default for SemanticsConfig {
    fn default() -> Self {
        SemanticsConfig {
            null_aware_operators: true,
        }
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig {
            include_prelude: true,
            imports: default_imports(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. sql2ddlog.toml (base configuration)
    /// 2. sql2ddlog.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SQL2DDLOG_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("sql2ddlog.toml"))
            .merge(Toml::file("sql2ddlog.local.toml"))
            .merge(Env::prefixed("SQL2DDLOG_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SQL2DDLOG_").split("__"))
            .extract()
    }

    /// Effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

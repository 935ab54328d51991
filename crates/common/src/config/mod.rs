//! Configuration management for PaperVault services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// File storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bulk import settings and naming conventions
    #[serde(default)]
    pub import: ImportConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (not applied to streaming imports)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds open connections get to drain after a shutdown signal
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Name of the session cookie carrying the token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub cookie_secure: bool,

    /// Key required to register any account after the first one.
    /// Registration of additional admins is disabled when unset.
    pub admin_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding stored question papers
    #[serde(default = "default_papers_dir")]
    pub papers_dir: PathBuf,

    /// URL prefix recorded in `file_url` for stored papers
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Parent directory for per-import scratch directories
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Leading lines of the metadata file that are not data
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Extension of the document files inside an archive
    #[serde(default = "default_document_extension")]
    pub document_extension: String,

    /// Largest single document accepted
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,

    /// Largest uploaded archive accepted
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Subject-type code assumed when a subject code carries none
    #[serde(default = "default_subject_type_code")]
    pub default_subject_type_code: String,

    /// Subject type used for codes missing from `subject_types`
    #[serde(default = "default_fallback_subject_type")]
    pub fallback_subject_type: String,

    /// Subject-code prefix -> department name
    #[serde(default = "default_departments")]
    pub departments: BTreeMap<String, String>,

    /// Subject-type code -> subject type name
    #[serde(default = "default_subject_types")]
    pub subject_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Login attempts allowed per minute (per email)
    #[serde(default = "default_login_per_minute")]
    pub login_per_minute: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub login_burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 24 * 60 * 60 }
fn default_cookie_name() -> String { "auth_token".to_string() }
fn default_papers_dir() -> PathBuf { PathBuf::from("public/uploads/papers") }
fn default_public_prefix() -> String { "/uploads/papers".to_string() }
fn default_scratch_dir() -> PathBuf { PathBuf::from("temp") }
fn default_header_lines() -> usize { 3 }
fn default_document_extension() -> String { "pdf".to_string() }
fn default_max_document_bytes() -> u64 { 50 * MIB }
fn default_max_archive_bytes() -> u64 { 500 * MIB }
fn default_subject_type_code() -> String { "CJ".to_string() }
fn default_fallback_subject_type() -> String { "Major".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_login_per_minute() -> u32 { 10 }
fn default_burst() -> u32 { 5 }
fn default_enabled() -> bool { true }

fn default_departments() -> BTreeMap<String, String> {
    [
        ("BBA", "Business Administration"),
        ("BCA", "Computer Science"),
        ("COM", "Commerce"),
        ("ELE", "Electronics"),
        ("ENG", "English"),
        ("MAL", "Malayalam"),
        ("ARA", "Arabic"),
        ("HIN", "Hindi"),
        ("JOU", "Journalism"),
        ("MAT", "Mathematics"),
        ("CSC", "Computer Science"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_subject_types() -> BTreeMap<String, String> {
    [
        ("CJ", "Major"),
        ("MN", "Minor"),
        ("FM", "Common Course"),
        ("FV", "Common Course"),
        ("FS", "Common Course"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
            admin_access_key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            papers_dir: default_papers_dir(),
            public_prefix: default_public_prefix(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            document_extension: default_document_extension(),
            max_document_bytes: default_max_document_bytes(),
            max_archive_bytes: default_max_archive_bytes(),
            default_subject_type_code: default_subject_type_code(),
            fallback_subject_type: default_fallback_subject_type(),
            departments: default_departments(),
            subject_types: default_subject_types(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_per_minute: default_login_per_minute(),
            login_burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/papervault".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            import: ImportConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.cookie_name, "auth_token");
        assert_eq!(config.auth.jwt_expiration_secs, 86_400);
    }

    #[test]
    fn test_shutdown_timeout() {
        let mut config = AppConfig::default();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));

        config.server.shutdown_timeout_secs = 5;
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_import_defaults() {
        let import = ImportConfig::default();
        assert_eq!(import.header_lines, 3);
        assert_eq!(import.max_document_bytes, 50 * 1024 * 1024);
        assert_eq!(import.max_archive_bytes, 500 * 1024 * 1024);
        assert_eq!(import.departments.get("BBA").map(String::as_str), Some("Business Administration"));
        assert_eq!(import.subject_types.get("FV").map(String::as_str), Some("Common Course"));
    }
}

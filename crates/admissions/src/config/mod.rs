use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::applications::{StaffDirectory, UploadPolicy, DEFAULT_MAX_UPLOAD_BYTES};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_path = env::var("APP_DATABASE_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let upload_dir = env::var("APP_UPLOAD_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "uploads".to_string());
        let max_upload_bytes = match env::var("APP_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidUploadLimit)?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let staff_tokens = match env::var("APP_STAFF_TOKENS") {
            Ok(raw) => parse_staff_tokens(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig {
                database_path,
                upload_dir: PathBuf::from(upload_dir),
                max_upload_bytes,
            },
            auth: AuthConfig { staff_tokens },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where applications and their documents are kept.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database file; `None` keeps applications in memory for the process lifetime.
    pub database_path: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl StorageConfig {
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_file_bytes: self.max_upload_bytes,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct StaffToken {
    pub staff_id: String,
    pub token: String,
}

impl fmt::Debug for StaffToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaffToken")
            .field("staff_id", &self.staff_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub staff_tokens: Vec<StaffToken>,
}

impl AuthConfig {
    pub fn staff_directory(&self) -> StaffDirectory {
        self.staff_tokens
            .iter()
            .map(|entry| (entry.staff_id.clone(), entry.token.clone()))
            .collect()
    }
}

/// Parse `staff-id:token` pairs separated by commas.
fn parse_staff_tokens(raw: &str) -> Result<Vec<StaffToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| {
            let (staff_id, token) = entry
                .split_once(':')
                .map(|(staff_id, token)| (staff_id.trim(), token.trim()))
                .filter(|(staff_id, token)| !staff_id.is_empty() && !token.is_empty())
                .ok_or(ConfigError::InvalidStaffToken { index })?;
            Ok(StaffToken {
                staff_id: staff_id.to_string(),
                token: token.to_string(),
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    InvalidStaffToken { index: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "APP_MAX_UPLOAD_BYTES must be a positive byte count")
            }
            ConfigError::InvalidStaffToken { index } => write!(
                f,
                "APP_STAFF_TOKENS entry {} must look like staff-id:token",
                index + 1
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUploadLimit
            | ConfigError::InvalidStaffToken { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_DATABASE_PATH");
        env::remove_var("APP_UPLOAD_DIR");
        env::remove_var("APP_MAX_UPLOAD_BYTES");
        env::remove_var("APP_STAFF_TOKENS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.storage.database_path, None);
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.auth.staff_tokens.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_storage_and_staff_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DATABASE_PATH", "/var/lib/admissions/applications.db");
        env::set_var("APP_UPLOAD_DIR", "/var/lib/admissions/uploads");
        env::set_var("APP_MAX_UPLOAD_BYTES", "1048576");
        env::set_var("APP_STAFF_TOKENS", "registrar:abc123, principal:xyz789");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.storage.database_path,
            Some(PathBuf::from("/var/lib/admissions/applications.db"))
        );
        assert_eq!(config.storage.upload_policy().max_file_bytes, 1_048_576);

        let directory = config.auth.staff_directory();
        assert_eq!(directory.len(), 2);
        assert_eq!(
            directory
                .authenticate("xyz789")
                .map(|staff| staff.staff_id().to_string()),
            Some("principal".to_string())
        );
        reset_env();
    }

    #[test]
    fn rejects_malformed_staff_tokens_and_limits() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STAFF_TOKENS", "registrar:abc123,missing-separator");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidStaffToken { index: 1 })
        ));

        reset_env();
        env::set_var("APP_MAX_UPLOAD_BYTES", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidUploadLimit)
        ));
        reset_env();
    }

    #[test]
    fn staff_token_debug_hides_secret() {
        let token = StaffToken {
            staff_id: "registrar".to_string(),
            token: "abc123".to_string(),
        };
        let rendered = format!("{token:?}");
        assert!(rendered.contains("registrar"));
        assert!(!rendered.contains("abc123"));
    }
}

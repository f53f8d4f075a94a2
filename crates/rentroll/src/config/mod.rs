use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub lifecycle: LifecycleConfig,
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

        let lifecycle = LifecycleConfig {
            invitation_ttl: days_var("APP_INVITATION_TTL_DAYS", 7)?,
            retention: days_var("APP_RETENTION_DAYS", 7)?,
            sweep_interval: hours_var("APP_SWEEP_INTERVAL_HOURS", 24)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            lifecycle,
        })
    }
}

/// Upper bound for day-based lifecycle windows (ten years).
const MAX_WINDOW_DAYS: u64 = 3_650;
/// Upper bound for the sweep interval (one year).
const MAX_SWEEP_INTERVAL_HOURS: u64 = 8_760;

fn bounded_var(variable: &'static str, default: u64, max: u64) -> Result<u64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if (1..=max).contains(&value) => Ok(value),
            _ => Err(ConfigError::InvalidDuration { variable, max }),
        },
        Err(_) => Ok(default),
    }
}

fn days_var(variable: &'static str, default: u64) -> Result<chrono::Duration, ConfigError> {
    let days = bounded_var(variable, default, MAX_WINDOW_DAYS)?;
    i64::try_from(days)
        .ok()
        .and_then(chrono::Duration::try_days)
        .ok_or(ConfigError::InvalidDuration {
            variable,
            max: MAX_WINDOW_DAYS,
        })
}

fn hours_var(variable: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let hours = bounded_var(variable, default, MAX_SWEEP_INTERVAL_HOURS)?;
    hours
        .checked_mul(60 * 60)
        .map(Duration::from_secs)
        .ok_or(ConfigError::InvalidDuration {
            variable,
            max: MAX_SWEEP_INTERVAL_HOURS,
        })
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Time windows governing invitations and the expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// How long an issued invitation token stays redeemable.
    pub invitation_ttl: chrono::Duration,
    /// Age after which resolved maintenance requests and announcements are retired.
    pub retention: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            invitation_ttl: chrono::Duration::days(7),
            retention: chrono::Duration::days(7),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { variable: &'static str, max: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { variable, max } => {
                write!(f, "{variable} must be a whole number between 1 and {max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDuration { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

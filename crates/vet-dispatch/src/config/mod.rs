use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

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
    pub dispatch: DispatchConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dispatch: DispatchConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Upper bound for `DISPATCH_STALE_AFTER_MINUTES` (one year).
pub const MAX_STALE_AFTER_MINUTES: i64 = 365 * 24 * 60;

/// Knobs for candidate ranking and request lifecycle reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Distances that round to the same multiple of this value are treated as ties.
    pub tie_precision_km: f64,
    pub max_distance_km: Option<f64>,
    pub geo_timeout_ms: u64,
    pub directory_timeout_ms: u64,
    pub average_speed_kmh: f64,
    /// Between 1 and [`MAX_STALE_AFTER_MINUTES`].
    pub stale_after_minutes: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tie_precision_km: 0.01,
            max_distance_km: None,
            geo_timeout_ms: 2_000,
            directory_timeout_ms: 2_000,
            average_speed_kmh: 30.0,
            stale_after_minutes: 30,
        }
    }
}

impl DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tie_precision_km = positive_var("DISPATCH_TIE_PRECISION_KM", defaults.tie_precision_km)?;
        let max_distance_km = match env::var("DISPATCH_MAX_DISTANCE_KM") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(positive_var("DISPATCH_MAX_DISTANCE_KM", 0.0)?)
            }
            _ => None,
        };
        let geo_timeout_ms = parse_var("DISPATCH_GEO_TIMEOUT_MS", defaults.geo_timeout_ms)?;
        let directory_timeout_ms =
            parse_var("DISPATCH_DIRECTORY_TIMEOUT_MS", defaults.directory_timeout_ms)?;
        let average_speed_kmh =
            positive_var("DISPATCH_AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?;
        let stale_after_minutes =
            parse_var("DISPATCH_STALE_AFTER_MINUTES", defaults.stale_after_minutes)?;
        if !(1..=MAX_STALE_AFTER_MINUTES).contains(&stale_after_minutes) {
            return Err(ConfigError::InvalidNumber {
                key: "DISPATCH_STALE_AFTER_MINUTES",
            });
        }

        Ok(Self {
            tie_precision_km,
            max_distance_km,
            geo_timeout_ms,
            directory_timeout_ms,
            average_speed_kmh,
            stale_after_minutes,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(default),
    }
}

fn positive_var(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_var(key, default)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber { key })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive number")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

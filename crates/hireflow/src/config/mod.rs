use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::screening::{AnalystConfig, PipelineConfig, ScoreWeights, ScoringConfig};

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
    pub pipeline: PipelineConfig,
    pub scoring: ScoringConfig,
    pub analyst: AnalystConfig,
    /// Root directory the filesystem extraction gateway resolves document references against.
    pub document_root: PathBuf,
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

        let pipeline = load_pipeline()?;
        let scoring = load_scoring()?;
        let analyst = load_analyst()?;
        let document_root = env::var("HIREFLOW_DOCUMENT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./documents"));

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
            scoring,
            analyst,
            document_root,
        })
    }
}

fn load_pipeline() -> Result<PipelineConfig, ConfigError> {
    let defaults = PipelineConfig::default();

    let worker_id = env::var("HIREFLOW_WORKER_ID")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(defaults.worker_id);
    let batch_size = parse_var("HIREFLOW_BATCH_SIZE", defaults.batch_size)?;
    let concurrency = parse_var("HIREFLOW_CONCURRENCY", defaults.concurrency)?;
    if batch_size == 0 {
        return Err(ConfigError::OutOfRange {
            key: "HIREFLOW_BATCH_SIZE",
        });
    }
    if concurrency == 0 {
        return Err(ConfigError::OutOfRange {
            key: "HIREFLOW_CONCURRENCY",
        });
    }

    let heartbeat_interval = parse_secs(
        "HIREFLOW_HEARTBEAT_INTERVAL_SECS",
        defaults.heartbeat_interval,
    )?;
    let stale_after = parse_secs("HIREFLOW_STALE_AFTER_SECS", defaults.stale_after)?;
    // Live workers must refresh their lease before the sweep considers it stale.
    if heartbeat_interval >= stale_after {
        return Err(ConfigError::OutOfRange {
            key: "HIREFLOW_HEARTBEAT_INTERVAL_SECS",
        });
    }

    Ok(PipelineConfig {
        worker_id,
        batch_size,
        concurrency,
        poll_interval: parse_secs("HIREFLOW_POLL_INTERVAL_SECS", defaults.poll_interval)?,
        heartbeat_interval,
        stale_after,
        sweep_interval: parse_secs("HIREFLOW_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
        min_text_chars: parse_var("HIREFLOW_MIN_TEXT_CHARS", defaults.min_text_chars)?,
    })
}

fn load_scoring() -> Result<ScoringConfig, ConfigError> {
    let defaults = ScoringConfig::default();

    let tech = parse_var("HIREFLOW_WEIGHT_TECH", defaults.weights.tech)?;
    let culture = parse_var("HIREFLOW_WEIGHT_CULTURE", defaults.weights.culture)?;
    if tech > 100 || culture > 100 {
        return Err(ConfigError::OutOfRange {
            key: "HIREFLOW_WEIGHT_TECH",
        });
    }

    let culture_match_weight = parse_var(
        "HIREFLOW_CULTURE_MATCH_WEIGHT",
        defaults.culture_match_weight,
    )?;
    if !culture_match_weight.is_finite() {
        return Err(ConfigError::OutOfRange {
            key: "HIREFLOW_CULTURE_MATCH_WEIGHT",
        });
    }

    let eliminatory_keywords = match env::var("HIREFLOW_ELIMINATORY_KEYWORDS") {
        Ok(raw) => raw
            .split(',')
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect(),
        Err(_) => defaults.eliminatory_keywords,
    };

    let revision = env::var("HIREFLOW_SCORING_REVISION").unwrap_or(defaults.revision);

    Ok(ScoringConfig {
        eliminatory_keywords,
        weights: ScoreWeights { tech, culture },
        culture_match_weight,
        revision,
    })
}

fn load_analyst() -> Result<AnalystConfig, ConfigError> {
    let defaults = AnalystConfig::default();

    Ok(AnalystConfig {
        api_key: env::var("OPENAI_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty()),
        model: env::var("HIREFLOW_AI_MODEL").unwrap_or(defaults.model),
        base_url: env::var("HIREFLOW_AI_BASE_URL").unwrap_or(defaults.base_url),
        timeout: parse_secs("HIREFLOW_AI_TIMEOUT_SECS", defaults.timeout)?,
    })
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_var(key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::OutOfRange { key });
    }
    Ok(Duration::from_secs(secs))
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

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be numeric (found '{value}')")
            }
            ConfigError::OutOfRange { key } => write!(f, "{key} is outside the accepted range"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}

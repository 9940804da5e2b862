use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";
pub const DEFAULT_SAMPLE_RATE: u32 = 1;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_SEND_FREQUENCY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for every millisecond setting. Timer wheels reject
/// deadlines more than about two years out.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HONEYCOMB_API_HOST is not a valid URL: {0}")]
    ApiHostInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("{0} is out of range: {1} (at most {2} ms)")]
    OutOfRange(String, String, u64),

    #[error("{0} has invalid value: {1} (expected \"true\" or \"false\")")]
    InvalidBool(String, String),
}

/// Settings shared by the client facade and the transmission engine.
///
/// `write_key`, `dataset`, `api_host` and `sample_rate` are the defaults
/// stamped onto every new event; the remaining fields tune batching and
/// delivery.
#[derive(Debug, Clone)]
pub struct Config {
    pub write_key: Option<String>,
    pub dataset: Option<String>,
    pub api_host: Url,
    pub sample_rate: u32,
    pub max_batch_size: usize,
    pub send_frequency: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub collect_runtime_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_key: None,
            dataset: None,
            api_host: default_api_host(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            send_frequency: DEFAULT_SEND_FREQUENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            collect_runtime_stats: true,
        }
    }
}

impl Config {
    /// Defaults with the given write key and dataset.
    pub fn new(write_key: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            write_key: Some(write_key.into()),
            dataset: Some(dataset.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("HONEYCOMB_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let write_key = parse_optional(vars, "HONEYCOMB_WRITE_KEY");
        let dataset = parse_optional(vars, "HONEYCOMB_DATASET");
        let api_host = parse_api_host(vars)?;
        let sample_rate = parse_positive(vars, "HONEYCOMB_SAMPLE_RATE", DEFAULT_SAMPLE_RATE)?;
        let max_batch_size =
            parse_positive(vars, "HONEYCOMB_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?;
        let send_frequency =
            parse_duration_ms(vars, "HONEYCOMB_SEND_FREQUENCY_MS", DEFAULT_SEND_FREQUENCY)?;
        let max_attempts = parse_positive(vars, "HONEYCOMB_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let retry_base_delay = parse_duration_ms(
            vars,
            "HONEYCOMB_RETRY_BASE_DELAY_MS",
            DEFAULT_RETRY_BASE_DELAY,
        )?;
        let request_timeout =
            parse_duration_ms(vars, "HONEYCOMB_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?;
        let collect_runtime_stats = parse_bool(vars, "HONEYCOMB_COLLECT_RUNTIME_STATS", true)?;

        Ok(Self {
            write_key,
            dataset,
            api_host,
            sample_rate,
            max_batch_size,
            send_frequency,
            max_attempts,
            retry_base_delay,
            request_timeout,
            collect_runtime_stats,
        })
    }
}

fn default_api_host() -> Url {
    Url::parse(DEFAULT_API_HOST).expect("default API host is a valid URL")
}

fn parse_optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|s| !s.is_empty()).cloned()
}

fn parse_api_host(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    match vars.get("HONEYCOMB_API_HOST").filter(|s| !s.is_empty()) {
        Some(raw) => Url::parse(raw).map_err(|_| ConfigError::ApiHostInvalidUrl(raw.clone())),
        None => Ok(default_api_host()),
    }
}

fn parse_positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    match vars.get(name) {
        Some(val) => {
            let parsed: T = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            if parsed == T::default() {
                return Err(ConfigError::Zero(name.to_owned()));
            }
            Ok(parsed)
        }
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            let duration = Duration::from_millis(ms);
            if duration > MAX_DURATION {
                return Err(ConfigError::OutOfRange(
                    name.to_owned(),
                    val.clone(),
                    MAX_DURATION.as_millis() as u64,
                ));
            }
            Ok(duration)
        }
        None => Ok(default),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|s| s.as_str()) {
        None | Some("") => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidBool(name.to_owned(), other.to_owned())),
    }
}

/// Configuration management
///
/// Flat environment variables (optionally from a `.env` file) are read with
/// `envy` and grouped into typed sections.
use crate::error::{RankerError, Result};
use crate::services::dispatcher::{AdmissionPolicy, DispatcherSettings};
use crate::services::ranking::EnsembleWeights;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub models: ModelConfig,
    pub ensemble: EnsembleWeights,
    pub dispatcher: DispatcherConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_host: String,
    pub http_port: u16,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub lambdamart_path: PathBuf,
    pub ctr_path: PathBuf,
    /// Built-in schema when unset
    pub feature_schema_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub admission: AdmissionPolicy,
    pub max_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub channel_capacity: usize,
}

/// Raw environment as seen by envy (keys are the lowercased variable names)
#[derive(Debug, Deserialize)]
struct RawEnv {
    #[serde(default = "default_service_name")]
    service_name: String,
    #[serde(default = "default_http_host")]
    http_host: String,
    #[serde(default = "default_http_port")]
    http_port: u16,
    #[serde(default = "default_lambdamart_path")]
    lambdamart_model_path: PathBuf,
    #[serde(default = "default_ctr_path")]
    ctr_model_path: PathBuf,
    #[serde(default)]
    feature_schema_path: Option<PathBuf>,
    #[serde(default = "default_weight")]
    ensemble_weight_lm: f32,
    #[serde(default = "default_weight")]
    ensemble_weight_ctr: f32,
    #[serde(default = "default_max_in_flight")]
    max_in_flight: usize,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_admission_policy")]
    admission_policy: String,
    #[serde(default = "default_max_queue_depth")]
    max_queue_depth: usize,
    #[serde(default = "default_max_queue_wait_ms")]
    max_queue_wait_ms: u64,
    #[serde(default = "default_max_candidates")]
    max_candidates: usize,
    #[serde(default = "default_metrics_channel_capacity")]
    metrics_channel_capacity: usize,
}

fn default_service_name() -> String {
    "feed-ranker".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_lambdamart_path() -> PathBuf {
    PathBuf::from("models/lambdamart.txt")
}

fn default_ctr_path() -> PathBuf {
    PathBuf::from("models/deepctr.onnx")
}

fn default_weight() -> f32 {
    0.5
}

fn default_max_in_flight() -> usize {
    64
}

fn default_request_timeout_ms() -> u64 {
    50
}

fn default_admission_policy() -> String {
    "reject".to_string()
}

fn default_max_queue_depth() -> usize {
    256
}

fn default_max_queue_wait_ms() -> u64 {
    10
}

fn default_max_candidates() -> usize {
    1000
}

fn default_metrics_channel_capacity() -> usize {
    4096
}

impl Config {
    /// Load `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawEnv = envy::from_iter(vars)
            .map_err(|e| RankerError::InvalidConfig(e.to_string()))?;

        let admission = match raw.admission_policy.trim().to_ascii_lowercase().as_str() {
            "reject" => AdmissionPolicy::Reject,
            "queue" => AdmissionPolicy::Queue {
                max_depth: raw.max_queue_depth,
                max_wait: Duration::from_millis(raw.max_queue_wait_ms),
            },
            other => {
                return Err(RankerError::InvalidConfig(format!(
                    "ADMISSION_POLICY must be 'reject' or 'queue', got '{}'",
                    other
                )))
            }
        };

        let config = Config {
            service: ServiceConfig {
                service_name: raw.service_name,
                http_host: raw.http_host,
                http_port: raw.http_port,
            },
            models: ModelConfig {
                lambdamart_path: raw.lambdamart_model_path,
                ctr_path: raw.ctr_model_path,
                feature_schema_path: raw.feature_schema_path,
            },
            ensemble: EnsembleWeights {
                lambdamart: raw.ensemble_weight_lm,
                ctr: raw.ensemble_weight_ctr,
            },
            dispatcher: DispatcherConfig {
                max_in_flight: raw.max_in_flight,
                request_timeout: Duration::from_millis(raw.request_timeout_ms),
                admission,
                max_candidates: raw.max_candidates,
            },
            metrics: MetricsConfig {
                channel_capacity: raw.metrics_channel_capacity,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ensemble.validate()?;

        let zero = |name: &str| {
            Err(RankerError::InvalidConfig(format!(
                "{} must be greater than zero",
                name
            )))
        };
        if self.dispatcher.max_in_flight == 0 {
            return zero("MAX_IN_FLIGHT");
        }
        if self.dispatcher.request_timeout.is_zero() {
            return zero("REQUEST_TIMEOUT_MS");
        }
        if self.dispatcher.max_candidates == 0 {
            return zero("MAX_CANDIDATES");
        }
        if self.metrics.channel_capacity == 0 {
            return zero("METRICS_CHANNEL_CAPACITY");
        }
        if let AdmissionPolicy::Queue { max_wait, .. } = self.dispatcher.admission {
            if max_wait.is_zero() {
                return zero("MAX_QUEUE_WAIT_MS");
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.service.http_host.clone(), self.service.http_port)
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            max_in_flight: self.dispatcher.max_in_flight,
            admission: self.dispatcher.admission,
            request_timeout: self.dispatcher.request_timeout,
            max_candidates: self.dispatcher.max_candidates,
        }
    }
}

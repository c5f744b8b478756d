//! Process-wide configuration, read once at startup from `PIPELINE_*`
//! environment variables and passed by reference thereafter.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::{PipelineError, Result};
use crate::runtime::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Delivery attempts before the bus routes a message to its DLQ topic
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Bucket names for every storage area of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub input: String,
    pub processed: String,
    pub classified: String,
    pub extracted: String,
    pub archive: String,
    pub failed: String,
}

/// Topic names for the stage chain. DLQ twins share the base name with a
/// `-dlq` suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub uploaded: String,
    pub converted: String,
    pub classified: String,
    pub extracted: String,
    pub loaded: String,
    #[serde(default = "default_dlq_suffix")]
    pub dlq_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// sqlx connection string for the analytical database
    pub database_url: String,
    pub dataset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Vision model identifier
    pub model: String,
    /// Base URL of the generateContent-style endpoint
    pub endpoint: String,
    /// API key; optional so local emulators can run without one
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub nats_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Ack window granted by the push subscription, in seconds
    #[serde(default = "default_ack_deadline_secs")]
    pub ack_deadline_secs: u64,
    /// Subtracted from the ack window to leave room for the reply
    #[serde(default = "default_deadline_margin_secs")]
    pub deadline_margin_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_prometheus_addr")]
    pub prometheus_addr: String,
}

/// Per-stage delivery concurrency. The extractor defaults to 1 because the
/// vision model is the cost bottleneck and sequential calls stay inside
/// provider rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_stage_concurrency")]
    pub normalizer: usize,
    #[serde(default = "default_stage_concurrency")]
    pub classifier: usize,
    #[serde(default = "default_extractor_concurrency")]
    pub extractor: usize,
    #[serde(default = "default_stage_concurrency")]
    pub warehouse_writer: usize,
    #[serde(default = "default_stage_concurrency")]
    pub dlq_processor: usize,
}

fn default_project_id() -> String {
    "local-project".to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_dlq_suffix() -> String {
    "-dlq".to_string()
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_ack_deadline_secs() -> u64 {
    600
}

fn default_deadline_margin_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    false
}

fn default_prometheus_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_stage_concurrency() -> usize {
    10
}

fn default_extractor_concurrency() -> usize {
    1
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            input: "invoices-input".to_string(),
            processed: "invoices-processed".to_string(),
            classified: "invoices-classified".to_string(),
            extracted: "invoices-extracted".to_string(),
            archive: "invoices-archive".to_string(),
            failed: "invoices-failed".to_string(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            uploaded: "invoice-uploaded".to_string(),
            converted: "invoice-converted".to_string(),
            classified: "invoice-classified".to_string(),
            extracted: "invoice-extracted".to_string(),
            loaded: "invoice-loaded".to_string(),
            dlq_suffix: default_dlq_suffix(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:warehouse.db?mode=rwc".to_string(),
            dataset: "invoice_analytics".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            ack_deadline_secs: default_ack_deadline_secs(),
            deadline_margin_secs: default_deadline_margin_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            prometheus_addr: default_prometheus_addr(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            normalizer: default_stage_concurrency(),
            classifier: default_stage_concurrency(),
            extractor: default_extractor_concurrency(),
            warehouse_writer: default_stage_concurrency(),
            dlq_processor: default_stage_concurrency(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            region: default_region(),
            buckets: BucketConfig::default(),
            topics: TopicConfig::default(),
            warehouse: WarehouseConfig::default(),
            llm: LlmConfig::default(),
            bus: BusConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            max_delivery_attempts: default_max_delivery_attempts(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl TopicConfig {
    /// Input topic a stage consumes.
    pub fn input_for(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Normalizer => Some(&self.uploaded),
            Stage::Classifier => Some(&self.converted),
            Stage::Extractor => Some(&self.classified),
            Stage::WarehouseWriter => Some(&self.extracted),
            Stage::DlqProcessor => None,
        }
    }

    /// DLQ twin of a topic.
    pub fn dlq_for(&self, topic: &str) -> String {
        format!("{}{}", topic, self.dlq_suffix)
    }

    /// The stage whose input topic dead-letters into `topic_or_subscription`.
    ///
    /// The match is substring-based because dead-letter attributes carry
    /// fully-qualified topic or subscription paths.
    pub fn stage_for_dlq(&self, topic_or_subscription: &str) -> Option<Stage> {
        let candidates = [
            (Stage::Normalizer, &self.uploaded),
            (Stage::Classifier, &self.converted),
            (Stage::Extractor, &self.classified),
            (Stage::WarehouseWriter, &self.extracted),
        ];
        candidates
            .iter()
            .filter(|(_, base)| {
                topic_or_subscription.contains(self.dlq_for(base).as_str())
                    || topic_or_subscription.contains(base.as_str())
            })
            .max_by_key(|(_, base)| base.len())
            .map(|(stage, _)| *stage)
    }
}

impl PipelineConfig {
    /// Load from the environment. Nested fields use double underscores,
    /// e.g. `PIPELINE_BUCKETS__INPUT=my-landing-bucket`.
    pub fn from_env() -> Result<Self> {
        Figment::from(Serialized::defaults(PipelineConfig::default()))
            .merge(Env::prefixed("PIPELINE_").split("__"))
            .extract()
            .map_err(|e| PipelineError::config(format!("invalid configuration: {}", e)))
    }

    /// Delivery processing budget: ack window minus the safety margin.
    pub fn delivery_deadline(&self) -> std::time::Duration {
        let secs = self
            .server
            .ack_deadline_secs
            .saturating_sub(self.server.deadline_margin_secs)
            .max(1);
        std::time::Duration::from_secs(secs)
    }

    pub fn concurrency_for(&self, stage: Stage) -> usize {
        let limit = match stage {
            Stage::Normalizer => self.concurrency.normalizer,
            Stage::Classifier => self.concurrency.classifier,
            Stage::Extractor => self.concurrency.extractor,
            Stage::WarehouseWriter => self.concurrency.warehouse_writer,
            Stage::DlqProcessor => self.concurrency.dlq_processor,
        };
        limit.max(1)
    }
}

//! Stage runtime: terminates the push-subscription protocol, drives the
//! per-delivery lifecycle, and translates handler outcomes into the
//! ack/nack statuses the bus observes.

pub mod envelope;
pub mod host;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

pub use envelope::{Delivery, PushMessage, PushRequest};
pub use host::{serve_stage, stage_router, HostState};

/// The processing stages a host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Normalizer,
    Classifier,
    Extractor,
    WarehouseWriter,
    DlqProcessor,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalizer => "normalizer",
            Stage::Classifier => "classifier",
            Stage::Extractor => "extractor",
            Stage::WarehouseWriter => "warehouse-writer",
            Stage::DlqProcessor => "dlq-processor",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage's message handler.
///
/// Contract with the host:
/// - `Ok(())` acks the delivery.
/// - A transient error nacks it; the bus redelivers with backoff and
///   dead-letters after the configured maximum attempts.
/// - A permanent error is returned only after the handler has quarantined
///   the offending work; the host logs it and acks so the bus stops
///   retrying.
///
/// Handlers must be idempotent: the bus guarantees at-least-once delivery.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn handle(&self, delivery: &Delivery) -> Result<()>;
}

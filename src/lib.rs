//! Invoice Pipeline - event-driven invoice extraction
//!
//! Four stateless stages chained through a message bus turn delivery-platform
//! invoice images into validated warehouse rows: format normalization, vendor
//! classification, vision-model extraction, and warehouse loading, plus a
//! dead-letter drain for work that exhausted its retries.

pub mod bus;
pub mod config;
pub mod dlq;
pub mod domain;
pub mod llm;
pub mod observability;
pub mod pages;
pub mod retry;
pub mod runtime;
pub mod stages;
pub mod storage;
pub mod warehouse;

// Re-export commonly used types
pub use domain::{
    ClassifiedEvent, ConvertedEvent, EventPayload, ExtractedEvent, FailureKind, Invoice,
    InvoiceId, LineItem, LoadedEvent, PageRef, PipelineError, Result, SourceObject, SourceRef,
    VendorType,
};

pub use config::PipelineConfig;

pub use bus::{Attributes, Bus, InMemoryBus, NatsBus};

pub use storage::{FsObjectStore, InMemoryObjectStore, ObjectStore};

pub use runtime::{serve_stage, stage_router, Delivery, HostState, PushRequest, Stage, StageHandler};

pub use stages::{Classifier, Extractor, Normalizer, WarehouseWriter};

pub use dlq::{DeadLetterRecord, DlqProcessor};

pub use llm::{HttpVisionClient, VisionModel};

pub use pages::{ImagePageDecoder, PageDecoder};

pub use warehouse::{InMemoryWarehouse, SqliteWarehouse, WarehouseRepository};

pub use retry::RetryPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

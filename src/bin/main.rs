//! Stage host binary: runs one pipeline stage behind its push endpoint.
//!
//! Exit codes: 0 on normal termination, 1 on a fatal configuration error,
//! 2 when the port cannot be bound.

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use invoice_pipeline::{
    config::PipelineConfig,
    dlq::DlqProcessor,
    llm::HttpVisionClient,
    observability,
    pages::ImagePageDecoder,
    runtime::{serve_stage, HostState, Stage, StageHandler},
    stages::{Classifier, Extractor, Normalizer, WarehouseWriter},
    storage::FsObjectStore,
    warehouse::SqliteWarehouse,
    Bus, NatsBus, ObjectStore,
};

#[derive(Parser)]
#[command(name = "invoice-stage", version, about = "Invoice pipeline stage host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one stage's push endpoint
    Serve {
        #[arg(value_enum)]
        stage: Stage,

        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,

        /// Root directory for the local object store
        #[arg(long, env = "PIPELINE_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("configuration error: {}", e);
        exit(1);
    }
    if let Err(e) = observability::init_metrics(&config.metrics) {
        error!(error = %e, "Metrics initialization failed");
        exit(1);
    }

    match cli.command {
        Command::Serve {
            stage,
            port,
            data_dir,
        } => {
            info!(
                stage = stage.as_str(),
                version = invoice_pipeline::VERSION,
                "Starting stage host"
            );

            let handler = match build_handler(stage, &config, data_dir).await {
                Ok(handler) => handler,
                Err(e) => {
                    error!(stage = stage.as_str(), error = %e, "Stage wiring failed");
                    exit(1);
                }
            };

            let bind_addr = format!(
                "{}:{}",
                config.server.bind,
                port.unwrap_or(config.server.port)
            );
            let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(addr = %bind_addr, error = %e, "Cannot bind stage port");
                    exit(2);
                }
            };

            let state = HostState::new(handler, config.delivery_deadline());
            let concurrency = config.concurrency_for(stage);
            if let Err(e) = serve_stage(listener, state, concurrency).await {
                error!(error = %e, "Stage host terminated abnormally");
                exit(1);
            }
        }
    }
}

async fn build_handler(
    stage: Stage,
    config: &PipelineConfig,
    data_dir: PathBuf,
) -> invoice_pipeline::Result<Arc<dyn StageHandler>> {
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(data_dir));
    let bus: Arc<dyn Bus> = Arc::new(NatsBus::connect(&config.bus.nats_url).await?);

    let handler: Arc<dyn StageHandler> = match stage {
        Stage::Normalizer => Arc::new(Normalizer::new(
            store,
            bus,
            Arc::new(ImagePageDecoder::new()),
            config.buckets.clone(),
            config.topics.clone(),
        )),
        Stage::Classifier => Arc::new(Classifier::new(
            store,
            bus,
            config.buckets.clone(),
            config.topics.clone(),
        )),
        Stage::Extractor => Arc::new(Extractor::new(
            store,
            bus,
            Arc::new(HttpVisionClient::new(config.llm.clone())?),
            config.llm.model.clone(),
            config.buckets.clone(),
            config.topics.clone(),
        )),
        Stage::WarehouseWriter => Arc::new(WarehouseWriter::new(
            store,
            bus,
            Arc::new(SqliteWarehouse::connect(&config.warehouse.database_url).await?),
            config.buckets.clone(),
            config.topics.clone(),
        )),
        Stage::DlqProcessor => Arc::new(DlqProcessor::new(
            store,
            config.buckets.failed.clone(),
            config.topics.clone(),
        )),
    };

    Ok(handler)
}

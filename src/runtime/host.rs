// HTTP host wrapping a stage handler

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn};

use crate::domain::{FailureKind, PipelineError};

use super::envelope::PushRequest;
use super::StageHandler;

/// Shared state of a stage host.
#[derive(Clone)]
pub struct HostState {
    handler: Arc<dyn StageHandler>,
    /// Per-delivery processing budget (ack window minus safety margin)
    deadline: Duration,
}

impl HostState {
    pub fn new(handler: Arc<dyn StageHandler>, deadline: Duration) -> Self {
        Self { handler, deadline }
    }
}

/// Build the router for one stage: the push endpoint plus a health probe.
pub fn stage_router(state: HostState, concurrency: usize) -> Router {
    Router::new()
        .route("/push", post(push_handler))
        .route_layer(ConcurrencyLimitLayer::new(concurrency))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)),
        )
}

async fn health_handler(State(state): State<HostState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "stage": state.handler.stage().as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Push-subscription endpoint.
///
/// Status codes are the retry contract: 2xx acks (success, quarantined
/// permanent failures, poison envelopes), 5xx nacks so the bus redelivers.
async fn push_handler(State(state): State<HostState>, body: bytes::Bytes) -> StatusCode {
    let stage = state.handler.stage();
    let started = Instant::now();

    let delivery = match PushRequest::decode(&body) {
        Ok(delivery) => delivery,
        Err(e) => {
            error!(
                stage = stage.as_str(),
                reason = "envelope_unparseable",
                error = %e,
                "Acking poison envelope"
            );
            record_outcome(stage, "poison", started);
            return StatusCode::OK;
        }
    };

    info!(
        stage = stage.as_str(),
        message_id = %delivery.message_id,
        delivery_attempt = delivery.delivery_attempt,
        "Processing delivery"
    );

    let result = tokio::time::timeout(state.deadline, state.handler.handle(&delivery)).await;

    match result {
        Ok(Ok(())) => {
            info!(
                stage = stage.as_str(),
                message_id = %delivery.message_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Delivery processed"
            );
            record_outcome(stage, "success", started);
            StatusCode::NO_CONTENT
        }
        Ok(Err(e)) => match e.kind() {
            FailureKind::Transient => {
                warn!(
                    stage = stage.as_str(),
                    message_id = %delivery.message_id,
                    delivery_attempt = delivery.delivery_attempt,
                    error = %e,
                    "Transient failure, requesting redelivery"
                );
                record_outcome(stage, "transient", started);
                StatusCode::SERVICE_UNAVAILABLE
            }
            FailureKind::Permanent => {
                error!(
                    stage = stage.as_str(),
                    message_id = %delivery.message_id,
                    reason = %e,
                    "Permanent failure quarantined, acking"
                );
                record_outcome(stage, "permanent", started);
                StatusCode::OK
            }
        },
        Err(_) => {
            let e = PipelineError::DeadlineExceeded(format!(
                "delivery budget of {:?} exhausted",
                state.deadline
            ));
            warn!(
                stage = stage.as_str(),
                message_id = %delivery.message_id,
                error = %e,
                "Delivery deadline exceeded, requesting redelivery"
            );
            record_outcome(stage, "deadline", started);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn record_outcome(stage: super::Stage, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "pipeline_deliveries_total",
        1,
        "stage" => stage.as_str(),
        "outcome" => outcome,
    );
    metrics::histogram!(
        "pipeline_delivery_duration_ms",
        started.elapsed().as_secs_f64() * 1000.0,
        "stage" => stage.as_str(),
    );
}

/// Serve a stage host on an already-bound listener until shutdown.
///
/// The caller binds the listener so a port-binding failure can be reported
/// with its own exit code.
pub async fn serve_stage(
    listener: tokio::net::TcpListener,
    state: HostState,
    concurrency: usize,
) -> crate::domain::Result<()> {
    let stage = state.handler.stage();
    let app = stage_router(state, concurrency);

    info!(
        stage = stage.as_str(),
        addr = %listener.local_addr()?,
        concurrency = concurrency,
        "Stage host listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining");
}

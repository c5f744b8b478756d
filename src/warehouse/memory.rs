// In-memory warehouse double for tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{PipelineError, Result};

use super::{InvoiceRow, LineItemRow, MetricsRow, WarehouseRepository};

#[derive(Default)]
struct Tables {
    invoices: Vec<InvoiceRow>,
    line_items: Vec<LineItemRow>,
    metrics: Vec<MetricsRow>,
}

/// Warehouse double. `fail_next_inserts` injects transient failures to
/// exercise the redelivery path; the tables only mutate on full success so
/// atomicity matches the transactional adapter.
#[derive(Clone, Default)]
pub struct InMemoryWarehouse {
    tables: Arc<Mutex<Tables>>,
    fail_next_inserts: Arc<AtomicU32>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` insert calls fail with a transient error.
    pub fn fail_next_inserts(&self, count: u32) {
        self.fail_next_inserts.store(count, Ordering::SeqCst);
    }

    pub async fn invoices(&self) -> Vec<InvoiceRow> {
        self.tables.lock().await.invoices.clone()
    }

    pub async fn line_items(&self) -> Vec<LineItemRow> {
        self.tables.lock().await.line_items.clone()
    }

    pub async fn line_items_for(&self, invoice_id: &str) -> Vec<LineItemRow> {
        self.tables
            .lock()
            .await
            .line_items
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub async fn metrics(&self) -> Vec<MetricsRow> {
        self.tables.lock().await.metrics.clone()
    }
}

#[async_trait]
impl WarehouseRepository for InMemoryWarehouse {
    async fn invoice_exists(&self, invoice_id: &str) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.invoices.iter().any(|i| i.invoice_id == invoice_id))
    }

    async fn insert_extraction(
        &self,
        invoice: &InvoiceRow,
        items: &[LineItemRow],
        metrics: &MetricsRow,
    ) -> Result<()> {
        let pending = self.fail_next_inserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_inserts.store(pending - 1, Ordering::SeqCst);
            return Err(PipelineError::storage("injected warehouse failure"));
        }

        let mut tables = self.tables.lock().await;
        if tables.invoices.iter().any(|i| i.invoice_id == invoice.invoice_id) {
            return Err(PipelineError::validation(format!(
                "duplicate invoice_id {}",
                invoice.invoice_id
            )));
        }

        tables.invoices.push(invoice.clone());
        tables.line_items.extend(items.iter().cloned());
        tables.metrics.push(metrics.clone());
        Ok(())
    }
}

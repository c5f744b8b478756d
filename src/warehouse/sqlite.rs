// sqlx-backed warehouse repository

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::Result;

use super::{InvoiceRow, LineItemRow, MetricsRow, WarehouseRepository};

/// Warehouse adapter over a SQLite pool. Decimal columns are stored as
/// canonical strings so no precision is lost in transit.
#[derive(Clone)]
pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            crate::domain::PipelineError::config(format!("warehouse migration failed: {}", e))
        })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl WarehouseRepository for SqliteWarehouse {
    async fn invoice_exists(&self, invoice_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM invoices WHERE invoice_id = ?1 LIMIT 1")
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn insert_extraction(
        &self,
        invoice: &InvoiceRow,
        items: &[LineItemRow],
        metrics: &MetricsRow,
    ) -> Result<()> {
        info!(
            invoice_id = %invoice.invoice_id,
            line_items = items.len(),
            "Inserting extraction into warehouse"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, vendor_name, vendor_type, invoice_date, due_date,
                currency, subtotal, tax_amount, commission_rate, commission_amount,
                total_amount, line_items_count, source_file, extraction_model,
                extraction_latency_ms, confidence_score, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&invoice.invoice_id)
        .bind(&invoice.vendor_name)
        .bind(&invoice.vendor_type)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(invoice.subtotal.to_string())
        .bind(invoice.tax_amount.to_string())
        .bind(invoice.commission_rate.map(|d| d.to_string()))
        .bind(invoice.commission_amount.map(|d| d.to_string()))
        .bind(invoice.total_amount.to_string())
        .bind(invoice.line_items_count)
        .bind(&invoice.source_file)
        .bind(&invoice.extraction_model)
        .bind(invoice.extraction_latency_ms)
        .bind(invoice.confidence_score.map(|d| d.to_string()))
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO line_items (
                    invoice_id, line_number, description, quantity,
                    unit_price, amount, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.invoice_id)
            .bind(item.line_number)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price.to_string())
            .bind(item.amount.to_string())
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO metrics (
                invoice_id, vendor_type, source_file, extraction_model,
                extraction_latency_ms, confidence_score, success, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&metrics.invoice_id)
        .bind(&metrics.vendor_type)
        .bind(&metrics.source_file)
        .bind(&metrics.extraction_model)
        .bind(metrics.extraction_latency_ms)
        .bind(metrics.confidence_score.map(|d| d.to_string()))
        .bind(metrics.success)
        .bind(&metrics.error_message)
        .bind(metrics.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

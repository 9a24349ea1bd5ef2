use super::mappers::{encode_transaction, reference_from_row, transaction_from_row};
use super::rows::{PaymentReferenceRow, PendingTransactionRow};
use crate::application::ports::transaction_store::TransactionStore;
use crate::domain::entities::{PaymentReference, PendingTransaction};
use crate::domain::value_objects::{IdempotencyKey, ReferenceCode};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

const SELECT_REFERENCE: &str = r#"
    SELECT idempotency_key, reference_code, status, gateway_status_code,
           payment_url, issued_at, confirmed_at
    FROM payment_references
"#;

pub struct SqliteTransactionStore {
    pool: Pool<Sqlite>,
}

impl SqliteTransactionStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Moves an unreadable row aside so the rest of the queue keeps working.
    async fn quarantine(
        &self,
        key: &str,
        raw_record: &str,
        reason: &str,
        delete_sql: &'static str,
        kind: &'static str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO quarantined_records (idempotency_key, raw_record, reason, quarantined_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(key)
        .bind(raw_record)
        .bind(reason)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        sqlx::query(delete_sql)
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::error!(
            target: "sync::store",
            idempotency_key = %key,
            kind,
            reason,
            "quarantined unreadable record"
        );
        Ok(())
    }

    async fn decode_or_quarantine(
        &self,
        row: PendingTransactionRow,
    ) -> Result<Option<PendingTransaction>, AppError> {
        match transaction_from_row(&row) {
            Ok(transaction) => Ok(Some(transaction)),
            Err(AppError::StoreCorruption(reason)) => {
                self.quarantine(
                    &row.idempotency_key,
                    &row.record,
                    &reason,
                    "DELETE FROM pending_transactions WHERE idempotency_key = ?1",
                    "transaction",
                )
                .await?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    async fn decode_reference_or_quarantine(
        &self,
        row: PaymentReferenceRow,
    ) -> Result<Option<PaymentReference>, AppError> {
        // 参照行は列単位なので JSON にまとめて退避する
        let raw = serde_json::json!({
            "idempotency_key": row.idempotency_key,
            "reference_code": row.reference_code,
            "status": row.status,
            "gateway_status_code": row.gateway_status_code,
            "payment_url": row.payment_url,
            "issued_at": row.issued_at,
            "confirmed_at": row.confirmed_at,
        })
        .to_string();
        let key = row.idempotency_key.clone();

        match reference_from_row(row) {
            Ok(reference) => Ok(Some(reference)),
            Err(AppError::StoreCorruption(reason)) => {
                self.quarantine(
                    &key,
                    &raw,
                    &reason,
                    "DELETE FROM payment_references WHERE idempotency_key = ?1",
                    "payment_reference",
                )
                .await?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl TransactionStore for SqliteTransactionStore {
    async fn put(&self, transaction: &PendingTransaction) -> Result<(), AppError> {
        let record = encode_transaction(transaction)?;

        sqlx::query(
            r#"
            INSERT INTO pending_transactions (idempotency_key, captured_at, updated_at, record)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(idempotency_key) DO UPDATE SET
                updated_at = excluded.updated_at,
                record = excluded.record
            "#,
        )
        .bind(transaction.idempotency_key.as_str())
        .bind(transaction.captured_at().timestamp_millis())
        .bind(transaction.updated_at.timestamp_millis())
        .bind(&record)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PendingTransaction>, AppError> {
        let row = sqlx::query_as::<_, PendingTransactionRow>(
            r#"
            SELECT idempotency_key, captured_at, updated_at, record
            FROM pending_transactions
            WHERE idempotency_key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.decode_or_quarantine(row).await,
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &IdempotencyKey) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM pending_transactions WHERE idempotency_key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<PendingTransaction>, AppError> {
        let rows = sqlx::query_as::<_, PendingTransactionRow>(
            r#"
            SELECT idempotency_key, captured_at, updated_at, record
            FROM pending_transactions
            ORDER BY captured_at ASC, idempotency_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(transaction) = self.decode_or_quarantine(row).await? {
                transactions.push(transaction);
            }
        }

        Ok(transactions)
    }

    async fn insert_reference_if_absent(
        &self,
        reference: &PaymentReference,
    ) -> Result<PaymentReference, AppError> {
        sqlx::query(
            r#"
            INSERT INTO payment_references (
                idempotency_key, reference_code, status, gateway_status_code,
                payment_url, issued_at, confirmed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(idempotency_key) DO NOTHING
            "#,
        )
        .bind(reference.idempotency_key.as_str())
        .bind(reference.reference_code.as_str())
        .bind(reference.status.as_str())
        .bind(reference.gateway_status_code.as_ref().map(|code| code.as_str()))
        .bind(reference.payment_url.as_deref())
        .bind(reference.issued_at.timestamp_millis())
        .bind(reference.confirmed_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        self.get_reference(&reference.idempotency_key)
            .await?
            .ok_or_else(|| {
                AppError::Database(format!(
                    "payment reference for {} vanished after insert",
                    reference.idempotency_key
                ))
            })
    }

    async fn update_reference(&self, reference: &PaymentReference) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_references
            SET status = ?2, gateway_status_code = ?3, confirmed_at = ?4
            WHERE idempotency_key = ?1
            "#,
        )
        .bind(reference.idempotency_key.as_str())
        .bind(reference.status.as_str())
        .bind(reference.gateway_status_code.as_ref().map(|code| code.as_str()))
        .bind(reference.confirmed_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "payment reference for {}",
                reference.idempotency_key
            )));
        }
        Ok(())
    }

    async fn get_reference(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<PaymentReference>, AppError> {
        let row = sqlx::query_as::<_, PaymentReferenceRow>(&format!(
            "{SELECT_REFERENCE} WHERE idempotency_key = ?1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.decode_reference_or_quarantine(row).await,
            None => Ok(None),
        }
    }

    async fn find_reference_by_code(
        &self,
        code: &ReferenceCode,
    ) -> Result<Option<PaymentReference>, AppError> {
        let row = sqlx::query_as::<_, PaymentReferenceRow>(&format!(
            "{SELECT_REFERENCE} WHERE reference_code = ?1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.decode_reference_or_quarantine(row).await,
            None => Ok(None),
        }
    }

    async fn quarantined_count(&self) -> Result<u64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quarantined_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

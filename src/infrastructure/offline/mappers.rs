use super::rows::{PaymentReferenceRow, PendingTransactionRow};
use crate::domain::entities::{PaymentReference, PaymentReferenceStatus, PendingTransaction};
use crate::domain::value_objects::{GatewayStatusCode, IdempotencyKey, ReferenceCode};
use crate::shared::error::AppError;
use crate::infrastructure::database::millis_to_datetime;

pub fn encode_transaction(transaction: &PendingTransaction) -> Result<String, AppError> {
    serde_json::to_string(transaction).map_err(|err| AppError::SerializationError(err.to_string()))
}

/// Decodes a queue row. Any mismatch between the row key and the record is
/// treated as corruption, the same as unparseable JSON.
pub fn transaction_from_row(row: &PendingTransactionRow) -> Result<PendingTransaction, AppError> {
    let transaction: PendingTransaction = serde_json::from_str(&row.record)
        .map_err(|err| AppError::StoreCorruption(format!("unparseable record: {err}")))?;

    if transaction.idempotency_key.as_str() != row.idempotency_key {
        return Err(AppError::StoreCorruption(format!(
            "record key {} does not match row key {}",
            transaction.idempotency_key, row.idempotency_key
        )));
    }

    Ok(transaction)
}

pub fn reference_from_row(row: PaymentReferenceRow) -> Result<PaymentReference, AppError> {
    let corrupt = |msg: String| AppError::StoreCorruption(format!("payment reference: {msg}"));

    Ok(PaymentReference {
        reference_code: ReferenceCode::new(row.reference_code).map_err(corrupt)?,
        idempotency_key: IdempotencyKey::parse(&row.idempotency_key).map_err(corrupt)?,
        status: PaymentReferenceStatus::parse(&row.status).map_err(corrupt)?,
        gateway_status_code: row.gateway_status_code.map(GatewayStatusCode::new),
        payment_url: row.payment_url,
        issued_at: millis_to_datetime(row.issued_at)?,
        confirmed_at: row.confirmed_at.map(millis_to_datetime).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn mismatched_row_key_is_corruption() {
        let key = IdempotencyKey::generate();
        let other = IdempotencyKey::generate();
        let payload = crate::domain::entities::pending_transaction::fixtures::payload_at(
            Utc::now(),
        );
        let txn = PendingTransaction::new(key, payload);
        let row = PendingTransactionRow {
            idempotency_key: other.to_string(),
            captured_at: 0,
            updated_at: 0,
            record: encode_transaction(&txn).unwrap(),
        };

        assert!(matches!(
            transaction_from_row(&row),
            Err(AppError::StoreCorruption(_))
        ));
    }

    #[test]
    fn garbage_record_is_corruption() {
        let row = PendingTransactionRow {
            idempotency_key: IdempotencyKey::generate().to_string(),
            captured_at: 0,
            updated_at: 0,
            record: "{not json".to_string(),
        };
        assert!(matches!(
            transaction_from_row(&row),
            Err(AppError::StoreCorruption(_))
        ));
    }
}

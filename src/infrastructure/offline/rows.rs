use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PendingTransactionRow {
    pub idempotency_key: String,
    pub captured_at: i64,
    pub updated_at: i64,
    pub record: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentReferenceRow {
    pub idempotency_key: String,
    pub reference_code: String,
    pub status: String,
    pub gateway_status_code: Option<String>,
    pub payment_url: Option<String>,
    pub issued_at: i64,
    pub confirmed_at: Option<i64>,
}

pub mod amount;
pub mod cache_generation;
pub mod collector_id;
pub mod idempotency_key;
pub mod payer;
pub mod reference_code;
pub mod request_key;
pub mod revenue_code;

pub use amount::Amount;
pub use cache_generation::CacheGeneration;
pub use collector_id::CollectorId;
pub use idempotency_key::IdempotencyKey;
pub use payer::{GeoPoint, PayerIdentity};
pub use reference_code::{GatewayStatusCode, ReferenceCode};
pub use request_key::RequestKey;
pub use revenue_code::RevenueCode;

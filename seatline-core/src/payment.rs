use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use seatline_shared::pii::Masked;

use crate::error::CoreResult;

/// An order opened with the payment provider for one ticket's fare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String, // Provider's ID (e.g., order_1a2b3c)
    pub amount_paise: i64,
    pub currency: String,
    pub receipt: String,
}

/// What the client hands back after paying: the provider's ids plus its signature.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentProof {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: Masked<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order for `amount_paise`. `receipt` is our reference (the pnr).
    async fn create_order(&self, amount_paise: i64, currency: &str, receipt: &str) -> CoreResult<GatewayOrder>;

    /// `Ok` iff the provider's signature over the proof is genuine; `PaymentRejected` otherwise.
    fn verify_signature(&self, proof: &PaymentProof) -> CoreResult<()>;
}

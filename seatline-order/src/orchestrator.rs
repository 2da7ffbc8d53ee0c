use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use seatline_core::payment::{GatewayOrder, PaymentGateway, PaymentProof};
use seatline_core::{CoreError, CoreResult};
use seatline_catalog::Fare;
use seatline_shared::Masked;
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Thin policy layer over the injected gateway.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Open a gateway order for a ticket's fare. Runs before any inventory is touched.
    pub async fn open_order(&self, pnr: &str, fare: &Fare) -> CoreResult<GatewayOrder> {
        let order = self
            .gateway
            .create_order(fare.amount_paise, &fare.currency, pnr)
            .await?;
        info!(pnr, order_id = %order.id, amount = order.amount_paise, "Gateway order created");
        Ok(order)
    }

    pub fn verify(&self, proof: &PaymentProof) -> CoreResult<()> {
        self.gateway.verify_signature(proof).map_err(|e| {
            warn!(order_id = %proof.gateway_order_id, error = %e, "Payment signature rejected");
            e
        })
    }
}

/// In-process stand-in for a Razorpay-style gateway.
///
/// Signatures are `hex(HMAC-SHA256(order_id + "|" + payment_id, key_secret))`.
pub struct MockPaymentGateway {
    key_id: String,
    key_secret: Masked<String>,
    available: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: Masked(key_secret.into()),
            available: AtomicBool::new(true),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Simulate a gateway outage for subsequent `create_order` calls.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> CoreResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.expose().as_bytes())
            .map_err(|e| CoreError::Gateway(e.to_string()))?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }

    /// The signature the client would receive after paying.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> CoreResult<String> {
        Ok(hex::encode(self.mac(order_id, payment_id)?.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(&self, amount_paise: i64, currency: &str, receipt: &str) -> CoreResult<GatewayOrder> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoreError::Gateway("payment gateway unavailable".to_string()));
        }
        let id = Uuid::new_v4().simple().to_string();
        Ok(GatewayOrder {
            id: format!("order_{}", &id[..14]),
            amount_paise,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        })
    }

    fn verify_signature(&self, proof: &PaymentProof) -> CoreResult<()> {
        let rejected = || CoreError::PaymentRejected(proof.gateway_order_id.clone());
        let provided = hex::decode(proof.gateway_signature.expose()).map_err(|_| rejected())?;
        self.mac(&proof.gateway_order_id, &proof.gateway_payment_id)?
            .verify_slice(&provided)
            .map_err(|_| rejected())
    }
}

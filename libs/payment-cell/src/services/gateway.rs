use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{GatewayOrder, PaymentError};

type HmacSha256 = Hmac<Sha256>;

/// Thin client for the payment gateway's order API. Only order creation and
/// signature verification are consumed; everything else the gateway offers
/// stays behind its own dashboard.
pub struct PaymentGatewayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl PaymentGatewayClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.payment_gateway_url.clone(),
            key_id: config.payment_gateway_key_id.clone(),
            key_secret: config.payment_gateway_key_secret.clone(),
        }
    }

    /// Create a gateway order for `amount` (major units; the gateway wants
    /// minor units).
    pub async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError> {
        let url = format!("{}/orders", self.base_url);
        debug!("Creating gateway order of {} {} at {}", amount, currency, url);

        let body = json!({
            "amount": (amount * 100.0).round() as i64,
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gateway order creation failed ({}): {}", status, error_text);
            return Err(PaymentError::Gateway(format!(
                "order creation failed with status {}",
                status
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))
    }

    /// Check the gateway's HMAC-SHA256 signature over `order_id|payment_id`.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, order_id, payment_id, signature)
    }
}

pub fn verify_payment_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let mut mac = match HmacSha256::new_from_slice(key_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };

    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());

    let expected: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();

    expected == signature.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    #[test]
    fn accepts_a_valid_signature() {
        let signature = sign("secret", "order_1", "pay_1");

        assert!(verify_payment_signature("secret", "order_1", "pay_1", &signature));
    }

    #[test]
    fn rejects_a_signature_for_a_different_payment() {
        let signature = sign("secret", "order_1", "pay_1");

        assert!(!verify_payment_signature("secret", "order_1", "pay_2", &signature));
    }

    #[test]
    fn rejects_a_signature_made_with_the_wrong_secret() {
        let signature = sign("other-secret", "order_1", "pay_1");

        assert!(!verify_payment_signature("secret", "order_1", "pay_1", &signature));
    }
}

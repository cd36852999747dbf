//! Settlement notifications to external observers.
//!
//! Delivery is fire-and-forget: observers learn about outcomes but a slow or
//! failing endpoint can never delay or change a settlement.

use std::time::Duration;

use serde::Serialize;
use x402::clock::{Clock, SystemClock};
use x402::hooks::{FacilitatorHook, SettleContext, SettleFailure};
use x402::{ErrorReason, SettleResponse, X402Error};

use crate::network;

/// Header carrying the HMAC of the webhook body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementWebhook {
    pub event: String,
    pub payer: String,
    pub amount: String,
    pub payment_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    pub network: String,
    pub timestamp: u64,
}

impl SettlementWebhook {
    fn from_context(ctx: &SettleContext<'_>, event: &str, network: &str) -> Self {
        let authorization = &ctx.payload.payload.authorization;
        Self {
            event: event.to_string(),
            payer: authorization.from.to_string(),
            amount: authorization.value.clone(),
            payment_hash: ctx.payment_hash.to_string(),
            transaction: None,
            error_reason: None,
            network: network.to_string(),
            timestamp: SystemClock.now(),
        }
    }
}

/// Require every webhook URL to be HTTPS and to point outside the local network.
/// Called at startup; a bad URL stops the facilitator from booting.
pub fn validate_webhook_urls(urls: &[String]) -> Result<(), X402Error> {
    for raw in urls {
        let url = url::Url::parse(raw)
            .map_err(|e| X402Error::ConfigError(format!("invalid webhook URL '{raw}': {e}")))?;
        if url.scheme() != "https" {
            return Err(X402Error::ConfigError(format!(
                "webhook URL '{raw}' must use https"
            )));
        }
        match url.host() {
            Some(host) if network::is_public_host(&host) => {}
            _ => {
                return Err(X402Error::ConfigError(format!(
                    "webhook URL '{raw}' targets a private or missing host"
                )))
            }
        }
    }
    Ok(())
}

/// HTTP client for webhook delivery. Redirects are not followed, so a public
/// endpoint cannot bounce a notification onto an internal address.
pub fn webhook_client() -> Result<reqwest::Client, X402Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| X402Error::ConfigError(format!("webhook client: {e}")))
}

/// Fire-and-forget POST to each webhook URL.
/// If `signing_key` is provided, includes an [`SIGNATURE_HEADER`] HMAC header.
pub fn fire_webhooks(
    client: &reqwest::Client,
    urls: &[String],
    webhook: &SettlementWebhook,
    signing_key: Option<&[u8]>,
) {
    let body_bytes = match serde_json::to_vec(webhook) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize webhook payload");
            return;
        }
    };

    let signature = match signing_key.map(|key| x402::hmac::sign_body(key, &body_bytes)) {
        Some(Ok(sig)) => Some(sig),
        Some(Err(e)) => {
            tracing::error!(error = %e, "failed to sign webhook payload");
            return;
        }
        None => None,
    };

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("no async runtime, webhook not delivered");
        return;
    };

    for url in urls {
        let client = client.clone();
        let url = url.clone();
        let body = body_bytes.clone();
        let signature = signature.clone();

        runtime.spawn(async move {
            let mut req = client.post(&url).header("content-type", "application/json");
            if let Some(ref sig) = signature {
                req = req.header(SIGNATURE_HEADER, sig.as_str());
            }

            match req.body(body).send().await {
                Ok(resp) => {
                    tracing::debug!(url = %url, status = %resp.status(), "webhook delivered")
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "webhook delivery failed"),
            }
        });
    }
}

/// Facilitator hook posting `settlement.success` and `settlement.failure` events.
pub struct WebhookHook {
    client: reqwest::Client,
    urls: Vec<String>,
    /// Domain-separated from the request HMAC secret.
    signing_key: Option<Vec<u8>>,
    network: String,
}

impl WebhookHook {
    pub fn new(client: reqwest::Client, urls: Vec<String>, network: impl Into<String>) -> Self {
        Self {
            client,
            urls,
            signing_key: None,
            network: network.into(),
        }
    }

    pub fn with_signing_key(mut self, key: Vec<u8>) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Derive the webhook signing key from the facilitator's shared secret.
    pub fn derive_signing_key(shared_secret: &[u8]) -> Result<Vec<u8>, X402Error> {
        x402::hmac::sign_body(shared_secret, b"x402-webhook-hmac").map(String::into_bytes)
    }

    fn send(&self, webhook: &SettlementWebhook) {
        fire_webhooks(
            &self.client,
            &self.urls,
            webhook,
            self.signing_key.as_deref(),
        );
    }
}

impl FacilitatorHook for WebhookHook {
    fn name(&self) -> &str {
        "webhook"
    }

    fn after_settle_success(&self, ctx: &SettleContext<'_>, result: &SettleResponse) {
        let mut webhook = SettlementWebhook::from_context(ctx, "settlement.success", &self.network);
        webhook.transaction = result.transaction.clone();
        self.send(&webhook);
    }

    fn after_settle_failure(&self, ctx: &SettleContext<'_>, failure: &SettleFailure<'_>) {
        // Ordering failures say nothing about the payment, only about the caller
        let reason = match failure {
            SettleFailure::Rejected(reason) if reason.is_ordering() => return,
            SettleFailure::Rejected(reason) => Some(*reason),
            SettleFailure::Error(_) => None,
        };
        let mut webhook = SettlementWebhook::from_context(ctx, "settlement.failure", &self.network);
        webhook.error_reason = reason;
        self.send(&webhook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_https_public_urls_accepted() {
        assert!(validate_webhook_urls(&urls(&[
            "https://hooks.example.com/x402",
            "https://93.184.216.34:8443/notify",
        ]))
        .is_ok());
    }

    #[test]
    fn test_plain_http_rejected() {
        assert!(validate_webhook_urls(&urls(&["http://hooks.example.com/x402"])).is_err());
    }

    #[test]
    fn test_private_targets_rejected() {
        for url in [
            "https://127.0.0.1/hook",
            "https://10.1.2.3/hook",
            "https://169.254.169.254/latest/meta-data",
            "https://localhost:9000/hook",
            "https://[::1]/hook",
        ] {
            assert!(validate_webhook_urls(&urls(&[url])).is_err(), "{url}");
        }
    }

    #[test]
    fn test_garbage_url_rejected() {
        assert!(validate_webhook_urls(&urls(&["not a url"])).is_err());
    }

    #[test]
    fn test_signing_key_is_domain_separated() {
        let key = WebhookHook::derive_signing_key(b"shared").unwrap();
        assert_ne!(key, b"shared".to_vec());
        assert_eq!(key, WebhookHook::derive_signing_key(b"shared").unwrap());
    }

    #[test]
    fn test_webhook_body_shape() {
        let webhook = SettlementWebhook {
            event: "settlement.failure".to_string(),
            payer: "0xabc".to_string(),
            amount: "1000".to_string(),
            payment_hash: "0x01".to_string(),
            transaction: None,
            error_reason: Some(ErrorReason::InsufficientBalance),
            network: "eip155:84532".to_string(),
            timestamp: 1,
        };
        let value = serde_json::to_value(&webhook).unwrap();
        assert_eq!(value["errorReason"], "insufficient_balance");
        assert_eq!(value["paymentHash"], "0x01");
        assert!(value.get("transaction").is_none());
    }
}

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use alloy::primitives::Address;
use serde::Deserialize;
use x402::hmac::AUTH_HEADER;
use x402::{PaymentPayload, PaymentRequirements, SchemeFacilitator, X402Error, X402_VERSION};

use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Validate the HMAC header on an incoming request.
/// HMAC authentication is always required; the secret must be set at startup.
/// Returns an error response if the signature is missing or invalid.
fn validate_hmac(
    req: &HttpRequest,
    body_bytes: &[u8],
    state: &AppState,
) -> Result<(), HttpResponse> {
    let header_value = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(sig) => {
            if x402::hmac::verify_body(&state.hmac_secret, body_bytes, sig) {
                Ok(())
            } else {
                tracing::warn!("HMAC verification failed: signature mismatch");
                metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
                Err(HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "authentication failed"
                })))
            }
        }
        None => {
            tracing::warn!("HMAC header missing on authenticated endpoint");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

/// Authenticate, then parse the shared `{paymentPayload, paymentRequirements}` body.
fn authenticated_request(
    req: &HttpRequest,
    body: &[u8],
    state: &AppState,
) -> Result<PaymentRequest, HttpResponse> {
    validate_hmac(req, body, state)?;
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected malformed request body");
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid request body",
            "detail": e.to_string(),
        }))
    })
}

/// Map an engine error onto a status. Malformed input is the caller's fault;
/// a timeout means the outcome is unknown, distinct from a definite failure.
fn error_response(e: &X402Error) -> HttpResponse {
    match e {
        X402Error::InvalidPayment(_) | X402Error::SerdeError(_) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid payment",
                "detail": e.to_string(),
            }))
        }
        X402Error::Timeout(_) => HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": "settlement outcome unknown",
            "retryable": true,
        })),
        X402Error::StoreError(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "store unavailable",
            "retryable": true,
        })),
        _ => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "ledger unavailable",
        })),
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "x402-settle-facilitator",
        "network": &state.chain_config().network,
        "pendingVerifications": state.facilitator.pending_verifications(),
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    // Use separate METRICS_TOKEN for metrics auth (not the HMAC shared secret).
    match &state.metrics_token {
        Some(token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            let expected = String::from_utf8_lossy(token);

            if !x402::security::bearer_matches(header, &expected) {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            // No token configured: metrics stay closed unless explicitly made public.
            if !state.public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }

    let pending = i64::try_from(state.facilitator.pending_verifications()).unwrap_or(i64::MAX);
    metrics::PENDING_VERIFICATIONS.set(pending);

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[get("/supported")]
pub async fn supported(state: web::Data<AppState>) -> HttpResponse {
    let config = state.chain_config();
    let kinds: Vec<serde_json::Value> = state
        .facilitator
        .signers()
        .get(&config.scheme_name)
        .filter(|signer| signer.family() == config.namespace())
        .map(|_| {
            serde_json::json!({
                "x402Version": X402_VERSION,
                "scheme": &config.scheme_name,
                "network": &config.network,
            })
        })
        .into_iter()
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "kinds": kinds,
        "asset": config.ledger_address,
        "assetName": &config.asset_name,
        "decimals": config.asset_decimals,
    }))
}

/// HMAC-gated like `/verify`. A GET has no body, so the signature covers the path.
#[get("/balance/{address}")]
pub async fn balance(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, req.path().as_bytes(), &state) {
        return resp;
    }

    let Ok(address) = path.parse::<Address>() else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid address",
        }));
    };

    HttpResponse::Ok().json(serde_json::json!({
        "address": address,
        "balance": state.ledger().balance(address).to_string(),
        "asset": state.chain_config().ledger_address,
    }))
}

#[post("/verify")]
pub async fn verify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed = match authenticated_request(&req, &body, &state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state
        .facilitator
        .verify(&parsed.payment_requirements, &parsed.payment_payload)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            tracing::error!(error = %e, "verification error");
            error_response(&e)
        }
    }
}

#[post("/settle")]
pub async fn settle(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed = match authenticated_request(&req, &body, &state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let start = std::time::Instant::now();
    let outcome = state
        .facilitator
        .settle(&parsed.payment_requirements, &parsed.payment_payload)
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(result) => {
            let label = if result.success { "success" } else { "rejected" };
            metrics::SETTLE_LATENCY
                .with_label_values(&[label])
                .observe(elapsed);
            if result.success {
                tracing::info!(
                    payer = ?result.payer,
                    tx = ?result.transaction,
                    "settlement completed"
                );
            } else {
                tracing::warn!(
                    payer = ?result.payer,
                    reason = ?result.error_reason,
                    "settlement rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::SETTLE_LATENCY
                .with_label_values(&["error"])
                .observe(elapsed);
            tracing::error!(error = %e, "settlement error");
            error_response(&e)
        }
    }
}

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::LazyLock;

use x402::hooks::{FacilitatorHook, SettleContext, SettleFailure, VerifyContext};
use x402::{SettleResponse, VerifyResponse};

pub static VERIFY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_verify_total",
        "Total verification requests",
        &["result"]
    )
    .unwrap()
});

pub static SETTLE_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_settle_total",
        "Total settlement requests",
        &["result"]
    )
    .unwrap()
});

/// Structured rejections by reason, for both verify and settle.
pub static REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_rejections_total",
        "Structured verify/settle rejections",
        &["stage", "reason"]
    )
    .unwrap()
});

pub static SETTLE_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "x402_facilitator_settle_duration_seconds",
        "Settlement latency in seconds",
        &["result"],
        vec![0.001, 0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap()
});

pub static HMAC_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_hmac_failures_total",
        "HMAC authentication failures",
        &["reason"]
    )
    .unwrap()
});

pub static PENDING_VERIFICATIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "x402_facilitator_pending_verifications",
        "Verified payloads awaiting settlement"
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Counts facilitator outcomes. Infrastructure errors on verify never reach
/// hooks; routes count those directly.
pub struct MetricsHook;

impl FacilitatorHook for MetricsHook {
    fn name(&self) -> &str {
        "metrics"
    }

    fn after_verify(&self, _ctx: &VerifyContext<'_>, result: &VerifyResponse) {
        match result.invalid_reason {
            None => VERIFY_REQUESTS.with_label_values(&["valid"]).inc(),
            Some(reason) => {
                VERIFY_REQUESTS.with_label_values(&["invalid"]).inc();
                REJECTIONS
                    .with_label_values(&["verify", reason.code()])
                    .inc();
            }
        }
    }

    fn after_settle_success(&self, _ctx: &SettleContext<'_>, _result: &SettleResponse) {
        SETTLE_REQUESTS.with_label_values(&["success"]).inc();
    }

    fn after_settle_failure(&self, _ctx: &SettleContext<'_>, failure: &SettleFailure<'_>) {
        match failure {
            SettleFailure::Rejected(reason) => {
                SETTLE_REQUESTS.with_label_values(&["rejected"]).inc();
                REJECTIONS
                    .with_label_values(&["settle", reason.code()])
                    .inc();
            }
            SettleFailure::Error(_) => SETTLE_REQUESTS.with_label_values(&["error"]).inc(),
        }
    }
}

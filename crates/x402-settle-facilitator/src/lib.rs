//! x402 facilitator server: verifies EIP-712 payment authorizations and settles
//! them on an in-process ledger.
//!
//! Resource servers call it with HMAC-authenticated requests. The verify → settle
//! lifecycle lives in the core [`x402`] crate; this crate provides the HTTP
//! server, configuration, state assembly and the observer hooks.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (health, supported, verify, settle, balance, metrics)
//! - [`config`]: environment-driven [`FacilitatorConfig`](config::FacilitatorConfig)
//! - [`bootstrap`]: builds the shared [`AppState`](state::AppState) from a config
//! - [`webhook`]: SSRF-checked settlement notifications
//! - [`metrics`]: Prometheus metrics and the hook that feeds them

pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod network;
pub mod routes;
pub mod state;
pub mod webhook;

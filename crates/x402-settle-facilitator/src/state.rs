use std::sync::Arc;

use x402::ledger::InMemoryLedger;
use x402::{ChainConfig, Facilitator};

/// The settlement engine the server runs: an in-process ledger shared by handle.
pub type SettlementEngine = Facilitator<Arc<InMemoryLedger>>;

/// Shared application state for the facilitator server.
pub struct AppState {
    pub facilitator: SettlementEngine,
    /// HMAC shared secret for authenticating /verify and /settle requests.
    /// Mandatory: the facilitator will not start without it.
    pub hmac_secret: Vec<u8>,
    /// Separate bearer token for /metrics endpoint (not the HMAC secret).
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured.
    pub public_metrics: bool,
}

impl AppState {
    pub fn new(facilitator: SettlementEngine, hmac_secret: Vec<u8>) -> Self {
        Self {
            facilitator,
            hmac_secret,
            metrics_token: None,
            public_metrics: false,
        }
    }

    pub fn with_metrics_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.metrics_token = token;
        self
    }

    pub fn with_public_metrics(mut self, public: bool) -> Self {
        self.public_metrics = public;
        self
    }

    pub fn chain_config(&self) -> &ChainConfig {
        self.facilitator.config()
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        self.facilitator.ledger()
    }
}

pub mod circuit {
    pub mod registry;
    pub mod state;
}
pub mod config;
pub mod crypto {
    pub mod tracker;
    pub mod transitions;
}
pub mod domain {
    pub mod crypto;
    pub mod event;
    pub mod payment;
}
pub mod fallback {
    pub mod coordinator;
    pub mod retry;
}
pub mod http {
    pub mod handlers {
        pub mod checkout;
        pub mod crypto_status;
        pub mod ops;
        pub mod webhooks;
    }
}
pub mod ledger;
pub mod notify;
pub mod providers;
pub mod webhook {
    pub mod gateway;
}

use std::sync::Arc;

use circuit::registry::HealthRegistry;
use fallback::coordinator::FallbackCoordinator;
use ledger::PaymentLedger;
use webhook::gateway::WebhookGateway;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<FallbackCoordinator>,
    pub webhook_gateway: Arc<WebhookGateway>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub health: Arc<HealthRegistry>,
}

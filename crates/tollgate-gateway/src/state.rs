//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use tollgate_auth::{TokenService, TokenValidator};
use tollgate_broker::NotificationBroker;
use tollgate_store::RocksStreamStore;

use crate::config::GatewayConfig;
use crate::hub::ConnectionHub;
use crate::pipeline::AuthGate;
use crate::rate_limit::RateLimiter;

/// The broker type the gateway runs against.
pub type Broker = NotificationBroker<RocksStreamStore>;

/// Shared application state for the gateway.
///
/// Every component is constructed once at startup and shared by reference;
/// nothing here is global.
pub struct GatewayState {
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Credential issuance and validation.
    pub tokens: Arc<TokenService>,
    /// Authentication for inbound calls and socket handshakes.
    pub auth_gate: Arc<AuthGate>,
    /// Per-caller admission control.
    pub limiter: Arc<RateLimiter>,
    /// Live client connections.
    pub hub: Arc<ConnectionHub>,
    /// Notification producer/consumer API.
    pub broker: Arc<Broker>,
}

impl GatewayState {
    /// Build the state, constructing the gate, limiter and hub from `config`.
    #[must_use]
    pub fn new(config: GatewayConfig, tokens: Arc<TokenService>, broker: Arc<Broker>) -> Self {
        let validator: Arc<dyn TokenValidator> = Arc::clone(&tokens) as Arc<dyn TokenValidator>;
        let auth_gate = Arc::new(AuthGate::new(validator, &config.auth_exempt_methods));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let hub = Arc::new(ConnectionHub::new(config.hub.clone()));

        Self {
            config,
            tokens,
            auth_gate,
            limiter,
            hub,
            broker,
        }
    }
}

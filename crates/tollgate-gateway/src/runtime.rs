//! Gateway lifecycle.
//!
//! [`Gateway`] owns every long-lived component and background task. It is
//! the only place they are constructed.

use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tollgate_auth::{AuthError, TokenService};
use tollgate_broker::{BrokerError, DeliveryConsumer, NotificationBroker};
use tollgate_store::{RocksStreamStore, StoreError};

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::GatewayState;

/// Errors that prevent the gateway from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The credential service rejected its configuration.
    #[error("credential service: {0}")]
    Auth(#[from] AuthError),

    /// The stream store could not be opened.
    #[error("stream store: {0}")]
    Store(#[from] StoreError),

    /// The notification consumer group could not be created.
    #[error("notification broker: {0}")]
    Broker(#[from] BrokerError),
}

/// A running gateway: shared state plus its background tasks.
pub struct Gateway {
    state: Arc<GatewayState>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Construct every component and spawn the bucket sweeper and the
    /// delivery consumer.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StartupError` if the signing key is misconfigured or the
    /// store cannot be opened.
    pub fn start(config: GatewayConfig) -> Result<Self, StartupError> {
        let tokens = Arc::new(TokenService::new(&config.token)?);

        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        let store = Arc::new(RocksStreamStore::open(&config.data_dir)?);
        let broker = Arc::new(NotificationBroker::new(store));

        let consumer_config = config.consumer.clone();
        broker.ensure_group(
            &consumer_config.stream,
            &consumer_config.group,
            consumer_config.start,
        )?;

        let state = Arc::new(GatewayState::new(config, tokens, broker));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let sweeper = tokio::spawn(Arc::clone(&state.limiter).run_sweeper(
            state.config.rate_limit.sweep_interval(),
            shutdown_rx.clone(),
        ));

        let consumer = DeliveryConsumer::new(
            Arc::clone(&state.broker),
            Arc::clone(&state.hub),
            consumer_config,
        );
        let consumer = tokio::spawn(async move {
            if let Err(e) = consumer.run(shutdown_rx).await {
                tracing::error!(error = %e, "Delivery consumer failed");
            }
        });

        tracing::info!("Gateway started");
        Ok(Self {
            state,
            shutdown,
            tasks: vec![sweeper, consumer],
        })
    }

    /// The shared state.
    #[must_use]
    pub const fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// The HTTP/WebSocket router over this gateway's state.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Stop the background tasks and close every connection.
    ///
    /// The consumer finishes the batch it holds before it exits, so that
    /// batch still reaches live sockets.
    pub async fn shutdown(self) {
        // Receivers live inside the tasks; a send error means they already exited.
        let _ = self.shutdown.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        let closed = self.state.hub.close_all();
        tracing::info!(closed, "Gateway stopped");
    }
}

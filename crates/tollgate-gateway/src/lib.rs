//! HTTP and WebSocket gateway for tollgate.
//!
//! This crate is the public edge of the control plane. It handles:
//!
//! - Per-call authentication, rate limiting and outcome logging
//! - The built-in `WhoAmI` and `Publish` RPCs
//! - Live notification sockets with multi-device fan-out
//! - The delivery consumer bridging the notification stream to sockets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                   (HTTP / WebSocket)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    tollgate-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │ RequestLog  │▶│ RateLimiter │▶│ AuthGate ▶ handler  │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! │  ┌─────────────────────┐      ┌────────────────────────┐    │
//! │  │  ConnectionHub      │◀─────│  DeliveryConsumer      │    │
//! │  └─────────────────────┘      └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Token   │   │  Notif.  │   │  Stream  │
//!        │ Service  │   │  Broker  │   │  Store   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tollgate_gateway::{Gateway, GatewayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let gateway = Gateway::start(config)?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, gateway.router()).await?;
//!
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod pipeline;
pub mod rate_limit;
pub mod routes;
pub mod runtime;
pub mod state;

pub use config::{ConfigError, GatewayConfig};
pub use error::{ApiError, Code};
pub use hub::{ConnectionHub, HubStats};
pub use pipeline::{AuthGate, CallScope};
pub use rate_limit::RateLimiter;
pub use routes::create_router;
pub use runtime::{Gateway, StartupError};
pub use state::GatewayState;

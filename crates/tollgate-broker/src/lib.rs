//! Notification broker for tollgate.
//!
//! This crate moves notifications from producers to connected clients over a
//! durable stream with consumer groups. Producers append; a long-lived
//! [`DeliveryConsumer`] reads through a group, delivers each notification to
//! a [`NotificationSink`] (the gateway's connection hub), and acknowledges it.
//!
//! # Architecture
//!
//! ```text
//!  producers ──publish──▶ ┌──────────────────────┐
//!                         │  NotificationBroker  │◀── read (blocking)
//!                         │  (Notify on append)  │◀── ack / reclaim_idle
//!                         └──────────┬───────────┘
//!                                    │
//!                         ┌──────────▼───────────┐      ┌──────────────────┐
//!                         │    StreamStore       │      │ DeliveryConsumer │
//!                         │    (RocksDB)         │      │  ──▶ sink        │
//!                         └──────────────────────┘      └──────────────────┘
//! ```
//!
//! Delivery is at-least-once: an entry stays pending until acknowledged, and
//! the consumer's pending scan re-delivers entries left idle by a crashed
//! consumer. A notification for a user with no live connection is delivered
//! to nobody and still acknowledged.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_broker::{NotificationBroker, Target};
//! use tollgate_core::UserId;
//! use tollgate_store::{Fields, RocksStreamStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStreamStore::open("/tmp/tollgate")?);
//! let broker = NotificationBroker::new(store);
//!
//! let user: UserId = "U1".parse()?;
//! let data = Fields::from([("task_id".to_string(), "T1".to_string())]);
//! broker.publish_notification("notifications", &Target::User(user), "task_assigned", data)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod broker;
pub mod consumer;
pub mod error;
pub mod notification;

pub use broker::NotificationBroker;
pub use consumer::{ConsumerConfig, DeliveryConsumer};
pub use error::{BrokerError, Result};
pub use notification::{Notification, NotificationSink, Target};

// Re-export commonly used types from dependencies for convenience
pub use tollgate_store::{ClaimedEntry, Fields, GroupStart, PendingEntry, StreamEntry};

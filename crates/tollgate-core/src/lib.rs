//! Core types for tollgate.
//!
//! This crate provides the strongly-typed identifiers shared by every other
//! tollgate crate:
//!
//! - [`UserId`] and [`OrgId`]: identities carried in signed credentials
//! - [`ConnectionId`]: one live client socket in the connection hub
//! - [`EntryId`]: broker-assigned, monotonically ordered stream entry ids
//!
//! # Example
//!
//! ```
//! use tollgate_core::{EntryId, UserId};
//!
//! let user_id: UserId = "user-42".parse().unwrap();
//! assert_eq!(user_id.as_str(), "user-42");
//!
//! let id: EntryId = "1700000000000-3".parse().unwrap();
//! assert!(id < id.next());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{ConnectionId, EntryId, IdError, OrgId, UserId};

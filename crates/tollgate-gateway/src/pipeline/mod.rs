//! The per-call interceptor pipeline.
//!
//! Every RPC route is wrapped, outermost first, in:
//!
//! ```text
//! request_log ──▶ rate_limit ──▶ auth_gate ──▶ handler
//! ```
//!
//! Only `rate_limit` and `auth_gate` may short-circuit a call; `request_log`
//! always runs and passes the response through untouched.

pub mod auth_gate;
pub mod rate_limit;
pub mod request_log;

pub use auth_gate::{auth_gate, bearer_token, query_token, AuthGate, CallScope};
pub use rate_limit::rate_limit;
pub use request_log::{request_log, CallRecord};

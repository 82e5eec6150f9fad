//! Per-call outcome recorder.
//!
//! Emits one structured record and one latency sample per call. The
//! response passes through untouched.

use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{CallOutcome, Code};
use crate::pipeline::auth_gate::CallScope;

/// The outcome code and error message a response carries.
///
/// Responses built from an [`ApiError`](crate::ApiError) carry their outcome;
/// anything else is classified by status.
#[must_use]
pub fn outcome(response: &Response) -> (Code, Option<&str>) {
    response.extensions().get::<CallOutcome>().map_or_else(
        || (Code::from_status(response.status()), None),
        |outcome| (outcome.code, Some(outcome.message.as_str())),
    )
}

/// The structured record emitted for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Full method path.
    pub method: String,
    /// Authenticated subject, if the auth gate admitted the call.
    pub subject: Option<String>,
    /// Outcome code.
    pub code: Code,
    /// Error message of a failed call.
    pub error: Option<String>,
}

impl CallRecord {
    /// Build the record for `method` from the response it produced.
    #[must_use]
    pub fn new(method: String, response: &Response) -> Self {
        let subject = response
            .extensions()
            .get::<CallScope>()
            .map(|scope| scope.subject.to_string());
        let (code, error) = outcome(response);
        Self {
            method,
            subject,
            code,
            error: error.map(ToOwned::to_owned),
        }
    }

    /// The subject as logged; `-` when there is none.
    #[must_use]
    pub fn subject_or_dash(&self) -> &str {
        self.subject.as_deref().unwrap_or("-")
    }

    fn emit(self, elapsed: Duration) {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let error = self.error.as_deref().unwrap_or_default();

        match self.code {
            Code::Internal | Code::Unavailable => tracing::error!(
                method = %self.method,
                subject = self.subject_or_dash(),
                duration_ms,
                code = self.code.as_str(),
                error,
                "rpc"
            ),
            _ => tracing::info!(
                method = %self.method,
                subject = self.subject_or_dash(),
                duration_ms,
                code = self.code.as_str(),
                error,
                "rpc"
            ),
        }

        metrics::counter!(
            "tollgate_rpc_requests_total",
            "method" => self.method.clone(),
            "code" => self.code.as_str()
        )
        .increment(1);
        metrics::histogram!("tollgate_rpc_duration_seconds", "method" => self.method)
            .record(elapsed.as_secs_f64());
    }
}

/// Middleware recording every call.
pub async fn request_log(request: Request, next: Next) -> Response {
    let method = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    CallRecord::new(method, &response).emit(start.elapsed());
    response
}

//! Live notification socket.
//!
//! The handshake is authenticated once, through the same gate as unary
//! calls; afterwards the connection is tracked by the hub until either side
//! closes it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use tollgate_auth::AuthError;

use crate::error::ApiError;
use crate::hub::{Connection, ConnectionHub, OutboundMessage};
use crate::pipeline::{bearer_token, query_token, CallScope};
use crate::state::GatewayState;

/// A socket together with the scope it was authenticated under.
///
/// All I/O is delegated to the wrapped socket.
#[derive(Debug)]
pub struct ScopedSocket<S> {
    inner: S,
    scope: CallScope,
}

impl<S> ScopedSocket<S> {
    /// Wrap `inner`.
    #[must_use]
    pub const fn new(inner: S, scope: CallScope) -> Self {
        Self { inner, scope }
    }

    /// The caller's scope.
    #[must_use]
    pub const fn scope(&self) -> &CallScope {
        &self.scope
    }
}

impl<S: Stream + Unpin> Stream for ScopedSocket<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S, M> Sink<M> for ScopedSocket<S>
where
    S: Sink<M> + Unpin,
{
    type Error = S::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: M) -> Result<(), Self::Error> {
        Pin::new(&mut self.get_mut().inner).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_close(cx)
    }
}

/// `GET /ws`: upgrade to a notification socket.
///
/// The credential is read from the `authorization` header or, for clients
/// that cannot set headers, the `token` query parameter.
///
/// # Errors
///
/// Returns `Unauthenticated` if no valid access credential is presented.
/// The credential is checked before the upgrade request itself.
pub async fn websocket_handler(
    State(state): State<Arc<GatewayState>>,
    uri: Uri,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .map(str::to_owned)
        .or_else(|| query_token(&uri));

    let scope = state
        .auth_gate
        .authorize(uri.path(), token.as_deref())?
        .ok_or_else(|| ApiError::Unauthenticated(AuthError::MissingCredential.to_string()))?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    tracing::info!(user_id = %scope.subject, "WebSocket connection initiated");

    let hub = Arc::clone(&state.hub);
    let connection_scope = scope.clone();
    let mut response = ws.on_upgrade(move |socket| {
        serve_connection(ScopedSocket::new(socket, connection_scope), hub)
    });
    response.extensions_mut().insert(scope);
    Ok(response)
}

/// Track a socket in the hub until it closes.
async fn serve_connection(socket: ScopedSocket<WebSocket>, hub: Arc<ConnectionHub>) {
    let user_id = socket.scope().subject.clone();
    let (connection, outbound) = Connection::channel(hub.buffer());
    let connection_id = hub.register(&user_id, connection);

    let (write, read) = socket.split();

    tokio::select! {
        () = forward_outbound(outbound, write) => {
            tracing::debug!(user_id = %user_id, connection_id = %connection_id, "Outbound queue closed");
        }
        () = drain_inbound(read) => {
            tracing::debug!(user_id = %user_id, connection_id = %connection_id, "Client closed connection");
        }
    }

    hub.unregister(&user_id, &connection_id);
}

/// Write queued messages until the hub drops the queue or a write fails.
async fn forward_outbound<W>(mut outbound: mpsc::Receiver<OutboundMessage>, mut write: W)
where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = write.send(Message::Text(message.to_string())).await {
            tracing::debug!(error = %e, "Failed to write to client");
            return;
        }
    }
    let _ = write.send(Message::Close(None)).await;
}

/// Read until the client closes; clients have nothing to send.
async fn drain_inbound<R, E>(mut read: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Error reading from client");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tollgate_core::UserId;

    fn scope() -> CallScope {
        CallScope {
            subject: UserId::new("U1").unwrap(),
            email: String::new(),
            role: "member".to_string(),
            org_id: None,
        }
    }

    #[tokio::test]
    async fn scoped_socket_delegates_stream() {
        let socket = ScopedSocket::new(stream::iter(vec![1, 2, 3]), scope());
        assert_eq!(socket.scope().subject.as_str(), "U1");
        let items: Vec<i32> = socket.collect().await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn scoped_socket_delegates_sink() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<&str>();
        let mut socket = ScopedSocket::new(tx, scope());
        socket.send("hello").await.unwrap();
        drop(socket);
        assert_eq!(rx.next().await, Some("hello"));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn outbound_writes_text_then_close() {
        let (tx, outbound) = mpsc::channel::<OutboundMessage>(4);
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();

        tx.send(Arc::from("{\"id\":\"1-0\"}")).await.unwrap();
        drop(tx);
        forward_outbound(outbound, sink).await;

        match written.next().await {
            Some(Message::Text(text)) => assert_eq!(text, "{\"id\":\"1-0\"}"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(written.next().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn inbound_stops_at_close() {
        let messages: Vec<Result<Message, std::io::Error>> = vec![
            Ok(Message::Text("ignored".to_string())),
            Ok(Message::Close(None)),
            Ok(Message::Text("never read".to_string())),
        ];
        let mut read = stream::iter(messages);
        drain_inbound(&mut read).await;
        assert!(matches!(read.next().await, Some(Ok(Message::Text(t))) if t == "never read"));
    }
}

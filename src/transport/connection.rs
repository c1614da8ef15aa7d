//! Live WebSocket connection for one room.
//!
//! The connection spawns a tokio task that reads frames and hands each text
//! frame to the room's handler, one at a time and in arrival order.
//!
//! # Event Loop
//!
//! The task handles:
//!
//! - Incoming text frames (passed to the [`FrameHandler`])
//! - Close frames and stream errors (terminate the loop)
//! - Shutdown requests from the owning room

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tracing::{debug, error, trace};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Frame handler callback type.
///
/// Called with the text of every frame received on the socket.
pub type FrameHandler = Box<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Close the socket and stop reading.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to a live room socket.
///
/// Dropping every handle stops the event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Set once the event loop has exited.
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Opens a socket to `url`, sending `origin` as the `Origin` header.
    ///
    /// Returns once the WebSocket handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::WebSocket`] if the URL is invalid or the
    /// handshake fails.
    pub async fn connect(url: &str, origin: &str, handler: FrameHandler) -> Result<Self> {
        let mut request = url.into_client_request()?;

        if let Ok(value) = HeaderValue::from_str(origin) {
            request.headers_mut().insert(ORIGIN, value);
        }

        let (ws_stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(status = response.status().as_u16(), "WebSocket connected");

        Ok(Self::from_stream(ws_stream, handler))
    }

    /// Wraps an established stream and spawns the event loop.
    pub(crate) fn from_stream<S>(ws_stream: WebSocketStream<S>, handler: FrameHandler) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            handler,
            Arc::clone(&closed),
        ));

        Self { command_tx, closed }
    }

    /// Returns `true` once the socket is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the socket.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        handler: FrameHandler,
        closed: Arc<AtomicBool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(bytes = text.len(), "Frame received");
                            handler(text.as_str());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("All connection handles dropped");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::Release);
        debug!("Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    #[tokio::test]
    async fn test_frames_delivered_in_order_with_origin() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut origin = None;
            let mut ws = accept_hdr_async(stream, |request: &Request, response: Response| {
                origin = request
                    .headers()
                    .get("origin")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                Ok(response)
            })
            .await
            .expect("upgrade");

            for frame in ["one", "two", "three"] {
                ws.send(Message::Text(frame.to_string().into()))
                    .await
                    .expect("send");
            }
            let _ = ws.close(None).await;
            origin
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::connect(
            &format!("ws://127.0.0.1:{port}/events?l=1"),
            "https://chat.example.com",
            Box::new(move |text| {
                let _ = tx.send(text.to_string());
            }),
        )
        .await
        .expect("connect");

        let mut received = Vec::new();
        for _ in 0..3 {
            let frame = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("frame in time")
                .expect("frame");
            received.push(frame);
        }
        assert_eq!(received, ["one", "two", "three"]);

        let origin = server.await.expect("server");
        assert_eq!(origin.as_deref(), Some("https://chat.example.com"));

        timeout(Duration::from_secs(5), async {
            while !connection.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("closed after remote close");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let result = Connection::connect(
            &format!("ws://127.0.0.1:{port}/"),
            "https://chat.example.com",
            Box::new(|_| {}),
        )
        .await;

        assert!(matches!(result, Err(crate::Error::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_shutdown_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connection = Connection::connect(
            &format!("ws://127.0.0.1:{port}/"),
            "https://chat.example.com",
            Box::new(|_| {}),
        )
        .await
        .expect("connect");

        assert!(!connection.is_closed());
        connection.shutdown();

        timeout(Duration::from_secs(5), async {
            while !connection.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("closed after shutdown");
    }
}

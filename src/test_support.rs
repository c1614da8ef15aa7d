//! Scripted HTTP responses and a local socket server for unit tests.

use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use crate::error::{Error, Result};
use crate::transport::{Fetch, HttpResponse, RequestOptions};

/// A request seen by [`ScriptedFetch`].
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub url: String,
    pub options: RequestOptions,
    pub at: Instant,
}

impl Call {
    /// Returns the value of a payload field.
    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.options
            .payload
            .as_ref()?
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Answers requests from per-route response scripts.
///
/// The first route whose pattern occurs in the URL answers. Each route pops
/// its responses in order and repeats the last one. Unmatched URLs get the
/// fallback, or a connection error when there is none.
#[derive(Default)]
pub(crate) struct ScriptedFetch {
    routes: Mutex<Vec<(String, VecDeque<HttpResponse>)>>,
    fallback: Option<HttpResponse>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route<I>(self, pattern: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = HttpResponse>,
    {
        self.routes
            .lock()
            .push((pattern.to_string(), responses.into_iter().collect()));
        self
    }

    pub(crate) fn fallback(mut self, response: HttpResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_to(&self, pattern: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.url.contains(pattern))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.calls.lock().push(Call {
            url: url.to_string(),
            options,
            at: Instant::now(),
        });

        let scripted = self
            .routes
            .lock()
            .iter_mut()
            .find(|(pattern, responses)| url.contains(pattern.as_str()) && !responses.is_empty())
            .and_then(|(_, responses)| {
                if responses.len() > 1 {
                    responses.pop_front()
                } else {
                    responses.front().cloned()
                }
            });

        scripted
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                Error::Io(IoError::new(
                    ErrorKind::ConnectionRefused,
                    format!("no scripted response for {url}"),
                ))
            })
    }
}

/// Handshake details seen by [`WsServer`].
#[derive(Debug, Clone)]
pub(crate) struct Upgrade {
    pub uri: String,
    pub origin: Option<String>,
}

/// Local WebSocket endpoint that pushes frames to every open socket.
pub(crate) struct WsServer {
    /// `ws://` URL of the endpoint.
    pub url: String,
    upgrades: Arc<Mutex<Vec<Upgrade>>>,
    frames: broadcast::Sender<String>,
}

impl WsServer {
    /// Binds to an ephemeral port and starts accepting.
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let upgrades = Arc::new(Mutex::new(Vec::new()));
        let (frames, _) = broadcast::channel::<String>(64);

        let seen = Arc::clone(&upgrades);
        let sender = frames.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let mut outgoing = sender.subscribe();
                tokio::spawn(async move {
                    let callback = |request: &Request, response: Response| {
                        seen.lock().push(Upgrade {
                            uri: request.uri().to_string(),
                            origin: request
                                .headers()
                                .get("origin")
                                .and_then(|value| value.to_str().ok())
                                .map(str::to_string),
                        });
                        Ok(response)
                    };
                    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                        return;
                    };

                    loop {
                        tokio::select! {
                            frame = outgoing.recv() => match frame {
                                Ok(frame) => {
                                    if ws.send(Message::Text(frame.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                            incoming = ws.next() => match incoming {
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{port}/events"),
            upgrades,
            frames,
        }
    }

    /// Sends `frame` to every open socket.
    pub(crate) fn push(&self, frame: impl Into<String>) {
        let _ = self.frames.send(frame.into());
    }

    /// Returns the handshakes seen so far.
    pub(crate) fn upgrades(&self) -> Vec<Upgrade> {
        self.upgrades.lock().clone()
    }

    /// Returns the `ws-auth` response pointing at this server.
    pub(crate) fn auth_response(&self) -> HttpResponse {
        HttpResponse::new(200, serde_json::json!({ "url": self.url }).to_string())
    }
}

/// Polls `condition` until it holds, failing after five seconds.
pub(crate) async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

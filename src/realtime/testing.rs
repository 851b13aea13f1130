//! Loopback WebSocket server for exercising the realtime engine in tests
//!
//! Accepts any path, replies to authenticate frames per the configured
//! plan, records every text frame it receives, and lets tests push
//! messages or close frames into the most recent connection.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How the server answers authenticate frames
pub(crate) enum AuthReply {
    Success { channels: Vec<String> },
    Failure { message: String },
    /// Reject the first N authenticates on each connection, then accept
    FailThenSucceed { failures: u32, channels: Vec<String> },
}

pub(crate) struct ServerPlan {
    pub auth: AuthReply,
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicU32>,
    push: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl TestServer {
    pub async fn spawn(plan: ServerPlan) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");

        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicU32::new(0));
        let push: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>> = Arc::new(Mutex::new(None));
        let plan = Arc::new(plan);

        {
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);
            let push = Arc::clone(&push);
            tokio::spawn(async move {
                loop {
                    let (stream, _) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(_) => break,
                    };
                    connections.fetch_add(1, Ordering::SeqCst);

                    let ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => continue,
                    };

                    let (push_tx, push_rx) = mpsc::unbounded_channel();
                    *push.lock() = Some(push_tx);

                    tokio::spawn(handle_connection(
                        ws,
                        push_rx,
                        Arc::clone(&received),
                        Arc::clone(&plan),
                    ));
                }
            });
        }

        Self {
            addr,
            received,
            connections,
            push,
        }
    }

    /// Portal base URL pointing at this server
    pub fn portal_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every text frame received, across all connections, in order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Number of sockets accepted so far
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Push a text frame into the most recent connection
    pub fn push_text(&self, text: &str) {
        if let Some(tx) = self.push.lock().as_ref() {
            let _ = tx.send(Message::Text(text.to_string()));
        }
    }

    /// Close the most recent connection with the given code
    pub fn push_close(&self, code: u16) {
        if let Some(tx) = self.push.lock().as_ref() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "test close".into(),
            };
            let _ = tx.send(Message::Close(Some(frame)));
        }
    }
}

async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut push_rx: mpsc::UnboundedReceiver<Message>,
    received: Arc<Mutex<Vec<String>>>,
    plan: Arc<ServerPlan>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut auth_failures_sent = 0u32;

    loop {
        tokio::select! {
            pushed = push_rx.recv() => match pushed {
                Some(message) => {
                    let closing = matches!(message, Message::Close(_));
                    if sink.send(message).await.is_err() || closing {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    received.lock().push(text.clone());

                    let value: serde_json::Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    if value.get("type").and_then(serde_json::Value::as_str)
                        == Some("authenticate")
                    {
                        let reply = match &plan.auth {
                            AuthReply::Success { channels } => auth_success(channels),
                            AuthReply::Failure { message } => auth_failure(message),
                            AuthReply::FailThenSucceed { failures, channels } => {
                                if auth_failures_sent < *failures {
                                    auth_failures_sent += 1;
                                    auth_failure("transient rejection")
                                } else {
                                    auth_success(channels)
                                }
                            }
                        };
                        if sink.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    }
}

fn auth_success(channels: &[String]) -> String {
    serde_json::json!({
        "type": "auth_response",
        "status": "success",
        "message": "authenticated",
        "available_channels": channels,
    })
    .to_string()
}

fn auth_failure(message: &str) -> String {
    serde_json::json!({
        "type": "auth_response",
        "status": "failure",
        "message": message,
    })
    .to_string()
}

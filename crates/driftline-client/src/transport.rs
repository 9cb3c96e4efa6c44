//! WebSocket transport for the client.
//!
//! Provides [`ConnectedSession`] which handles WebSocket I/O for frame
//! transport. This is a thin layer that just sends/receives frames -
//! protocol logic remains in the sans-IO [`crate::SyncClient`].

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use driftline_proto::{Destination, Topic};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Frame could not be encoded or parsed.
    #[error("framing error: {0}")]
    Framing(String),
}

/// An inbound text frame: topic path plus raw JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InboundEnvelope {
    topic: String,
    body: String,
}

/// An outbound text frame: destination path plus raw JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutboundEnvelope {
    destination: String,
    body: String,
}

/// A payload received from the server.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Topic path the payload arrived on.
    pub topic: String,
    /// Raw JSON body, fed to the engine as-is.
    pub body: String,
}

/// A command for the server.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Subscribe to a topic.
    Subscribe(Topic),
    /// Unsubscribe from a topic.
    Unsubscribe(Topic),
    /// Publish a payload.
    Publish {
        /// Destination path.
        destination: Destination,
        /// JSON body.
        body: String,
    },
}

/// Handle to a connected session with WebSocket transport.
///
/// Frames are sent/received via the channels; an internal task handles
/// the socket I/O.
pub struct ConnectedSession {
    /// Send commands to the server.
    pub to_server: mpsc::Sender<Outbound>,
    /// Receive payloads from the server.
    pub from_server: mpsc::Receiver<Inbound>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedSession {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a Driftline server via WebSocket.
///
/// `token` is an opaque bearer credential presented on the upgrade
/// request. Returns a [`ConnectedSession`] with channels for frame
/// transport.
///
/// # Errors
///
/// Returns [`TransportError::Connection`] when the URL is invalid or the
/// upgrade fails.
pub async fn connect(url: &str, token: &str) -> Result<ConnectedSession, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Connection(format!("invalid url: {e}")))?;
    let auth = format!("Bearer {token}")
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid token: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, auth);

    let (socket, _response) = connect_async(request)
        .await
        .map_err(|e| TransportError::Connection(format!("upgrade failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Outbound>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Inbound>(32);

    let handle = tokio::spawn(run_connection(socket, to_server_rx, from_server_tx));

    Ok(ConnectedSession {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and the socket.
async fn run_connection<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    mut to_server: mpsc::Receiver<Outbound>,
    from_server: mpsc::Sender<Inbound>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = to_server.recv() => {
                let Some(outbound) = outbound else { break };
                match encode_outbound(&outbound) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!("send failed: {e}");
                            break;
                        }
                    },
                    Err(e) => tracing::warn!("dropped outbound frame: {e}"),
                }
            },
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match parse_inbound(text.as_str()) {
                        Ok(payload) => {
                            if from_server.send(payload).await.is_err() {
                                break;
                            }
                        },
                        Err(e) => tracing::warn!("dropped inbound frame: {e}"),
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => tracing::warn!("dropped non-text frame"),
                    Some(Err(e)) => {
                        tracing::warn!("receive failed: {e}");
                        break;
                    },
                }
            },
        }
    }
}

fn encode_outbound(outbound: &Outbound) -> Result<String, TransportError> {
    let envelope = match outbound {
        Outbound::Subscribe(topic) => OutboundEnvelope {
            destination: "/subscribe".to_string(),
            body: topic.to_string(),
        },
        Outbound::Unsubscribe(topic) => OutboundEnvelope {
            destination: "/unsubscribe".to_string(),
            body: topic.to_string(),
        },
        Outbound::Publish { destination, body } => OutboundEnvelope {
            destination: destination.as_path().to_string(),
            body: body.clone(),
        },
    };
    serde_json::to_string(&envelope).map_err(|e| TransportError::Framing(e.to_string()))
}

fn parse_inbound(text: &str) -> Result<Inbound, TransportError> {
    let envelope: InboundEnvelope =
        serde_json::from_str(text).map_err(|e| TransportError::Framing(e.to_string()))?;
    Ok(Inbound { topic: envelope.topic, body: envelope.body })
}

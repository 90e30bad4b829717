use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    accept_async_with_config,
    tungstenite::{self, Message, protocol::WebSocketConfig},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    error::RelayError,
    message::{ClientEvent, decode, encode},
    registry::{Inbox, SessionId},
    relay::Relay,
};

/// Largest inbound message accepted before the connection is dropped.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10_000_000;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
/// Most time spent on the close handshake of a finished session. The peer may
/// be the one that just stalled a write, so this stays short.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_message_size: usize,
    /// Upper bound on a single socket write. A recipient that cannot take a
    /// frame within this window is disconnected.
    pub send_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl RelayConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

pub struct Server {
    listener: TcpListener,
    relay: Arc<Relay>,
    config: Arc<RelayConfig>,
}

impl Server {
    pub fn new(listener: TcpListener, config: RelayConfig) -> Self {
        Self {
            listener,
            relay: Arc::new(Relay::new()),
            config: Arc::new(config),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    /// Accepts connections until `shutdown` resolves, then closes every open
    /// session and waits for their tasks to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            relay,
            config,
        } = self;
        let sessions = Sessions {
            relay,
            config,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &sessions);
                }
            }
        }

        info!(open = sessions.tracker.len(), "relay shutting down");
        sessions.cancel.cancel();
        sessions.tracker.close();
        sessions.tracker.wait().await;

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

struct Sessions {
    relay: Arc<Relay>,
    config: Arc<RelayConfig>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, sessions: &Sessions) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, sessions),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, sessions: &Sessions) {
    let relay = Arc::clone(&sessions.relay);
    let config = Arc::clone(&sessions.config);
    let cancel = sessions.cancel.child_token();
    sessions.tracker.spawn(async move {
        match handle_connection(stream, peer, relay, config, cancel).await {
            Ok(()) => debug!(%peer, "connection finished"),
            Err(err) if err.is_closed() => debug!(%peer, "connection closed by peer"),
            Err(err) => warn!(%peer, error = %err, "connection closed with error"),
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: Arc<Relay>,
    config: Arc<RelayConfig>,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let websocket = select! {
        handshake = accept_async_with_config(stream, Some(config.websocket_config())) => handshake?,
        _ = cancel.cancelled() => return Ok(()),
    };
    let (mut sink, mut source) = websocket.split();

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let session = relay.connect(outbox).await;
    info!(session, %peer, "client connected");

    let outcome = select! {
        result = read_inbound(&mut source, &relay, session) => result,
        result = write_outbound(&mut sink, &mut inbox, session, config.send_timeout) => result,
        _ = cancel.cancelled() => Ok(()),
    };

    if relay.disconnect(session).await {
        info!(session, %peer, "client disconnected");
    }
    close_sink(&mut sink, config.send_timeout.min(CLOSE_TIMEOUT)).await;

    outcome
}

/// Applies inbound events in arrival order until the peer hangs up or sends
/// something the protocol does not allow.
async fn read_inbound<S>(source: &mut S, relay: &Relay, session: SessionId) -> Result<(), RelayError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = source.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8(bytes)
                .map_err(|_| RelayError::Protocol("binary frame is not valid UTF-8".into()))?,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        let event = decode::<ClientEvent>(&text)?;
        relay.handle_event(session, event).await;
    }

    Ok(())
}

/// Drains the session's queue onto its socket. Ends cleanly once the
/// registry drops the session's handle.
async fn write_outbound<S>(
    sink: &mut S,
    inbox: &mut Inbox,
    session: SessionId,
    send_timeout: Duration,
) -> Result<(), RelayError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(event) = inbox.recv().await {
        let frame = encode(&event)?;
        match timeout(send_timeout, sink.send(Message::Text(frame))).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(RelayError::Delivery {
                    session,
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                return Err(RelayError::Delivery {
                    session,
                    reason: format!("send timed out after {send_timeout:?}"),
                });
            }
        }
    }

    Ok(())
}

async fn close_sink<S>(sink: &mut S, limit: Duration)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match timeout(limit, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "close handshake failed"),
        Err(_) => debug!("close handshake timed out"),
    }
}

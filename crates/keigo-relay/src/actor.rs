//! The relay actor: one task, one socket, many callers.
//!
//! Callers talk to the actor through a cloneable [`RelayHandle`]. Dispatch
//! is fail-fast: if the socket is down the command returns
//! [`RelayError::NotConnected`] immediately instead of queueing — the
//! caller owns retry policy, the relay owns reconnect policy.

use tokio::sync::{broadcast, mpsc, oneshot};

use keigo_types::{ServiceReply, ServiceRequest};

use crate::conn::ServiceConn;
use crate::constants::{HEARTBEAT_INTERVAL, RECONNECT_BACKOFF};

/// Broadcast capacity for relay events. Subscribers that lag past this
/// many undelivered events start losing the oldest ones.
const EVENT_CAPACITY: usize = 64;

/// Errors surfaced to dispatch callers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("analysis service is not connected")]
    NotConnected,
    #[error("relay actor has shut down")]
    Shutdown,
}

/// Events broadcast to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// A reply line arrived from the service.
    Reply(ServiceReply),
    /// The socket came up (initial connect or reconnect).
    ChannelUp,
    /// The socket went down; reconnect attempts are underway.
    ChannelDown,
}

enum RelayCommand {
    Dispatch {
        request: ServiceRequest,
        reply: oneshot::Sender<Result<(), RelayError>>,
    },
    IsConnected {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to the relay actor.
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<RelayCommand>,
    events: broadcast::Sender<RelayEvent>,
}

impl RelayHandle {
    /// Send one request over the socket.
    ///
    /// Resolves once the line has been written, not when the service
    /// replies — replies arrive later as [`RelayEvent::Reply`].
    pub async fn dispatch(&self, request: ServiceRequest) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(RelayCommand::Dispatch { request, reply: tx })
            .await
            .map_err(|_| RelayError::Shutdown)?;
        rx.await.map_err(|_| RelayError::Shutdown)?
    }

    /// Whether the socket is currently up.
    pub async fn is_connected(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(RelayCommand::IsConnected { reply: tx })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Subscribe to replies and connection transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }
}

/// Spawn the relay actor against the given service address.
///
/// The actor runs until every handle clone is dropped.
pub fn spawn_relay(addr: impl Into<String>) -> RelayHandle {
    let addr = addr.into();
    let (commands, rx) = mpsc::channel(32);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let handle = RelayHandle {
        commands,
        events: events.clone(),
    };
    tokio::spawn(run(addr, rx, events));
    handle
}

async fn run(
    addr: String,
    mut commands: mpsc::Receiver<RelayCommand>,
    events: broadcast::Sender<RelayEvent>,
) {
    loop {
        let mut conn = match ServiceConn::connect(&addr).await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::debug!(%addr, %err, "analysis service unreachable, backing off");
                if !serve_while_down(&mut commands).await {
                    return;
                }
                continue;
            }
        };
        tracing::info!(%addr, "connected to analysis service");
        let _ = events.send(RelayEvent::ChannelUp);

        if serve_while_up(&mut conn, &mut commands, &events).await {
            tracing::warn!(%addr, "analysis service connection lost");
            let _ = events.send(RelayEvent::ChannelDown);
        } else {
            // Every handle dropped; exit quietly.
            return;
        }
    }
}

/// Serve commands on a live socket. Returns true if the socket died and
/// the caller should reconnect, false if all handles are gone.
async fn serve_while_up(
    conn: &mut ServiceConn,
    commands: &mut mpsc::Receiver<RelayCommand>,
    events: &broadcast::Sender<RelayEvent>,
) -> bool {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first interval tick fires immediately; consume it so the first
    // real ping lands one full period after connect.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(RelayCommand::Dispatch { request, reply }) => {
                    match conn.send(&request).await {
                        Ok(()) => {
                            let _ = reply.send(Ok(()));
                        }
                        Err(err) => {
                            tracing::warn!(%err, "dispatch write failed");
                            let _ = reply.send(Err(RelayError::NotConnected));
                            return true;
                        }
                    }
                }
                Some(RelayCommand::IsConnected { reply }) => {
                    let _ = reply.send(true);
                }
                None => return false,
            },
            inbound = conn.recv() => match inbound {
                Ok(reply) => {
                    let _ = events.send(RelayEvent::Reply(reply));
                }
                Err(err) => {
                    tracing::debug!(%err, "service read failed");
                    return true;
                }
            },
            _ = heartbeat.tick() => {
                if let Err(err) = conn.send(&ServiceRequest::Ping).await {
                    tracing::debug!(%err, "heartbeat write failed");
                    return true;
                }
            }
        }
    }
}

/// Serve commands for one backoff period while disconnected. Every
/// dispatch fails fast. Returns false if all handles are gone.
async fn serve_while_down(commands: &mut mpsc::Receiver<RelayCommand>) -> bool {
    let backoff = tokio::time::sleep(RECONNECT_BACKOFF);
    tokio::pin!(backoff);

    loop {
        tokio::select! {
            _ = &mut backoff => return true,
            cmd = commands.recv() => match cmd {
                Some(RelayCommand::Dispatch { reply, .. }) => {
                    let _ = reply.send(Err(RelayError::NotConnected));
                }
                Some(RelayCommand::IsConnected { reply }) => {
                    let _ = reply.send(false);
                }
                None => return false,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Accept one connection, echo canned suggestions for each analyze
    /// line, ignore pings.
    async fn fake_service(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: ServiceRequest = serde_json::from_str(&line).unwrap();
            if matches!(request, ServiceRequest::Analyze { .. }) {
                write
                    .write_all(b"{\"suggestions\":[\"Rude\",\"Could you take a look?\"]}\n")
                    .await
                    .unwrap();
            }
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<RelayEvent>) -> RelayEvent {
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_dispatch_and_reply_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(fake_service(listener));

        let relay = spawn_relay(addr);
        let mut events = relay.subscribe();
        assert_eq!(next_event(&mut events).await, RelayEvent::ChannelUp);
        assert!(relay.is_connected().await);

        relay
            .dispatch(ServiceRequest::Analyze {
                focus: "Do it now.".into(),
                context: String::new(),
                body: "Do it now.".into(),
                timestamp: 1,
            })
            .await
            .unwrap();

        match next_event(&mut events).await {
            RelayEvent::Reply(ServiceReply::Suggestions { suggestions }) => {
                assert_eq!(suggestions[0], "Rude");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_fails_fast_while_down() {
        // Bind-then-drop for a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let relay = spawn_relay(addr);
        // Loopback refusal is immediate, so the actor reaches its backoff
        // loop as soon as it runs; the command just waits in the mpsc
        // until then.
        let err = relay
            .dispatch(ServiceRequest::Ping)
            .await
            .expect_err("dispatch should fail while disconnected");
        assert_eq!(err, RelayError::NotConnected);
        assert!(!relay.is_connected().await);
    }

    #[tokio::test]
    async fn test_channel_down_broadcast_on_service_hangup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let service = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let relay = spawn_relay(addr);
        let mut events = relay.subscribe();
        assert_eq!(next_event(&mut events).await, RelayEvent::ChannelUp);
        assert_eq!(next_event(&mut events).await, RelayEvent::ChannelDown);
        service.await.unwrap();
    }
}

//! Secondary sessions on the primary
//!
//! One session per connected secondary. Each session owns a writer task fed
//! by a bounded queue; replies, broadcasts and full-sync frames for that peer
//! all go through it, so exactly one task writes to a connection.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{ReplicationError, ReplicationResult};
use crate::observability::{Event, MetricsRegistry};
use crate::protocol::{Frame, FrameCodec};

/// Session identifier, assigned on accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Handshaking,
    Active,
    Closed,
}

impl SessionState {
    /// Legal transitions: forward along the lifecycle, or straight to `Closed`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Active)
                | (Connecting, Closed)
                | (Handshaking, Closed)
                | (Active, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgment channel of one broadcast; `true` once the frame is written
pub type AckSender = mpsc::Sender<bool>;

/// One frame queued for a peer
#[derive(Debug)]
pub struct Outbound {
    pub frame: Frame,
    pub ack: Option<AckSender>,
}

impl Outbound {
    pub fn frame(frame: Frame) -> Self {
        Self { frame, ack: None }
    }

    pub fn acked(frame: Frame, ack: AckSender) -> Self {
        Self {
            frame,
            ack: Some(ack),
        }
    }
}

/// Spawn the task that owns the write half of a connection.
///
/// The task ends when the queue closes or a write fails; dropping the write
/// half then shuts the connection down in that direction.
pub fn spawn_writer<W>(
    mut writer: W,
    codec: FrameCodec,
    mut queue: mpsc::Receiver<Outbound>,
    peer: String,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(outbound) = queue.recv().await {
            let result = codec.write_frame(&mut writer, &outbound.frame).await;
            let written = result.is_ok();
            if let Some(ack) = outbound.ack {
                let _ = ack.try_send(written);
            }
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "writer stopped");
                break;
            }
        }
    })
}

/// Registry entry
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub state: SessionState,
    pub outbound: mpsc::Sender<Outbound>,
    writer: JoinHandle<()>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
        writer: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            state: SessionState::Connecting,
            outbound,
            writer,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer.to_string(),
            state: self.state,
            connected_at: self.connected_at,
        }
    }

    /// Stop the writer; the connection closes with it.
    fn close(self) {
        self.writer.abort();
    }
}

/// Status view of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: String,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
}

/// Why a session left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Read or write failure, or the peer hung up
    Disconnected,
    /// Outbound queue overflowed during a broadcast
    Evicted,
    /// Node shutdown
    Shutdown,
}

pub(crate) type Sessions = HashMap<SessionId, SessionHandle>;

/// Live sessions, guarded by one lock.
///
/// Removal and writer shutdown happen under the lock, so a session found in
/// the registry always has a live writer.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Sessions>>,
    metrics: Arc<MetricsRegistry>,
}

impl SessionRegistry {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    pub async fn register(&self, handle: SessionHandle) {
        let id = handle.id;
        let peer = handle.peer;
        self.sessions.lock().await.insert(id, handle);
        self.metrics.increment_sessions_opened();
        info!(event = %Event::SessionOpened, session = %id, peer = %peer, "secondary connected");
    }

    /// Move a session along its lifecycle.
    pub async fn transition(&self, id: SessionId, next: SessionState) -> ReplicationResult<()> {
        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .get_mut(&id)
            .ok_or_else(|| ReplicationError::ConnectionClosed(id.to_string()))?;

        if !handle.state.can_transition_to(next) {
            return Err(ReplicationError::IllegalTransition {
                from: handle.state.to_string(),
                to: next.to_string(),
            });
        }
        handle.state = next;
        Ok(())
    }

    /// Remove a session and stop its writer. Returns false if already gone.
    pub async fn remove(&self, id: SessionId, reason: CloseReason) -> bool {
        let mut sessions = self.sessions.lock().await;
        remove_locked(&mut sessions, id, reason, &self.metrics)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Run `f` with the registry locked.
    pub(crate) async fn with_locked<T>(
        &self,
        f: impl FnOnce(&mut Sessions, &MetricsRegistry) -> T,
    ) -> T {
        let mut sessions = self.sessions.lock().await;
        f(&mut sessions, &self.metrics)
    }

    /// Close every session (shutdown).
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        let ids: Vec<SessionId> = sessions.keys().copied().collect();
        for id in ids {
            remove_locked(&mut sessions, id, CloseReason::Shutdown, &self.metrics);
        }
    }

    pub async fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.lock().await.get(&id).map(|handle| handle.state)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Status view, oldest session first.
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(SessionHandle::info).collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }
}

pub(crate) fn remove_locked(
    sessions: &mut Sessions,
    id: SessionId,
    reason: CloseReason,
    metrics: &MetricsRegistry,
) -> bool {
    let Some(handle) = sessions.remove(&id) else {
        return false;
    };
    let peer = handle.peer;
    handle.close();
    metrics.increment_sessions_closed();

    match reason {
        CloseReason::Evicted => {
            metrics.increment_evictions();
            info!(event = %Event::SessionEvicted, session = %id, peer = %peer, "secondary evicted");
        }
        CloseReason::Disconnected | CloseReason::Shutdown => {
            info!(event = %Event::SessionClosed, session = %id, peer = %peer, reason = ?reason, "secondary disconnected");
        }
    }
    true
}

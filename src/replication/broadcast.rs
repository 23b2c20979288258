//! Fan-out of replicated frames
//!
//! Frames are enqueued on every target's outbound queue while the registry
//! lock is held; the lock is released before waiting for any network write.
//! A peer whose queue is full is evicted and has to reconnect and resync.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::session::{remove_locked, CloseReason, Outbound, SessionId, SessionRegistry, SessionState};
use crate::observability::Event;
use crate::protocol::Frame;

/// How many targeted peers must have written a frame before a broadcast returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckPolicy {
    /// Return right after enqueueing
    None,
    /// First completed write
    Any,
    /// A majority of the targeted peers
    Quorum,
    /// Every targeted peer
    #[default]
    All,
}

impl AckPolicy {
    /// Acknowledgments needed out of `targeted` peers.
    pub fn required(&self, targeted: usize) -> usize {
        match self {
            AckPolicy::None => 0,
            AckPolicy::Any => targeted.min(1),
            AckPolicy::Quorum => {
                if targeted == 0 {
                    0
                } else {
                    targeted / 2 + 1
                }
            }
            AckPolicy::All => targeted,
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Active peers selected for the frame
    pub targeted: usize,
    /// Frames placed on a peer queue
    pub enqueued: usize,
    /// Writes confirmed before the broadcast returned
    pub delivered: usize,
    /// Peers whose queue was closed or whose write failed
    pub failed: usize,
    /// Peers removed because their queue was full
    pub evicted: usize,
    /// The acknowledgment wait hit its timeout
    pub timed_out: bool,
}

/// Send `frame` to every active session except `except`.
pub async fn fan_out(
    registry: &SessionRegistry,
    frame: &Frame,
    except: Option<SessionId>,
    policy: AckPolicy,
    timeout: Duration,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    let mut ack_rx = registry
        .with_locked(|sessions, metrics| {
            // one slot per possible acknowledgment, so writers never block on it
            let (ack_tx, ack_rx) = mpsc::channel::<bool>(sessions.len().max(1));
            let mut dropped = Vec::new();

            for handle in sessions.values() {
                if handle.state != SessionState::Active || Some(handle.id) == except {
                    continue;
                }
                report.targeted += 1;

                let outbound = match policy {
                    AckPolicy::None => Outbound::frame(frame.clone()),
                    _ => Outbound::acked(frame.clone(), ack_tx.clone()),
                };
                match handle.outbound.try_send(outbound) {
                    Ok(()) => report.enqueued += 1,
                    Err(TrySendError::Full(_)) => {
                        report.evicted += 1;
                        dropped.push((handle.id, CloseReason::Evicted));
                    }
                    Err(TrySendError::Closed(_)) => {
                        report.failed += 1;
                        dropped.push((handle.id, CloseReason::Disconnected));
                    }
                }
            }

            for (id, reason) in dropped {
                remove_locked(sessions, id, reason, metrics);
            }
            ack_rx
        })
        .await;

    let required = policy.required(report.targeted);
    if required > 0 {
        let wait = async {
            while report.delivered < required {
                match ack_rx.recv().await {
                    Some(true) => report.delivered += 1,
                    Some(false) => report.failed += 1,
                    // every queued frame was written, failed or dropped
                    None => break,
                }
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            report.timed_out = true;
            warn!(
                verb = frame.verb(),
                delivered = report.delivered,
                required,
                "broadcast acknowledgment timed out"
            );
        }
    }

    let metrics = registry.metrics();
    metrics.increment_broadcasts();
    metrics.add_deliveries(report.delivered as u64);
    metrics.add_delivery_failures(report.failed as u64);

    debug!(
        event = %Event::Broadcast,
        verb = frame.verb(),
        targeted = report.targeted,
        enqueued = report.enqueued,
        delivered = report.delivered,
        failed = report.failed,
        evicted = report.evicted,
        "broadcast"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use crate::observability::MetricsRegistry;
    use crate::protocol::FrameCodec;
    use crate::replication::session::{spawn_writer, SessionHandle};

    async fn active_session(
        registry: &SessionRegistry,
        depth: usize,
    ) -> (SessionId, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = mpsc::channel(depth);
        let writer = spawn_writer(client, FrameCodec::default(), rx, "test".to_string());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let handle = SessionHandle::new(SessionId::new(), peer, tx, writer);
        let id = handle.id;
        registry.register(handle).await;
        registry.transition(id, SessionState::Handshaking).await.unwrap();
        registry.transition(id, SessionState::Active).await.unwrap();
        (id, server)
    }

    /// An active session whose writer never writes, so it never acknowledges.
    async fn stalled_session(registry: &SessionRegistry) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(8);
        let writer = tokio::spawn(std::future::pending::<()>());
        let handle = SessionHandle::new(SessionId::new(), "127.0.0.1:4".parse().unwrap(), tx, writer);
        let id = handle.id;
        registry.register(handle).await;
        registry.transition(id, SessionState::Handshaking).await.unwrap();
        registry.transition(id, SessionState::Active).await.unwrap();
        rx
    }

    #[test]
    fn test_required_acks() {
        assert_eq!(AckPolicy::None.required(3), 0);
        assert_eq!(AckPolicy::Any.required(3), 1);
        assert_eq!(AckPolicy::Any.required(0), 0);
        assert_eq!(AckPolicy::Quorum.required(3), 2);
        assert_eq!(AckPolicy::Quorum.required(4), 3);
        assert_eq!(AckPolicy::All.required(3), 3);
    }

    #[tokio::test]
    async fn test_fan_out_skips_originator() {
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (a, mut a_stream) = active_session(&registry, 8).await;
        let (_b, mut b_stream) = active_session(&registry, 8).await;
        let frame = Frame::statement("ecommerce", "SELECT * FROM orders");

        let report = fan_out(&registry, &frame, Some(a), AckPolicy::All, Duration::from_secs(1)).await;
        assert_eq!(report.targeted, 1);
        assert_eq!(report.delivered, 1);
        assert!(!report.timed_out);

        let codec = FrameCodec::default();
        assert_eq!(codec.read_frame(&mut b_stream).await.unwrap(), Some(frame));

        let nothing = tokio::time::timeout(
            Duration::from_millis(100),
            codec.read_frame(&mut a_stream),
        )
        .await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_only_active_sessions_are_targeted() {
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (tx, _rx) = mpsc::channel(1);
        let writer = tokio::spawn(async {});
        let handshaking = SessionHandle::new(SessionId::new(), "127.0.0.1:1".parse().unwrap(), tx, writer);
        registry.register(handshaking).await;

        let report = fan_out(
            &registry,
            &Frame::statement("db", "DELETE FROM t"),
            None,
            AckPolicy::All,
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_full_queue_evicts_peer() {
        let metrics = Arc::new(MetricsRegistry::new());
        let registry = SessionRegistry::new(Arc::clone(&metrics));

        // a session whose writer never drains its queue
        let (tx, _rx) = mpsc::channel(1);
        let writer = tokio::spawn(std::future::pending::<()>());
        let handle = SessionHandle::new(SessionId::new(), "127.0.0.1:2".parse().unwrap(), tx, writer);
        let id = handle.id;
        registry.register(handle).await;
        registry.transition(id, SessionState::Handshaking).await.unwrap();
        registry.transition(id, SessionState::Active).await.unwrap();

        let frame = Frame::statement("db", "DELETE FROM t");
        let first = fan_out(&registry, &frame, None, AckPolicy::None, Duration::from_millis(50)).await;
        assert_eq!(first.enqueued, 1);

        let second = fan_out(&registry, &frame, None, AckPolicy::None, Duration::from_millis(50)).await;
        assert_eq!(second.evicted, 1);
        assert!(registry.is_empty().await);
        assert_eq!(metrics.snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn test_any_returns_after_first_write() {
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (_live, _live_stream) = active_session(&registry, 8).await;
        let _stalled_a = stalled_session(&registry).await;
        let _stalled_b = stalled_session(&registry).await;

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            fan_out(
                &registry,
                &Frame::statement("db", "DELETE FROM t"),
                None,
                AckPolicy::Any,
                Duration::from_secs(30),
            ),
        )
        .await
        .expect("any-policy broadcast waited for the stalled peers");

        assert_eq!(report.targeted, 3);
        assert_eq!(report.enqueued, 3);
        assert_eq!(report.delivered, 1);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_quorum_needs_a_majority() {
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (_a, _a_stream) = active_session(&registry, 8).await;
        let (_b, _b_stream) = active_session(&registry, 8).await;
        let _stalled = stalled_session(&registry).await;
        let frame = Frame::statement("db", "DELETE FROM t");

        // 2 of 3 write: the majority is reached without the stalled peer
        let report = tokio::time::timeout(
            Duration::from_secs(2),
            fan_out(&registry, &frame, None, AckPolicy::Quorum, Duration::from_secs(30)),
        )
        .await
        .expect("quorum broadcast waited for the stalled peer");
        assert_eq!(report.delivered, 2);
        assert!(!report.timed_out);

        // 1 of 3 write: the majority is never reached
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (_c, _c_stream) = active_session(&registry, 8).await;
        let _stalled_a = stalled_session(&registry).await;
        let _stalled_b = stalled_session(&registry).await;

        let report = fan_out(&registry, &frame, None, AckPolicy::Quorum, Duration::from_millis(100)).await;
        assert_eq!(report.delivered, 1);
        assert!(report.timed_out);
    }

    #[tokio::test]
    async fn test_ack_timeout_is_reported() {
        let registry = SessionRegistry::new(Arc::new(MetricsRegistry::new()));
        let (tx, _rx) = mpsc::channel(4);
        let writer = tokio::spawn(std::future::pending::<()>());
        let handle = SessionHandle::new(SessionId::new(), "127.0.0.1:3".parse().unwrap(), tx, writer);
        let id = handle.id;
        registry.register(handle).await;
        registry.transition(id, SessionState::Handshaking).await.unwrap();
        registry.transition(id, SessionState::Active).await.unwrap();

        let report = fan_out(
            &registry,
            &Frame::statement("db", "DELETE FROM t"),
            None,
            AckPolicy::All,
            Duration::from_millis(50),
        )
        .await;
        assert!(report.timed_out);
        assert_eq!(report.delivered, 0);
        assert_eq!(registry.len().await, 1);
    }
}

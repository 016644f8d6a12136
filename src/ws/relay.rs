//! Apply-then-fan-out of inbound update frames.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::close_code::CloseReason;
use super::connctx::Enqueue;
use super::error::ProtocolError;
use super::registry::Registry;
use super::room::{Member, Room};
use crate::config::SlowConsumerPolicy;

/// What happened to a relayed frame on its way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    /// Peers that got a full snapshot instead of the raw frame.
    pub resynced: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

impl Registry {
    /// Applies `frame` from connection `from` to the room's state and forwards
    /// it, unmodified, to every other member.
    ///
    /// Frames from one sender are relayed in the order this is called, and
    /// fan-out happens under the room lock into per-peer FIFO queues, so every
    /// peer sees a sender's frames in emission order.
    pub async fn relay(
        &self,
        room: &Arc<Room>,
        from: Uuid,
        frame: Vec<u8>,
    ) -> Result<RelayReport, ProtocolError> {
        let mut inner = room.lock().await;
        let sender = match inner.members.get(&from) {
            Some(member) => member.conn.clone(),
            None => return Err(ProtocolError::NotMember),
        };
        if !sender.role().can_edit() {
            warn!(
                "Dropping frame from read-only user {} in room {}",
                sender.user_id(),
                room.key()
            );
            return Err(ProtocolError::ReadOnly);
        }

        if let Err(e) = inner.state.apply(&frame) {
            warn!(
                "Dropping malformed frame ({} bytes) from {} in room {}: {}",
                frame.len(),
                sender.user_id(),
                room.key(),
                e
            );
            return Err(e.into());
        }

        inner.dirty = true;
        inner.version += 1;
        self.arm_flush_timer(room, &mut inner);

        let frame = Arc::new(frame);
        let mut snapshot: Option<Arc<Vec<u8>>> = None;
        let mut report = RelayReport::default();
        let policy = self.settings().slow_consumer;

        let inner = &mut *inner;
        for (id, member) in inner.members.iter_mut() {
            if *id == from {
                continue;
            }
            let payload = if member.needs_resync {
                if snapshot.is_none() {
                    match inner.state.full_state() {
                        Ok(bytes) => snapshot = Some(Arc::new(bytes)),
                        Err(e) => warn!("Could not encode resync snapshot for {}: {}", room.key(), e),
                    }
                }
                snapshot.clone()
            } else {
                Some(frame.clone())
            };
            let Some(payload) = payload else {
                report.dropped += 1;
                continue;
            };

            deliver(member, payload, policy, &mut report, room);
        }

        debug!(
            "Relayed {} bytes in room {}: {:?}",
            frame.len(),
            room.key(),
            report
        );
        Ok(report)
    }
}

fn deliver(
    member: &mut Member,
    payload: Arc<Vec<u8>>,
    policy: SlowConsumerPolicy,
    report: &mut RelayReport,
    room: &Room,
) {
    match member.conn.try_send(payload) {
        Enqueue::Queued => {
            if member.needs_resync {
                member.needs_resync = false;
                report.resynced += 1;
            } else {
                report.delivered += 1;
            }
        }
        Enqueue::Full => match policy {
            SlowConsumerPolicy::Drop => {
                if !member.needs_resync {
                    warn!(
                        "Peer {} in room {} is lagging, dropping frames until resync",
                        member.conn.user_id(),
                        room.key()
                    );
                }
                member.needs_resync = true;
                report.dropped += 1;
            }
            SlowConsumerPolicy::Disconnect => {
                warn!(
                    "Disconnecting slow peer {} in room {}",
                    member.conn.user_id(),
                    room.key()
                );
                member.conn.terminate(CloseReason::ServerError);
                report.disconnected += 1;
            }
        },
        // The peer's socket is gone; its own cleanup removes it shortly.
        Enqueue::Gone => report.dropped += 1,
    }
}

//! Heartbeat sweep that evicts peers which stopped answering pings.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::close_code::CloseReason;
use super::connctx::Control;
use super::registry::Registry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub terminated: usize,
}

impl Registry {
    /// One liveness round over every open connection.
    ///
    /// A connection whose flag is still cleared from the previous round never
    /// answered that ping and is told to close; its connection task then runs
    /// the normal leave path. Everyone else gets a fresh ping.
    pub async fn sweep_liveness(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for room in self.rooms().await {
            let inner = room.lock().await;
            for member in inner.members.values() {
                let conn = &member.conn;
                if conn.take_alive() {
                    conn.send_control(Control::Ping);
                    report.pinged += 1;
                } else {
                    warn!(
                        "Connection {} (user {}) in room {} missed a heartbeat, terminating",
                        conn.id(),
                        conn.user_id(),
                        room.key()
                    );
                    conn.terminate(CloseReason::LivenessTimeout);
                    report.terminated += 1;
                }
            }
        }
        debug!("Liveness sweep: {:?}", report);
        report
    }

    /// Runs [`Registry::sweep_liveness`] every heartbeat interval.
    pub fn spawn_liveness_monitor(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let period = self.settings().heartbeat;
        info!("Liveness monitor running every {:?}", period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.sweep_liveness().await;
            }
        })
    }
}

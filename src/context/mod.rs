// Module: Context
// Shared mission state plus the cross-task signalling registers.
//
// Three disjoint concerns, three primitives, no nested locking:
//   - mission data (phase, arena, plan, new-map flag): one Mutex + Notify
//   - abort flag: a watch channel (raised anywhere, consumed by the executor)
//   - motion acks / capture completions: one watch register each

use tokio::sync::{watch, Mutex, Notify};
use tracing::info;

use crate::errors::ControlError;
use crate::protocol::{ArenaMap, Plan};

/// High-level state of the mission executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Planning,
    Navigating,
}

#[derive(Debug, Default)]
struct MissionState {
    phase: Phase,
    new_map_received: bool,
    arena: Option<ArenaMap>,
    plan: Option<Plan>,
}

/// The one shared context, created at process start and alive until shutdown.
pub struct MissionContext {
    state: Mutex<MissionState>,
    new_task: Notify,
    abort_tx: watch::Sender<bool>,
}

impl Default for MissionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionContext {
    pub fn new() -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(MissionState::default()),
            new_task: Notify::new(),
            abort_tx,
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    /// Accepts a new mission map. Only legal in Idle; any other phase is a
    /// busy rejection that leaves every piece of state untouched.
    pub async fn submit_arena(&self, map: ArenaMap) -> Result<(), ControlError> {
        {
            let mut st = self.state.lock().await;
            if st.phase != Phase::Idle {
                return Err(ControlError::Busy);
            }
            st.arena = Some(map);
            st.new_map_received = true;
        }
        self.new_task.notify_one();
        Ok(())
    }

    /// Raises the abort flag and wakes the executor if it is parked.
    pub fn request_abort(&self) {
        self.abort_tx.send_replace(true);
        self.new_task.notify_one();
    }

    /// Consumes the abort flag, returning whether it was raised.
    pub fn take_abort(&self) -> bool {
        self.abort_tx.send_replace(false)
    }

    pub fn abort_requested(&self) -> bool {
        *self.abort_tx.borrow()
    }

    /// A receiver for interruptible timed waits.
    pub fn abort_watch(&self) -> watch::Receiver<bool> {
        self.abort_tx.subscribe()
    }

    /// Parks until a new map arrives, then moves Idle -> Planning and hands
    /// the map over. A stop received while parked has no mission to cancel:
    /// it is consumed here so it cannot poison the next mission.
    pub async fn wait_for_mission(&self) -> ArenaMap {
        loop {
            {
                let mut st = self.state.lock().await;
                if st.new_map_received {
                    st.new_map_received = false;
                    st.phase = Phase::Planning;
                    st.plan = None;
                    if self.take_abort() {
                        info!("Discarding stop request raised before mission start");
                    }
                    if let Some(map) = st.arena.take() {
                        return map;
                    }
                }
            }
            if self.take_abort() {
                info!("Stop request received while idle, nothing to abort");
            }
            self.new_task.notified().await;
        }
    }

    /// Stores the parsed plan and enters Navigating.
    pub async fn store_plan(&self, plan: Plan) {
        let mut st = self.state.lock().await;
        st.plan = Some(plan);
        st.phase = Phase::Navigating;
    }

    pub async fn current_plan(&self) -> Option<Plan> {
        self.state.lock().await.plan.clone()
    }

    /// Returns the context to Idle (mission finished, failed or aborted).
    pub async fn finish_mission(&self) {
        self.state.lock().await.phase = Phase::Idle;
    }
}

/// Last observed motion-controller completion id. Monotonically overwritten,
/// never queued; the executor waits for one specific id at a time.
pub struct AckRegister {
    tx: watch::Sender<u32>,
}

impl Default for AckRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl AckRegister {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub fn record(&self, id: u32) {
        self.tx.send_replace(id);
    }

    pub fn last(&self) -> u32 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }
}

/// Obstacle id of the most recently completed capture; 0 flags a failure.
/// Subscribers only react to writes made after they subscribed, which is
/// what shields a mission from signals left over by stale workers.
pub struct CaptureRegister {
    tx: watch::Sender<u32>,
}

impl Default for CaptureRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureRegister {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub fn record(&self, obstacle_id: u32) {
        self.tx.send_replace(obstacle_id);
    }

    pub fn last(&self) -> u32 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_context_starts_idle() {
        let ctx = MissionContext::new();
        assert_eq!(ctx.phase().await, Phase::Idle);
        assert!(!ctx.abort_requested());
        assert!(ctx.current_plan().await.is_none());
    }

    #[tokio::test]
    async fn test_submit_rejected_outside_idle() {
        let ctx = MissionContext::new();
        ctx.submit_arena(ArenaMap::default()).await.unwrap();
        let _map = ctx.wait_for_mission().await; // agora em Planning

        let err = ctx.submit_arena(ArenaMap::default()).await.unwrap_err();
        assert!(matches!(err, ControlError::Busy));
        // A rejeição não mexe em nada.
        assert_eq!(ctx.phase().await, Phase::Planning);
        assert!(!ctx.abort_requested());
    }

    #[tokio::test]
    async fn test_wait_for_mission_wakes_on_submit() {
        let ctx = Arc::new(MissionContext::new());
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.wait_for_mission().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.submit_arena(ArenaMap {
            robot_x: 3,
            ..Default::default()
        })
        .await
        .unwrap();

        let map = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(map.robot_x, 3);
        assert_eq!(ctx.phase().await, Phase::Planning);
    }

    #[tokio::test]
    async fn test_stale_abort_consumed_before_mission() {
        let ctx = MissionContext::new();
        ctx.request_abort();
        ctx.submit_arena(ArenaMap::default()).await.unwrap();
        let _map = ctx.wait_for_mission().await;
        // O stop antigo não sobrevive até a navegação.
        assert!(!ctx.abort_requested());
    }

    #[tokio::test]
    async fn test_abort_take_is_one_shot() {
        let ctx = MissionContext::new();
        ctx.request_abort();
        assert!(ctx.take_abort());
        assert!(!ctx.take_abort());
    }

    #[tokio::test]
    async fn test_ack_register_overwrites() {
        let acks = AckRegister::new();
        acks.record(1);
        acks.record(2);
        assert_eq!(acks.last(), 2);

        let mut rx = acks.subscribe();
        acks.record(3);
        let seen = rx.wait_for(|&v| v == 3).await.unwrap();
        assert_eq!(*seen, 3);
    }

    #[tokio::test]
    async fn test_capture_subscriber_ignores_older_writes() {
        let captures = CaptureRegister::new();
        captures.record(9); // worker antigo
        let mut rx = captures.subscribe();
        assert!(!rx.has_changed().unwrap());

        captures.record(4);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 4);
    }
}

//! # Módulo Executor - A Máquina de Estados da Missão
//!
//! Este é o coração do centro de controle: a atividade que transforma um
//! mapa recebido do operador em movimento de verdade, coordenando quatro
//! fontes assíncronas (operador, acks de motor, capturas, pedido de
//! aborto) em torno do contexto compartilhado.
//!
//! ## O ciclo de fases:
//!
//! ```text
//!            novo mapa            rota carregada      plano consumido/abortado
//!    Idle ───────────────▶ Planning ─────────▶ Navigating ─────────▶ Idle
//!     ▲                                                               │
//!     └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! O ciclo se repete pela vida inteira do processo; não existem estados
//! terminais.
//!
//! ## Regras de navegação:
//!
//! - Um comando de motor por vez: o comando *n+1* só sai depois do ack do
//!   comando *n* (ou a navegação morre por timeout/aborto).
//! - Ids de comando começam em 1 a cada missão.
//! - Em `SP<id>`, o executor dispara um worker de snapshot e espera só a
//!   confirmação de captura; upload e classificação seguem em paralelo
//!   com o resto da navegação.
//! - O pedido de aborto é observado no topo de cada iteração e dentro de
//!   cada espera limitada; observado, é consumido, reportado, e a missão
//!   volta a Idle.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Timeouts;
use crate::context::{AckRegister, CaptureRegister, MissionContext};
use crate::errors::ControlError;
use crate::motion::{self, MotionCommander};
use crate::operator::OperatorLink;
use crate::planner::RoutePlanner;
use crate::protocol::{ArenaMap, Command, MotionFrame, Plan, RouteRequest, SnapPosition};
use crate::snapshot::{SnapshotTask, SnapshotWorker};

/// Desfecho de uma espera por ack de motor.
enum AckOutcome {
    Acked,
    TimedOut,
    Aborted,
    Lost,
}

/// Desfecho de uma espera por confirmação de captura.
enum CaptureOutcome {
    Confirmed,
    Failed,
    TimedOut,
    Aborted,
}

/// A atividade de longa duração que executa missões.
pub struct MissionExecutor {
    pub ctx: Arc<MissionContext>,
    pub planner: Arc<dyn RoutePlanner>,
    pub commander: Arc<MotionCommander>,
    pub acks: Arc<AckRegister>,
    pub captures: Arc<CaptureRegister>,
    pub worker: SnapshotWorker,
    pub operator: OperatorLink,
    pub timeouts: Timeouts,
}

impl MissionExecutor {
    /// Loop eterno Idle → missão → Idle.
    pub async fn run(self) {
        loop {
            let map = self.ctx.wait_for_mission().await;
            let mission = Uuid::new_v4();
            let started = chrono::Utc::now();
            info!(
                mission = %mission,
                obstacles = map.obstacles.len(),
                "Mission accepted, planning route"
            );

            let outcome = self.run_mission(&map).await;
            self.ctx.finish_mission().await;

            let elapsed_ms = (chrono::Utc::now() - started).num_milliseconds();
            info!(mission = %mission, outcome, elapsed_ms, "Mission closed, back to idle");
        }
    }

    /// Uma missão completa: round-trip de planejamento + navegação.
    async fn run_mission(&self, map: &ArenaMap) -> &'static str {
        let request = RouteRequest::from_map(map);
        let plan = match self.planner.plan_route(&request).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(category = e.category(), error = %e, "Route planning failed");
                self.operator
                    .send_status("Pathfinding failed. Mission dropped.")
                    .await;
                return "planning_failed";
            }
        };

        info!(
            commands = plan.commands.len(),
            snapshots = plan.snapshot_count(),
            poses = plan.snap_positions.len(),
            "Route received"
        );
        if plan.snap_positions.len() < plan.snapshot_count() {
            warn!(
                snapshots = plan.snapshot_count(),
                poses = plan.snap_positions.len(),
                "Planner returned fewer snap positions than snapshots"
            );
        }

        self.ctx.store_plan(plan.clone()).await;
        self.operator
            .send_status("Path received. Starting navigation.")
            .await;
        self.navigate(&plan).await
    }

    /// Consome o plano em ordem estrita de programa.
    async fn navigate(&self, plan: &Plan) -> &'static str {
        let mut abort_rx = self.ctx.abort_watch();
        let mut next_cmd_id = 0u32;
        let mut snap_ordinal = 0usize;

        for command in &plan.commands {
            if self.ctx.take_abort() {
                info!("Abort observed, terminating navigation");
                self.operator.send_status("Navigation aborted.").await;
                return "aborted";
            }

            match command {
                Command::Snapshot(obstacle_id) => {
                    let pose = plan
                        .snap_positions
                        .get(snap_ordinal)
                        .copied()
                        .unwrap_or_else(|| {
                            warn!(
                                ordinal = snap_ordinal,
                                "No snap position for this snapshot, using sentinel pose"
                            );
                            SnapPosition::SENTINEL
                        });
                    snap_ordinal += 1;

                    // Inscrição antes do spawn: só sinais novos contam, e
                    // nenhum se perde.
                    let mut capture_rx = self.captures.subscribe();
                    info!(obstacle_id = *obstacle_id, ?pose, "Spawning snapshot worker");
                    self.worker.spawn(SnapshotTask {
                        obstacle_id: *obstacle_id,
                        pose,
                    });

                    match self
                        .await_capture(&mut capture_rx, &mut abort_rx, *obstacle_id)
                        .await
                    {
                        CaptureOutcome::Confirmed => {}
                        CaptureOutcome::Failed => {
                            error!(obstacle_id = *obstacle_id, "Capture failure reported");
                            self.operator
                                .send_status("Image capture failed. Navigation stopped.")
                                .await;
                            return "capture_failed";
                        }
                        CaptureOutcome::TimedOut => {
                            error!(obstacle_id = *obstacle_id, "Capture confirmation timed out");
                            self.operator
                                .send_status("Image capture timed out. Navigation stopped.")
                                .await;
                            return "capture_timeout";
                        }
                        CaptureOutcome::Aborted => {
                            info!("Abort observed while waiting for capture");
                            self.operator.send_status("Navigation aborted.").await;
                            return "aborted";
                        }
                    }
                }
                motion_command => {
                    next_cmd_id += 1;
                    let Some(frame) = MotionFrame::from_command(next_cmd_id, motion_command)
                    else {
                        continue; // inalcançável: Snapshot já tratado acima
                    };

                    // Inscrição antes do envio: um ack instantâneo não se
                    // perde, e um id requentado de missão antiga não conta.
                    let mut ack_rx = self.acks.subscribe();
                    if let Err(e) = self.commander.send_frame(&frame).await {
                        error!(id = frame.id, error = %e, "Motion command send failed");
                        self.operator
                            .send_status("Motion controller unreachable. Navigation stopped.")
                            .await;
                        return "motion_transport";
                    }

                    match self.await_motion_ack(&mut ack_rx, &mut abort_rx, frame.id).await {
                        AckOutcome::Acked => {}
                        AckOutcome::TimedOut => {
                            error!(id = frame.id, "Motion ack timed out");
                            self.operator
                                .send_status("Motion controller timeout. Navigation stopped.")
                                .await;
                            return "motion_timeout";
                        }
                        AckOutcome::Aborted => {
                            info!(id = frame.id, "Abort observed while waiting for ack");
                            self.operator.send_status("Navigation aborted.").await;
                            return "aborted";
                        }
                        AckOutcome::Lost => {
                            error!(id = frame.id, "Ack channel lost");
                            self.operator
                                .send_status("Motion controller unreachable. Navigation stopped.")
                                .await;
                            return "motion_transport";
                        }
                    }
                }
            }
        }

        self.operator.send_status("Navigation complete.").await;
        "completed"
    }

    /// Espera o ack de `id`, interrompível pelo pedido de aborto.
    async fn await_motion_ack(
        &self,
        ack_rx: &mut watch::Receiver<u32>,
        abort_rx: &mut watch::Receiver<bool>,
        id: u32,
    ) -> AckOutcome {
        tokio::select! {
            result = motion::await_ack(ack_rx, id, self.timeouts.motion_ack) => match result {
                Ok(()) => AckOutcome::Acked,
                Err(ControlError::Timeout(_)) => AckOutcome::TimedOut,
                Err(_) => AckOutcome::Lost,
            },
            _ = abort_rx.wait_for(|&raised| raised) => {
                self.ctx.take_abort();
                AckOutcome::Aborted
            }
        }
    }

    /// Espera a confirmação de captura de `obstacle_id`.
    ///
    /// Só sinais emitidos depois da inscrição contam; um valor de outro
    /// obstáculo (worker atrasado de missão antiga) é ignorado sem
    /// reiniciar o prazo. `0` é falha de câmera.
    async fn await_capture(
        &self,
        capture_rx: &mut watch::Receiver<u32>,
        abort_rx: &mut watch::Receiver<bool>,
        obstacle_id: u32,
    ) -> CaptureOutcome {
        let deadline = Instant::now() + self.timeouts.capture;
        loop {
            tokio::select! {
                changed = timeout_at(deadline, capture_rx.changed()) => match changed {
                    Err(_) => return CaptureOutcome::TimedOut,
                    Ok(Err(_)) => {
                        warn!("Capture register closed");
                        return CaptureOutcome::TimedOut;
                    }
                    Ok(Ok(())) => {
                        let seen = *capture_rx.borrow_and_update();
                        if seen == obstacle_id {
                            return CaptureOutcome::Confirmed;
                        }
                        if seen == 0 {
                            return CaptureOutcome::Failed;
                        }
                        warn!(seen, expected = obstacle_id, "Stale capture signal ignored");
                    }
                },
                _ = abort_rx.wait_for(|&raised| raised) => {
                    self.ctx.take_abort();
                    return CaptureOutcome::Aborted;
                }
            }
        }
    }
}

// ============================================================================
// TESTES DE CENÁRIO
// ============================================================================

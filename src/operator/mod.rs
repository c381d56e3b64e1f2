//! # Módulo do Operador - Console de Comando da Missão
//!
//! Cuida dos dois sentidos do canal sem fio com o console do operador.
//!
//! ## Entrada (listener):
//!
//! Uma mensagem por linha, JSON com um campo `cat`. Três categorias fazem
//! alguma coisa:
//!
//! - `sendArena`: inicia uma missão (só em Idle; senão "Robot is busy")
//! - `stop`: levanta o pedido de aborto e acorda o executor
//! - `stm`: comando direto de motor, repassado com disciplina de ack
//!
//! Toda mensagem recebe um ack síncrono ecoando a categoria; categoria
//! desconhecida e frame malformado também são respondidos (e logados),
//! nunca silenciosamente engolidos.
//!
//! ## Saída (link):
//!
//! Todas as mensagens para o operador passam por uma única task de
//! escrita, alimentada por um canal interno. Isso dá a disciplina de
//! escritor único no canal físico e concentra o reenvio (3 × 300 ms, ver
//! módulo `retry`) em um lugar só. Falha definitiva vai para o log, porque
//! o operador é o único canal de relatório que existe; não há para onde
//! escalar.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::{AckRegister, MissionContext};
use crate::motion::{self, MotionCommander};
use crate::protocol::{
    frame_text, parse_direct_drive, ArenaPayload, MotionFrame, OperatorAck, OperatorEnvelope,
};
use crate::retry::BackoffPolicy;

// ============================================================================
// LINK DE SAÍDA (ESCRITOR ÚNICO)
// ============================================================================

/// Handle clonável para enfileirar mensagens ao operador.
///
/// Clonar é barato; todos os clones alimentam a mesma task de escrita.
#[derive(Clone)]
pub struct OperatorLink {
    tx: mpsc::Sender<String>,
}

impl OperatorLink {
    /// Cria o link e a task única de escrita sobre `writer`.
    pub fn start(writer: Box<dyn AsyncWrite + Send + Unpin>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(write_loop(writer, rx));
        (Self { tx }, handle)
    }

    /// Envia um status textual (o texto entre aspas, linha própria).
    pub async fn send_status(&self, text: &str) {
        self.enqueue(frame_text(text)).await;
    }

    /// Envia o ack estruturado de uma mensagem recebida.
    pub async fn send_ack(&self, cat: &str, status: &str) {
        self.enqueue(OperatorAck::new(cat, status).to_line()).await;
    }

    async fn enqueue(&self, line: String) {
        if self.tx.send(line).await.is_err() {
            error!("Operator writer task is gone, dropping message");
        }
    }
}

/// Task de escrita: drena a fila e escreve cada linha com reenvio.
async fn write_loop(writer: Box<dyn AsyncWrite + Send + Unpin>, mut rx: mpsc::Receiver<String>) {
    let writer = Arc::new(Mutex::new(writer));
    while let Some(line) = rx.recv().await {
        let bytes = line.into_bytes();
        let result = BackoffPolicy::OPERATOR_SEND
            .run("operator send", || {
                let writer = writer.clone();
                let bytes = bytes.clone();
                async move {
                    let mut w = writer.lock().await;
                    w.write_all(&bytes).await?;
                    w.flush().await
                }
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Operator message lost after retries");
        }
    }
}

// ============================================================================
// LISTENER DE ENTRADA
// ============================================================================

/// Atividade de longa duração que consome o canal do operador.
pub struct OperatorListener {
    ctx: Arc<MissionContext>,
    link: OperatorLink,
    commander: Arc<MotionCommander>,
    acks: Arc<AckRegister>,
    ack_timeout: Duration,
}

impl OperatorListener {
    pub fn new(
        ctx: Arc<MissionContext>,
        link: OperatorLink,
        commander: Arc<MotionCommander>,
        acks: Arc<AckRegister>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            link,
            commander,
            acks,
            ack_timeout,
        }
    }

    /// Lê o canal linha a linha até EOF ou erro de transporte.
    pub async fn run(self, reader: Box<dyn AsyncRead + Send + Unpin>) {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.dispatch(line).await;
                }
                Ok(None) => {
                    warn!("Operator channel reached EOF");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Operator channel read failed");
                    break;
                }
            }
        }
    }

    /// Classifica uma mensagem e efetua a transição correspondente.
    async fn dispatch(&self, line: &str) {
        let envelope = match OperatorEnvelope::parse(line) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, raw = line, "Dropping malformed operator frame");
                self.link.send_ack("error", "Malformed frame").await;
                return;
            }
        };

        match envelope.cat.as_str() {
            "sendArena" => self.handle_arena(envelope.value).await,
            "stop" => {
                info!("Stop requested by operator");
                self.ctx.request_abort();
                self.link.send_ack("stop", "STOP command received.").await;
            }
            "stm" => self.handle_direct_drive(envelope.value).await,
            other => {
                warn!(cat = other, "Unknown operator category");
                self.link.send_ack(other, "Unknown command").await;
            }
        }
    }

    /// Ingestão de mapa: traduz o payload e tenta iniciar a missão.
    async fn handle_arena(&self, value: Option<serde_json::Value>) {
        let payload = match value.map(ArenaPayload::parse) {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                warn!(error = %e, "Rejecting arena payload");
                self.link.send_ack("sendArena", "Invalid arena payload").await;
                return;
            }
            None => {
                warn!("sendArena without value");
                self.link.send_ack("sendArena", "Invalid arena payload").await;
                return;
            }
        };

        let map = payload.into_map();
        info!(
            obstacles = map.obstacles.len(),
            robot_x = map.robot_x,
            robot_y = map.robot_y,
            robot_dir = map.robot_dir,
            retrying = map.retrying,
            "Arena map received"
        );

        match self.ctx.submit_arena(map).await {
            Ok(()) => {
                self.link
                    .send_ack("sendArena", "Arena received. Planning route.")
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Mission rejected");
                self.link.send_ack("sendArena", "Robot is busy").await;
            }
        }
    }

    /// Comando direto de motor: despacha com ack-gate em task própria para
    /// não segurar o loop de leitura, e confirma o recebimento na hora.
    async fn handle_direct_drive(&self, value: Option<serde_json::Value>) {
        let token = value.as_ref().and_then(|v| v.as_str()).unwrap_or("");
        let command = match parse_direct_drive(token) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(error = %e, "Rejecting direct drive command");
                self.link.send_ack("stm", "Invalid motion token").await;
                return;
            }
        };

        let id = self.commander.next_direct_id();
        match MotionFrame::from_command(id, &command) {
            Some(frame) => {
                let commander = self.commander.clone();
                let acks = self.acks.clone();
                let limit = self.ack_timeout;
                tokio::spawn(async move {
                    // Inscreve antes do envio para não perder um ack rápido.
                    let mut rx = acks.subscribe();
                    if let Err(e) = commander.send_frame(&frame).await {
                        error!(id = frame.id, error = %e, "Direct command send failed");
                        return;
                    }
                    match motion::await_ack(&mut rx, frame.id, limit).await {
                        Ok(()) => info!(id = frame.id, "Direct command completed"),
                        Err(e) => warn!(id = frame.id, error = %e, "Direct command not confirmed"),
                    }
                });
                self.link.send_ack("stm", "ok").await;
            }
            None => {
                // parse_direct_drive só devolve comandos de movimento.
                self.link.send_ack("stm", "Invalid motion token").await;
            }
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================

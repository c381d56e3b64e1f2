//! # Módulo de Motores - Canal do Controlador de Movimento
//!
//! Fala com o controlador de motores pela serial: envia frames de comando
//! e escuta os frames de conclusão (`!<id>/DONE;`).
//!
//! ## Disciplina de acks:
//!
//! Cada comando carrega um id; o controlador confirma a conclusão ecoando
//! esse id. O listener só faz uma coisa: registrar o último id confirmado
//! no [`AckRegister`] e acordar quem estiver esperando. Quem decide *qual*
//! id esperar (e por quanto tempo) é o chamador: o executor de missão ou
//! o despacho de comandos diretos do operador.
//!
//! Frames que não casam com o padrão de conclusão são logados e ignorados;
//! lixo na serial nunca trava o executor.
//!
//! ## Espaços de id:
//!
//! Comandos de missão contam a partir de 1, reiniciando a cada missão.
//! Comandos diretos do operador usam a metade superior do espaço de 32
//! bits, para que um comando direto disparado durante uma navegação nunca
//! colida com um id de missão.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};

use crate::context::AckRegister;
use crate::errors::ControlError;
use crate::protocol::{parse_motion_ack, MotionFrame};

/// Base do espaço de ids dos comandos diretos do operador.
pub const DIRECT_ID_BASE: u32 = 0x8000_0000;

/// Escritor serializado do canal de motores.
///
/// Vários contextos escrevem frames (executor de missão, comandos diretos);
/// o lock interno garante que cada frame sai inteiro.
pub struct MotionCommander {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    direct_ids: AtomicU32,
}

impl MotionCommander {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
            direct_ids: AtomicU32::new(0),
        }
    }

    /// Transmite um frame para o controlador.
    pub async fn send_frame(&self, frame: &MotionFrame) -> Result<(), ControlError> {
        let encoded = frame.encode();
        debug!(frame = %encoded.trim(), "Sending motion command");
        let mut writer = self.writer.lock().await;
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Próximo id da faixa reservada aos comandos diretos.
    pub fn next_direct_id(&self) -> u32 {
        DIRECT_ID_BASE + self.direct_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Espera, com limite de tempo, o registro de acks confirmar `id`.
///
/// O receiver deve ter sido inscrito antes do envio do comando: só acks
/// registrados *depois* da inscrição contam. Ignorar o valor corrente
/// protege contra um id igual deixado para trás por uma missão anterior
/// (os ids de missão recomeçam em 1); acks de outros comandos (por
/// exemplo, diretos) são pulados sem reiniciar o prazo.
pub async fn await_ack(
    rx: &mut watch::Receiver<u32>,
    id: u32,
    limit: Duration,
) -> Result<(), ControlError> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {
                let seen = *rx.borrow_and_update();
                if seen == id {
                    return Ok(());
                }
                debug!(seen, expected = id, "Skipping ack for another command");
            }
            Ok(Err(_)) => {
                return Err(ControlError::Transport(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "ack register closed",
                )))
            }
            Err(_) => return Err(ControlError::Timeout("motion ack")),
        }
    }
}

/// Atividade de longa duração: lê o canal dos motores linha a linha e
/// alimenta o registro de acks.
pub async fn run_motion_listener(
    reader: Box<dyn AsyncRead + Send + Unpin>,
    acks: std::sync::Arc<AckRegister>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_motion_ack(line) {
                    Some(id) => {
                        debug!(id, "Motion completion");
                        acks.record(id);
                    }
                    None => warn!(raw = line, "Ignoring unrecognised motion frame"),
                }
            }
            Ok(None) => {
                warn!("Motion channel reached EOF");
                break;
            }
            Err(e) => {
                error!(error = %e, "Motion channel read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_commander_writes_encoded_frames() {
        let (tx, mut rx) = tokio::io::duplex(256);
        let commander = MotionCommander::new(Box::new(tx));

        let frame = MotionFrame::from_command(1, &Command::MoveForward(10)).unwrap();
        commander.send_frame(&frame).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b":1/MOTOR/FWD/70/10;\n");
    }

    #[tokio::test]
    async fn test_direct_ids_live_in_top_half() {
        let (tx, _rx) = tokio::io::duplex(64);
        let commander = MotionCommander::new(Box::new(tx));
        let first = commander.next_direct_id();
        let second = commander.next_direct_id();
        assert_eq!(first, DIRECT_ID_BASE + 1);
        assert_eq!(second, DIRECT_ID_BASE + 2);
    }

    #[tokio::test]
    async fn test_listener_records_acks_and_skips_noise() {
        let (mut tx, rx) = tokio::io::duplex(256);
        let acks = Arc::new(AckRegister::new());
        let listener = tokio::spawn(run_motion_listener(Box::new(rx), acks.clone()));

        use tokio::io::AsyncWriteExt;
        tx.write_all(b"!1/DONE;\nstatus: battery low\n!2/DONE;\n")
            .await
            .unwrap();

        let mut watch = acks.subscribe();
        watch.wait_for(|&v| v == 2).await.unwrap();
        assert_eq!(acks.last(), 2);

        drop(tx); // EOF encerra o listener
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_await_ack_sees_matching_id() {
        let acks = Arc::new(AckRegister::new());
        let mut rx = acks.subscribe();
        let writer = {
            let acks = acks.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                acks.record(7); // ack de um comando direto concorrente
                acks.record(5);
            })
        };

        await_ack(&mut rx, 5, Duration::from_millis(500))
            .await
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_await_ack_ignores_value_recorded_before_subscribe() {
        let acks = AckRegister::new();
        acks.record(5); // sobra da missão anterior
        let mut rx = acks.subscribe();

        let err = await_ack(&mut rx, 5, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_await_ack_times_out_on_wrong_id() {
        let acks = AckRegister::new();
        let mut rx = acks.subscribe();
        acks.record(4); // ack de outro comando

        let err = await_ack(&mut rx, 5, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Timeout(_)));
    }
}

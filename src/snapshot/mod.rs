//! # Módulo de Snapshot - Fotografar, Subir, Classificar, Relatar
//!
//! Cada comando `SP<id>` do plano vira um worker descartável com um ciclo
//! de vida curto e bem definido:
//!
//! ```text
//!  1. captura a foto ────────────┐ (falha ⇒ registra 0 e morre)
//!  2. sinaliza captura concluída │ ← é isto que destrava o executor
//!  3. envia "ROBOT,x,y,DIR"      │
//!  4. sobe o JPEG (multipart)    │   tudo daqui para baixo corre em
//!  5. envia "TARGET,id,img"      │   paralelo com a navegação seguinte
//! ```
//!
//! A navegação só espera o passo 2; upload e classificação são café
//! requentado para ela: se falharem, a missão continua e o problema vai
//! para o log.
//!
//! ## Para todos entenderem o sinal de captura:
//!
//! O worker escreve o id do obstáculo no [`CaptureRegister`]; `0` é o
//! código de falha de câmera. O executor, inscrito *antes* do spawn, só
//! aceita o id que está esperando, então um worker atrasado de uma missão
//! antiga não consegue destravar (nem travar) a missão atual.

pub mod camera;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::CaptureRegister;
use crate::errors::ControlError;
use crate::operator::OperatorLink;
use crate::protocol::{robot_report, target_report, RecognitionResponse, SnapPosition};

use self::camera::Camera;

// ============================================================================
// CLIENTE DO IMAGE RECOGNISER
// ============================================================================

/// Contrato do serviço de reconhecimento de símbolos.
#[async_trait]
pub trait SymbolRecogniser: Send + Sync {
    async fn detect(
        &self,
        image: &Path,
        obstacle_id: u32,
    ) -> Result<RecognitionResponse, ControlError>;
}

/// Cliente HTTP do recogniser (`POST <base>/detect`, multipart).
pub struct HttpRecogniser {
    client: Client,
    url: String,
}

impl HttpRecogniser {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SymbolRecogniser for HttpRecogniser {
    async fn detect(
        &self,
        image: &Path,
        obstacle_id: u32,
    ) -> Result<RecognitionResponse, ControlError> {
        let bytes = tokio::fs::read(image).await?;
        let filename = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture.jpg".to_string());

        let form = Form::new()
            .part("image", Part::bytes(bytes).file_name(filename).mime_str("image/jpeg")?)
            .text("object_id", obstacle_id.to_string());

        debug!(url = %self.url, obstacle_id, "Uploading capture");
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()?;

        response
            .json()
            .await
            .map_err(|e| ControlError::protocol(format!("recogniser response: {e}")))
    }
}

fn classify(e: reqwest::Error) -> ControlError {
    if e.is_timeout() {
        ControlError::Timeout("image recogniser")
    } else {
        ControlError::Http(e)
    }
}

// ============================================================================
// WORKER DE SNAPSHOT
// ============================================================================

/// Argumento de um worker: só o necessário, copiado para dentro da task.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotTask {
    pub obstacle_id: u32,
    pub pose: SnapPosition,
}

/// Fábrica de workers de snapshot; um clone barato por spawn.
#[derive(Clone)]
pub struct SnapshotWorker {
    pub camera: Arc<dyn Camera>,
    pub recogniser: Arc<dyn SymbolRecogniser>,
    pub captures: Arc<CaptureRegister>,
    pub operator: OperatorLink,
    pub capture_dir: PathBuf,
}

impl SnapshotWorker {
    /// Dispara um worker descartável para `task`.
    pub fn spawn(&self, task: SnapshotTask) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move { worker.run(task).await })
    }

    async fn run(self, task: SnapshotTask) {
        let path = self
            .capture_dir
            .join(format!("capture_{}.jpg", task.obstacle_id));

        // 1-2: captura e sinalização. Só depois do sinal o executor anda.
        match self.camera.capture(&path).await {
            Ok(()) => {
                info!(obstacle_id = task.obstacle_id, path = %path.display(), "Capture complete");
                self.captures.record(task.obstacle_id);
            }
            Err(e) => {
                error!(obstacle_id = task.obstacle_id, error = %e, "Capture failed");
                self.captures.record(0);
                return;
            }
        }

        // 3: posição do robô no momento da foto, em convenção do operador.
        self.operator.send_status(&robot_report(&task.pose)).await;

        // 4-5: upload e classificação, já fora do caminho crítico.
        match self.recogniser.detect(&path, task.obstacle_id).await {
            Ok(response) => self.relay_recognition(task.obstacle_id, &response).await,
            Err(e) => {
                warn!(
                    obstacle_id = task.obstacle_id,
                    error = %e,
                    "Recognition round-trip failed, mission unaffected"
                );
            }
        }
    }

    /// Escolhe o primeiro objeto com identificador resolvível e relata.
    async fn relay_recognition(&self, obstacle_id: u32, response: &RecognitionResponse) {
        if response.count <= 0 {
            info!(obstacle_id, "Recogniser found no symbols");
            return;
        }
        for object in &response.objects {
            match object.resolve_image_id() {
                Some(img_id) => {
                    info!(obstacle_id, img_id, label = %object.class_label, "Symbol recognised");
                    self.operator
                        .send_status(&target_report(obstacle_id, img_id))
                        .await;
                    return;
                }
                None => {
                    warn!(
                        obstacle_id,
                        label = %object.class_label,
                        "Unresolved class label, trying next object"
                    );
                }
            }
        }
        warn!(obstacle_id, "No resolvable symbol in recogniser response");
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RecognisedObject;
    use super::camera::FakeCamera;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::Mutex;

    struct StubRecogniser {
        response: Result<RecognitionResponse, String>,
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl SymbolRecogniser for StubRecogniser {
        async fn detect(
            &self,
            _image: &Path,
            obstacle_id: u32,
        ) -> Result<RecognitionResponse, ControlError> {
            self.calls.lock().await.push(obstacle_id);
            self.response
                .clone()
                .map_err(ControlError::Protocol)
        }
    }

    struct JammedCamera;

    #[async_trait]
    impl Camera for JammedCamera {
        async fn capture(&self, _path: &Path) -> Result<(), ControlError> {
            Err(ControlError::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                "lens jammed",
            )))
        }
    }

    async fn capture_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rcc-snap-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    fn worker(
        camera: Arc<dyn Camera>,
        recogniser: Arc<dyn SymbolRecogniser>,
        captures: Arc<CaptureRegister>,
        dir: PathBuf,
    ) -> (SnapshotWorker, tokio::io::Lines<BufReader<tokio::io::DuplexStream>>) {
        let (operator_write, operator_read) = tokio::io::duplex(1024);
        let (link, _) = OperatorLink::start(Box::new(operator_write));
        (
            SnapshotWorker {
                camera,
                recogniser,
                captures,
                operator: link,
                capture_dir: dir,
            },
            BufReader::new(operator_read).lines(),
        )
    }

    #[tokio::test]
    async fn test_successful_capture_reports_robot_then_target() {
        let captures = Arc::new(CaptureRegister::new());
        let recogniser = Arc::new(StubRecogniser {
            response: Ok(RecognitionResponse {
                detected: 1,
                count: 1,
                objects: vec![RecognisedObject {
                    class_label: "Number 4".into(),
                    img_id: Some(14),
                }],
            }),
            calls: Mutex::new(vec![]),
        });
        let dir = capture_dir().await;
        let (worker, mut operator) =
            worker(Arc::new(FakeCamera), recogniser.clone(), captures.clone(), dir);

        let mut capture_rx = captures.subscribe();
        let handle = worker.spawn(SnapshotTask {
            obstacle_id: 3,
            pose: SnapPosition { x: 1, y: 2, d: 2 },
        });

        capture_rx.wait_for(|&v| v == 3).await.unwrap();
        handle.await.unwrap();

        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"ROBOT,2,3,E\"");
        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"TARGET,3,14\"");
        assert_eq!(recogniser.calls.lock().await.as_slice(), &[3]);
    }

    #[tokio::test]
    async fn test_capture_failure_signals_zero_and_stops() {
        let captures = Arc::new(CaptureRegister::new());
        let recogniser = Arc::new(StubRecogniser {
            response: Err("unreachable".into()),
            calls: Mutex::new(vec![]),
        });
        let dir = capture_dir().await;
        let (worker, _operator) =
            worker(Arc::new(JammedCamera), recogniser.clone(), captures.clone(), dir);

        let mut capture_rx = captures.subscribe();
        let handle = worker.spawn(SnapshotTask {
            obstacle_id: 7,
            pose: SnapPosition::SENTINEL,
        });

        capture_rx.changed().await.unwrap();
        assert_eq!(*capture_rx.borrow_and_update(), 0);
        handle.await.unwrap();

        // Nem upload nem TARGET depois de falha de captura.
        assert!(recogniser.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_recognition_failure_does_not_kill_mission_flow() {
        let captures = Arc::new(CaptureRegister::new());
        let recogniser = Arc::new(StubRecogniser {
            response: Err("http 500".into()),
            calls: Mutex::new(vec![]),
        });
        let dir = capture_dir().await;
        let (worker, mut operator) =
            worker(Arc::new(FakeCamera), recogniser, captures.clone(), dir);

        let handle = worker.spawn(SnapshotTask {
            obstacle_id: 5,
            pose: SnapPosition { x: 0, y: 0, d: 0 },
        });
        handle.await.unwrap();

        // A captura foi sinalizada e o ROBOT saiu mesmo sem classificação.
        assert_eq!(captures.last(), 5);
        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"ROBOT,1,1,N\"");
    }

    #[tokio::test]
    async fn test_unresolvable_labels_try_next_object() {
        let captures = Arc::new(CaptureRegister::new());
        let recogniser = Arc::new(StubRecogniser {
            response: Ok(RecognitionResponse {
                detected: 1,
                count: 2,
                objects: vec![
                    RecognisedObject {
                        class_label: "???".into(),
                        img_id: None,
                    },
                    RecognisedObject {
                        class_label: "Stop sign".into(),
                        img_id: None,
                    },
                ],
            }),
            calls: Mutex::new(vec![]),
        });
        let dir = capture_dir().await;
        let (worker, mut operator) =
            worker(Arc::new(FakeCamera), recogniser, captures.clone(), dir);

        worker
            .spawn(SnapshotTask {
                obstacle_id: 2,
                pose: SnapPosition { x: 0, y: 0, d: 4 },
            })
            .await
            .unwrap();

        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"ROBOT,1,1,S\"");
        // O rótulo desconhecido é pulado; o segundo resolve pela tabela.
        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"TARGET,2,40\"");
    }

    #[tokio::test]
    async fn test_zero_count_reports_nothing() {
        let captures = Arc::new(CaptureRegister::new());
        let recogniser = Arc::new(StubRecogniser {
            response: Ok(RecognitionResponse {
                detected: 0,
                count: 0,
                objects: vec![],
            }),
            calls: Mutex::new(vec![]),
        });
        let dir = capture_dir().await;
        let (worker, mut operator) =
            worker(Arc::new(FakeCamera), recogniser, captures.clone(), dir);

        worker
            .spawn(SnapshotTask {
                obstacle_id: 9,
                pose: SnapPosition { x: 3, y: 3, d: 6 },
            })
            .await
            .unwrap();

        assert_eq!(operator.next_line().await.unwrap().unwrap(), "\"ROBOT,4,4,W\"");
        // Sem TARGET: a próxima leitura ficaria pendente.
        let pending =
            tokio::time::timeout(Duration::from_millis(50), operator.next_line()).await;
        assert!(pending.is_err());
    }
}

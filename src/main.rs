//! # RCC - Centro de Controle do Robô Explorador
//!
//! Ponto de entrada do processo embarcado que coordena uma missão de
//! exploração: receber o mapa do operador, pedir a rota ao planner,
//! executar os comandos no controlador de motores com disciplina de ack,
//! fotografar obstáculos e devolver os símbolos reconhecidos.
//!
//! ## Arquitetura do processo:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          main.rs                             │
//! │      (CLI, telemetria, bring-up dos canais, supervisão)      │
//! └──────────────────────────────────────────────────────────────┘
//!        │                │                 │              │
//!        ▼                ▼                 ▼              ▼
//!  ┌──────────┐     ┌──────────┐     ┌──────────┐    ┌──────────┐
//!  │ operator │     │ executor │     │  motion  │    │ snapshot │
//!  │(listener │     │ (máquina │     │(listener │    │ (workers │
//!  │ + link)  │     │de estados│     │ de acks) │    │ por foto)│
//!  └──────────┘     └──────────┘     └──────────┘    └──────────┘
//!        └───────────────┴───── contexto compartilhado ────┘
//! ```
//!
//! ## Exemplo de uso:
//!
//! ```bash
//! # No robô, com hardware completo
//! rcc --mode real
//!
//! # Em uma máquina de desenvolvimento, tudo simulado por pipes locais
//! rcc --mode loopback --verbose
//!
//! # Motores reais, console do operador simulado
//! rcc --mode mixed --motion-device /dev/ttyACM1
//! ```

/// Configuração: modos de fiação, dispositivos, URLs e timeouts.
mod config;

/// Contexto compartilhado da missão e registros de sinalização.
mod context;

/// Taxonomia de erros do centro de controle.
mod errors;

/// A máquina de estados da missão (Idle → Planning → Navigating).
mod executor;

/// Canal do controlador de motores: comandos e acks.
mod motion;

/// Canal do operador: listener de entrada e link de saída.
mod operator;

/// Cliente do serviço de planejamento de rota.
mod planner;

/// Tipos e traduções das três fronteiras de protocolo.
mod protocol;

/// Política de reenvio do caminho de escrita ao operador.
mod retry;

/// Workers de snapshot, câmera e cliente do recogniser.
mod snapshot;

/// Bootstrap de tracing e OpenTelemetry.
mod telemetry;

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, Level};

use config::{Config, Endpoint, LinkMode, Overrides, BAUD_RATE};
use context::{AckRegister, CaptureRegister, MissionContext};
use executor::MissionExecutor;
use motion::{run_motion_listener, MotionCommander};
use operator::{OperatorLink, OperatorListener};
use planner::HttpRoutePlanner;
use snapshot::camera::{Camera, FakeCamera, RaspistillCamera};
use snapshot::{HttpRecogniser, SnapshotWorker};
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

/// Centro de controle de missão do robô explorador.
#[derive(Parser)]
#[command(name = "rcc")]
#[command(about = "Robot Control Centre - orquestrador de missões", long_about = None)]
struct Cli {
    /// Fiação dos canais externos (real, loopback ou mixed).
    #[arg(long, value_enum, default_value = "real")]
    mode: LinkMode,

    /// Dispositivo serial (modo real) ou base dos pipes do operador.
    #[arg(long)]
    operator_device: Option<String>,

    /// Dispositivo serial (real/mixed) ou base dos pipes dos motores.
    #[arg(long)]
    motion_device: Option<String>,

    /// URL do route planner (POST .../path).
    #[arg(long)]
    planner_url: Option<String>,

    /// URL do image recogniser (POST .../detect).
    #[arg(long)]
    recogniser_url: Option<String>,

    /// Diretório onde as fotos capturadas são gravadas.
    #[arg(long)]
    capture_dir: Option<PathBuf>,

    /// Habilita exportação de traces OpenTelemetry.
    #[arg(long, default_value = "false")]
    otel: bool,

    /// Endpoint do collector OTLP (senão, OTEL_EXPORTER_OTLP_ENDPOINT).
    #[arg(long)]
    otel_endpoint: Option<String>,

    /// Modo silencioso: apenas erros no console.
    #[arg(long, short = 's', default_value = "false")]
    silent: bool,

    /// Modo verbose: logs de debug.
    #[arg(long, short = 'v', default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.log_level = if cli.silent {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    if cli.otel {
        if let Some(endpoint) = &cli.otel_endpoint {
            telemetry_config.otlp_endpoint = Some(endpoint.clone());
        } else if telemetry_config.otlp_endpoint.is_none() {
            telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
        }
    }
    if let Err(e) = init_telemetry(telemetry_config) {
        eprintln!("Warning: failed to initialize telemetry: {e}");
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    let config = Config::resolve(
        cli.mode,
        Overrides {
            operator_device: cli.operator_device,
            motion_device: cli.motion_device,
            planner_url: cli.planner_url,
            recogniser_url: cli.recogniser_url,
            capture_dir: cli.capture_dir,
        },
    );
    info!(
        mode = ?config.mode,
        planner = %config.planner_url,
        recogniser = %config.recogniser_url,
        "Control centre starting"
    );

    let result = run_control_centre(config).await;
    shutdown_telemetry();
    result
}

/// Sobe os canais, monta as atividades e supervisiona até o desligamento.
async fn run_control_centre(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.capture_dir)
        .await
        .with_context(|| format!("creating capture dir {}", config.capture_dir.display()))?;

    let (operator_read, operator_write) = open_channel(&config.operator)
        .await
        .context("opening operator channel")?;
    let (motion_read, motion_write) = open_channel(&config.motion)
        .await
        .context("opening motion-controller channel")?;

    let ctx = Arc::new(MissionContext::new());
    let acks = Arc::new(AckRegister::new());
    let captures = Arc::new(CaptureRegister::new());
    let commander = Arc::new(MotionCommander::new(motion_write));
    let (link, writer_task) = OperatorLink::start(operator_write);

    let planner = Arc::new(HttpRoutePlanner::new(
        &config.planner_url,
        config.timeouts.planner,
    )?);
    let recogniser = Arc::new(HttpRecogniser::new(
        &config.recogniser_url,
        config.timeouts.recogniser,
    )?);
    let camera: Arc<dyn Camera> = if config.use_fake_camera() {
        Arc::new(FakeCamera)
    } else {
        Arc::new(RaspistillCamera)
    };

    let worker = SnapshotWorker {
        camera,
        recogniser,
        captures: captures.clone(),
        operator: link.clone(),
        capture_dir: config.capture_dir.clone(),
    };
    let executor = MissionExecutor {
        ctx: ctx.clone(),
        planner,
        commander: commander.clone(),
        acks: acks.clone(),
        captures,
        worker,
        operator: link.clone(),
        timeouts: config.timeouts,
    };
    let listener = OperatorListener::new(
        ctx,
        link,
        commander,
        acks.clone(),
        config.timeouts.motion_ack,
    );

    let operator_task = tokio::spawn(listener.run(operator_read));
    let motion_task = tokio::spawn(run_motion_listener(motion_read, acks));
    let executor_task = tokio::spawn(executor.run());
    info!("All activities running");

    // Qualquer atividade de longa duração que morra derruba o processo;
    // a recuperação é reiniciar (não há estado persistente a perder).
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested by signal"),
        _ = operator_task => error!("Operator listener terminated"),
        _ = motion_task => error!("Motion listener terminated"),
        _ = executor_task => error!("Mission executor terminated"),
        _ = writer_task => error!("Operator writer terminated"),
    }
    Ok(())
}

type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;
type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Abre um canal externo conforme o endpoint configurado.
async fn open_channel(endpoint: &Endpoint) -> anyhow::Result<(ChannelReader, ChannelWriter)> {
    match endpoint {
        Endpoint::Serial { device } => {
            let stream = tokio_serial::new(device, BAUD_RATE)
                .open_native_async()
                .with_context(|| format!("opening serial device {device}"))?;
            info!(device = %device, baud = BAUD_RATE, "Serial channel up");
            let (reader, writer) = tokio::io::split(stream);
            Ok((Box::new(reader), Box::new(writer)))
        }
        Endpoint::Pipes { inbound, outbound } => {
            ensure_fifo(inbound).await;
            ensure_fifo(outbound).await;
            // read_write evita o bloqueio de abertura de FIFO quando a
            // outra ponta ainda não está presente.
            let reader = tokio::net::unix::pipe::OpenOptions::new()
                .read_write(true)
                .open_receiver(inbound)
                .with_context(|| format!("opening pipe {}", inbound.display()))?;
            let writer = tokio::net::unix::pipe::OpenOptions::new()
                .read_write(true)
                .open_sender(outbound)
                .with_context(|| format!("opening pipe {}", outbound.display()))?;
            info!(inbound = %inbound.display(), outbound = %outbound.display(), "Pipe channel up");
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}

/// Cria o FIFO se ainda não existir (não faz mal se já existir).
async fn ensure_fifo(path: &std::path::Path) {
    let _ = tokio::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .await;
}

//! # Módulo de Configuração
//!
//! Resolve, a partir da CLI e de variáveis de ambiente, como o centro de
//! controle se liga ao mundo: quais dispositivos, quais serviços HTTP e
//! quais limites de tempo valem para cada espera.
//!
//! ## Modos de operação
//!
//! | Modo       | Canal do operador | Canal dos motores | Câmera     |
//! |------------|-------------------|-------------------|------------|
//! | `real`     | serial (BT)       | serial (USB)      | raspistill |
//! | `loopback` | named pipes       | named pipes       | fake       |
//! | `mixed`    | named pipes       | serial (USB)      | raspistill |
//!
//! O modo `loopback` permite exercitar o orquestrador inteiro em uma
//! máquina de desenvolvimento, sem robô; `mixed` mantém os motores reais
//! enquanto o console do operador é simulado por um pipe local.
//!
//! ## Variáveis de ambiente
//!
//! - `RCC_PLANNER_URL` / `RCC_RECOGNISER_URL`: endpoints dos serviços
//! - `RCC_OPERATOR_DEVICE` / `RCC_MOTION_DEVICE`: caminho do dispositivo
//!   (serial) ou base dos pipes (loopback)
//! - `RCC_CAPTURE_DIR`: diretório das fotos capturadas
//!
//! Flags da CLI têm precedência sobre o ambiente, que tem precedência
//! sobre os padrões do modo.

use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Baud rate dos canais seriais (8N1, modo canônico).
pub const BAUD_RATE: u32 = 115_200;

/// Seleção de fiação dos canais externos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LinkMode {
    /// Hardware completo: serial para operador e motores.
    Real,
    /// Tudo local via named pipes, câmera falsa.
    Loopback,
    /// Motores reais, operador via named pipe.
    Mixed,
}

/// Como abrir um canal externo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { device: String },
    /// Um par de FIFOs: `<base>.in` é lido, `<base>.out` é escrito.
    Pipes { inbound: PathBuf, outbound: PathBuf },
}

impl Endpoint {
    fn serial(device: impl Into<String>) -> Self {
        Self::Serial {
            device: device.into(),
        }
    }

    fn pipes(base: &str) -> Self {
        Self::Pipes {
            inbound: PathBuf::from(format!("{base}.in")),
            outbound: PathBuf::from(format!("{base}.out")),
        }
    }
}

/// Tabela de limites de tempo das esperas do orquestrador.
///
/// Os testes injetam tabelas encurtadas; os padrões valem em produção.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Espera por um ack do controlador de motores.
    pub motion_ack: Duration,
    /// Espera pela confirmação de captura de um snapshot.
    pub capture: Duration,
    /// Round-trip do route planner.
    pub planner: Duration,
    /// Round-trip do image recogniser.
    pub recogniser: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            motion_ack: Duration::from_secs(10),
            capture: Duration::from_secs(10),
            planner: Duration::from_secs(20),
            recogniser: Duration::from_secs(30),
        }
    }
}

/// Overrides vindos da CLI (ver `Cli` em `main.rs`).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub operator_device: Option<String>,
    pub motion_device: Option<String>,
    pub planner_url: Option<String>,
    pub recogniser_url: Option<String>,
    pub capture_dir: Option<PathBuf>,
}

/// Configuração resolvida do processo.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: LinkMode,
    pub operator: Endpoint,
    pub motion: Endpoint,
    pub planner_url: String,
    pub recogniser_url: String,
    pub capture_dir: PathBuf,
    pub timeouts: Timeouts,
}

impl Config {
    /// Resolve a configuração: CLI > ambiente > padrão do modo.
    pub fn resolve(mode: LinkMode, overrides: Overrides) -> Self {
        let operator_device = overrides
            .operator_device
            .or_else(|| std::env::var("RCC_OPERATOR_DEVICE").ok());
        let motion_device = overrides
            .motion_device
            .or_else(|| std::env::var("RCC_MOTION_DEVICE").ok());

        let operator = match mode {
            LinkMode::Real => {
                Endpoint::serial(operator_device.unwrap_or_else(|| "/dev/rfcomm0".into()))
            }
            LinkMode::Loopback | LinkMode::Mixed => {
                Endpoint::pipes(&operator_device.unwrap_or_else(|| "operator_link".into()))
            }
        };
        let motion = match mode {
            LinkMode::Real | LinkMode::Mixed => {
                Endpoint::serial(motion_device.unwrap_or_else(|| "/dev/ttyACM0".into()))
            }
            LinkMode::Loopback => {
                Endpoint::pipes(&motion_device.unwrap_or_else(|| "motion_link".into()))
            }
        };

        let planner_url = overrides
            .planner_url
            .or_else(|| std::env::var("RCC_PLANNER_URL").ok())
            .unwrap_or_else(|| "http://192.168.22.24:5000/path".into());
        let recogniser_url = overrides
            .recogniser_url
            .or_else(|| std::env::var("RCC_RECOGNISER_URL").ok())
            .unwrap_or_else(|| "http://192.168.22.21:5000/detect".into());
        let capture_dir = overrides
            .capture_dir
            .or_else(|| std::env::var("RCC_CAPTURE_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("captures"));

        Self {
            mode,
            operator,
            motion,
            planner_url,
            recogniser_url,
            capture_dir,
            timeouts: Timeouts::default(),
        }
    }

    /// A câmera real só existe quando há robô de verdade por baixo.
    pub fn use_fake_camera(&self) -> bool {
        self.mode == LinkMode::Loopback
    }
}

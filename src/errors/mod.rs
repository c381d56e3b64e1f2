//! # Módulo de Erros do Centro de Controle
//!
//! Define a taxonomia de erros usada por todas as atividades do robô.
//!
//! ## Para todos entenderem:
//!
//! Quando algo dá errado durante uma missão, precisamos saber *que tipo*
//! de problema aconteceu, porque cada tipo tem uma reação diferente:
//!
//! | Categoria  | Exemplo                               | Reação                      |
//! |------------|---------------------------------------|-----------------------------|
//! | Transport  | Cabo serial caiu, HTTP não conectou   | Logar, missão volta a Idle  |
//! | Protocol   | JSON malformado, frame irreconhecível | Logar, frame descartado     |
//! | Timeout    | Motor não confirmou em 10 s           | Navegação interrompida      |
//! | Busy       | Nova missão com outra em andamento    | Rejeitada com ack de erro   |
//! | Capture    | Câmera falhou ao fotografar           | Navegação interrompida      |
//!
//! Não existe retry automático de missão: toda recuperação local se limita
//! a devolver o contexto para Idle. A única exceção é o envio ao console
//! do operador, que tenta de novo algumas vezes (ver módulo `retry`).

use thiserror::Error;

/// Erro estruturado do centro de controle.
///
/// Cada variante corresponde a uma categoria da taxonomia acima.
/// Conversões automáticas (`#[from]`) cobrem as fontes mais comuns:
/// I/O de canal e round-trips HTTP.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Falha de leitura/escrita em um canal (serial, pipe).
    #[error("channel transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// Falha em um round-trip HTTP (planner ou recogniser).
    #[error("http round-trip failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Frame ou payload que não segue o protocolo esperado.
    #[error("malformed frame: {0}")]
    Protocol(String),

    /// Espera limitada que estourou (ack de motor, captura, etc).
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Missão recebida fora da fase Idle.
    #[error("robot is busy")]
    Busy,

    /// A câmera sinalizou falha de captura para um obstáculo.
    #[error("image capture failed for obstacle {0}")]
    Capture(u32),
}

impl ControlError {
    /// Nome curto da categoria, usado em logs estruturados.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Http(_) => "http",
            Self::Protocol(_) => "protocol",
            Self::Timeout(_) => "timeout",
            Self::Busy => "busy",
            Self::Capture(_) => "capture",
        }
    }

    /// Atalho para erros de protocolo com mensagem formatada.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

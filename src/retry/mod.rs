//! # Módulo de Retry - Reenvio com Pausa
//!
//! Implementa a política de reenvio usada pelo caminho de escrita para o
//! console do operador.
//!
//! ## Para todos entenderem:
//!
//! O canal sem fio do operador às vezes engasga por um instante. Como o
//! operador é o único canal de relatório que existe, vale a pena insistir
//! um pouco antes de desistir de uma mensagem:
//!
//! - Tenta escrever.
//! - Falhou? Espera 300 ms e tenta de novo.
//! - Até 3 tentativas no total; depois disso a falha é definitiva e vai
//!   só para o log.
//!
//! A pausa é fixa (não exponencial): o objetivo é atravessar um soluço
//! momentâneo do canal, não poupar um servidor sobrecarregado.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Política de reenvio com número de tentativas e pausa fixa.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub pause: Duration,
}

impl BackoffPolicy {
    /// Política do envio confirmado ao operador: 3 × 300 ms.
    pub const OPERATOR_SEND: Self = Self {
        max_attempts: 3,
        pause: Duration::from_millis(300),
    };

    /// Executa `operation` até obter sucesso ou esgotar as tentativas.
    ///
    /// A closure é chamada de novo a cada tentativa (`FnMut`), e o erro da
    /// última tentativa é devolvido ao chamador.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        what = %what,
                        attempts = attempt,
                        error = %e,
                        "All attempts exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        what = %what,
                        attempt = attempt,
                        pause_ms = self.pause.as_millis() as u64,
                        error = %e,
                        "Attempt failed, pausing before retry"
                    );
                    sleep(self.pause).await;
                    attempt += 1;
                }
            }
        }
    }
}

//! # Módulo do Route Planner - Cliente do Serviço de Rotas
//!
//! Faz o round-trip de planejamento: envia obstáculos + pose inicial,
//! recebe a lista ordenada de comandos e as poses de snapshot.
//!
//! A interface é um trait para que o executor de missão possa ser
//! exercitado nos testes com um planner de mentira; a implementação real
//! é um POST JSON com timeout limitado. Falha de rede, resposta não-2xx
//! ou payload que não decodifica têm o mesmo efeito do ponto de vista da
//! missão: ela é descartada e o robô volta a Idle (sem retry automático).

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::errors::ControlError;
use crate::protocol::{Plan, RouteRequest, RouteResponse};

/// Contrato do serviço de planejamento de rota.
#[async_trait]
pub trait RoutePlanner: Send + Sync {
    async fn plan_route(&self, request: &RouteRequest) -> Result<Plan, ControlError>;
}

/// Cliente HTTP do planner (`POST <base>/path`).
pub struct HttpRoutePlanner {
    client: Client,
    url: String,
}

impl HttpRoutePlanner {
    /// Cria o cliente com o timeout de round-trip embutido.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RoutePlanner for HttpRoutePlanner {
    async fn plan_route(&self, request: &RouteRequest) -> Result<Plan, ControlError> {
        debug!(url = %self.url, obstacles = request.obstacles.len(), "Requesting route");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()?;

        let envelope: RouteResponse = response
            .json()
            .await
            .map_err(|e| ControlError::protocol(format!("planner response: {e}")))?;
        envelope.data.into_plan()
    }
}

fn classify(e: reqwest::Error) -> ControlError {
    if e.is_timeout() {
        ControlError::Timeout("route planner")
    } else {
        ControlError::Http(e)
    }
}

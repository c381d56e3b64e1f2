//! # Módulo de Telemetria
//!
//! Inicializa o logging estruturado (`tracing`) e, opcionalmente, a
//! exportação de traces via OpenTelemetry.
//!
//! ## Para todos entenderem:
//!
//! O robô roda longe da bancada. Logs estruturados no console servem para
//! desenvolvimento; em campo, apontar o exporter OTLP para um collector na
//! rede da arena permite acompanhar cada missão (fases, comandos, acks,
//! uploads) de fora do robô.
//!
//! Sem endpoint configurado, só o console é usado; nenhuma dependência de
//! rede é tocada.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuração do sistema de telemetria.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Nome do serviço nos traces.
    pub service_name: String,
    /// Endpoint OTLP (gRPC). `None` = apenas console.
    pub otlp_endpoint: Option<String>,
    /// Taxa de sampling (0.0 a 1.0).
    pub sampling_ratio: f64,
    /// Nível mínimo de log quando `RUST_LOG` não está definido.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "robot-control-centre".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Lê a configuração das variáveis `OTEL_*` padrão.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }
        if let Ok(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
            if let Ok(r) = ratio.parse::<f64>() {
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }

        config
    }
}

/// Inicializa tracing-subscriber com fmt compacto e, se configurado, a
/// layer OpenTelemetry.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(endpoint) = &config.otlp_endpoint {
        let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;
        tracing_subscriber::registry()
            .with(env_filter)
            .with(OpenTelemetryLayer::new(tracer.clone()))
            .with(tracing_subscriber::fmt::layer().compact())
            .init();

        tracing::info!(
            service_name = %config.service_name,
            endpoint = %endpoint,
            "Telemetria OTEL inicializada"
        );
        Ok(Some(tracer))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();

        tracing::info!("Telemetria inicializada (apenas console)");
        Ok(None)
    }
}

fn init_otlp_tracer(
    service_name: &str,
    endpoint: &str,
    sampling_ratio: f64,
) -> anyhow::Result<Tracer> {
    let sampler = if sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_ratio)
    };

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

/// Flush final dos traces pendentes; chamar antes de encerrar o processo.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

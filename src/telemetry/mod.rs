//! # Módulo de Telemetria
//!
//! Configura o `tracing` do renovador. Como ele roda sem ninguém olhando
//! (cron, systemd timer), os logs são a única forma de saber o que
//! aconteceu em uma execução que falhou de madrugada.
//!
//! ## Destinos suportados:
//!
//! 1. **Console**: formato compacto, com cores
//! 2. **Arquivo**: mesmas linhas, sem ANSI, anexadas ao arquivo de log
//! 3. **OTLP**: spans exportados para um coletor OpenTelemetry (opcional)
//!
//! Os três podem estar ativos ao mesmo tempo.
//!
//! ## Configuração via variáveis de ambiente:
//!
//! - `RUST_LOG`: Filtro de nível (padrão: info)
//! - `RENEWER_LOG_FILE`: Caminho do arquivo de log
//! - `OTEL_SERVICE_NAME`: Nome do serviço
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: URL do coletor OTLP
//! - `OTEL_TRACES_SAMPLER_ARG`: Taxa de sampling (0.0-1.0)
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! let config = TelemetryConfig {
//!     log_file: Some(PathBuf::from("renewal.log")),
//!     ..TelemetryConfig::from_env()
//! };
//!
//! init_telemetry(config)?;
//!
//! // ... executar a renovação ...
//!
//! shutdown_telemetry(); // Flush dos spans
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
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
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CONFIGURAÇÃO
// ============================================================================

/// Configuração do sistema de telemetria.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Nome do serviço para identificação nos traces.
    pub service_name: String,

    /// Endpoint OTLP para envio de traces.
    /// Exemplo: "http://localhost:4317" (gRPC)
    /// Se None, nenhum span é exportado.
    pub otlp_endpoint: Option<String>,

    /// Taxa de sampling (0.0 a 1.0).
    pub sampling_ratio: f64,

    /// Se deve habilitar logging para console.
    pub enable_console_logging: bool,

    /// Arquivo de log (aberto em modo append).
    pub log_file: Option<PathBuf>,

    /// Nível de log mínimo quando `RUST_LOG` não está definido.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "renewer".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_file: None,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Cria configuração a partir de variáveis de ambiente.
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
                // Garante que o valor está entre 0.0 e 1.0.
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }

        if let Ok(path) = std::env::var("RENEWER_LOG_FILE") {
            if !path.trim().is_empty() {
                config.log_file = Some(PathBuf::from(path));
            }
        }

        config
    }
}

// ============================================================================
// INICIALIZAÇÃO
// ============================================================================

/// Inicializa o subscriber global.
///
/// ## Retorno:
///
/// - `Ok(Some(Tracer))`: OTLP configurado
/// - `Ok(None)`: Apenas console e/ou arquivo
/// - `Err`: Arquivo de log inacessível, exporter inválido ou subscriber já instalado
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    // RUST_LOG tem prioridade sobre o nível configurado.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let tracer = match &config.otlp_endpoint {
        Some(endpoint) => Some(init_otlp_tracer(
            &config.service_name,
            endpoint,
            config.sampling_ratio,
        )?),
        None => None,
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let console_layer = config
        .enable_console_logging
        .then(|| fmt::layer().compact().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracer.clone().map(OpenTelemetryLayer::new))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    match (&config.otlp_endpoint, &config.log_file) {
        (Some(endpoint), _) => tracing::info!(
            service_name = %config.service_name,
            endpoint = %endpoint,
            sampling_ratio = config.sampling_ratio,
            "Telemetria OTEL inicializada"
        ),
        (None, Some(path)) => tracing::info!(log_file = %path.display(), "Telemetria inicializada (console + arquivo)"),
        (None, None) => tracing::debug!("Telemetria inicializada (apenas console)"),
    }

    Ok(tracer)
}

// ============================================================================
// TRACER OTLP
// ============================================================================

/// Cria um tracer com OTLP exporter (gRPC, envio em lotes).
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

// ============================================================================
// ENCERRAMENTO
// ============================================================================

/// Encerra o sistema de telemetria, enviando spans pendentes.
///
/// **IMPORTANTE**: chamar antes de `std::process::exit`, que não roda
/// destrutores.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    tracing::debug!("Telemetria encerrada");
}

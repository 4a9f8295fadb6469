//! Logging initialization and shutdown.

use std::sync::OnceLock;

use opentelemetry::{global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
};
use tracing::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    filter::Directive, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer,
};

use super::types::{LoggerConfig, OtlpExportConfig};

/// Targets that are far too chatty at INFO.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "h2=warn", "alloy_transport_http=warn"];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

fn build_filter() -> EnvFilter {
    let mut filt = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    for target in QUIET_TARGETS {
        if let Ok(directive) = target.parse::<Directive>() {
            filt = filt.add_directive(directive);
        }
    }

    filt
}

fn build_tracer_provider(
    config: &LoggerConfig,
    otlp: &OtlpExportConfig,
) -> Result<SdkTracerProvider, opentelemetry::trace::TraceError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&otlp.endpoint)
        .with_timeout(otlp.timeout);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(Config::default().with_resource(config.build_resource()))
        .install_batch(Tokio)
}

/// Installs the global subscriber.
///
/// Must be called from within a tokio runtime when OTLP export is configured.
pub fn init(config: LoggerConfig) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let filt = build_filter();

    let stdout_layer = if config.stdout.json_format {
        layer()
            .json()
            .with_span_events(config.stdout.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    } else {
        layer()
            .compact()
            .with_span_events(config.stdout.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    };

    let file_layer = config.file.as_ref().map(|file_config| {
        let appender = RollingFileAppender::new(
            file_config.rotation.clone(),
            &file_config.directory,
            &file_config.file_name_prefix,
        );

        if file_config.json_format {
            layer()
                .json()
                .with_writer(appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        } else {
            layer()
                .compact()
                .with_writer(appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        }
    });

    // The subscriber is not installed yet, so a pipeline failure is reported after init.
    let mut otlp_failure = None;
    let otel_layer = config.otlp.as_ref().and_then(|otlp| {
        match build_tracer_provider(&config, otlp) {
            Ok(provider) => {
                let tracer = provider.tracer("validity-proposer");
                let _ = TRACER_PROVIDER.set(provider);
                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            }
            Err(err) => {
                otlp_failure = Some(err);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .init();

    if let Some(err) = otlp_failure {
        error!(%err, "failed to start otlp exporter, continuing without it");
    }

    info!(
        service_name = %config.service_name,
        service_version = ?config.service_version,
        file_logging = config.file.is_some(),
        otlp = config.otlp.is_some(),
        "logging initialized"
    );
}

/// Flushes pending spans and tears down the exporter, if any.
pub fn finalize() {
    info!("shutting down logging");

    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            error!(?err, "failed to shut down tracer provider");
        }
    }

    global::shutdown_tracer_provider();
}

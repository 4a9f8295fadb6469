//! Configuration types for the logging subsystem.

use std::{path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;

/// Service name used when none is configured.
const DEFAULT_SERVICE_NAME: &str = "validity-proposer";

/// Stdout layer settings.
#[derive(Debug, Clone)]
pub struct StdoutConfig {
    /// Emit JSON lines instead of the compact human format.
    pub json_format: bool,
    /// Span lifecycle events to log.
    pub fmt_span: FmtSpan,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            // stage spans are short, only their close (with timing) is interesting
            fmt_span: FmtSpan::CLOSE,
        }
    }
}

/// Rolling file output.
#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,
    /// Base file name, e.g. `"proposer"` produces `proposer.2024-05-01`.
    pub file_name_prefix: String,
    pub rotation: Rotation,
    pub json_format: bool,
}

impl FileLoggingConfig {
    pub fn new(directory: PathBuf, file_name_prefix: impl Into<String>) -> Self {
        Self {
            directory,
            file_name_prefix: file_name_prefix.into(),
            rotation: Rotation::DAILY,
            json_format: false,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_json_format(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }
}

/// OTLP exporter settings.
#[derive(Debug, Clone)]
pub struct OtlpExportConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl OtlpExportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Top level logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    /// Extra attributes attached to exported spans, e.g. the L2 chain id.
    pub resource_attributes: Vec<KeyValue>,
    pub stdout: StdoutConfig,
    pub file: Option<FileLoggingConfig>,
    pub otlp: Option<OtlpExportConfig>,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            resource_attributes: Vec::new(),
            stdout: StdoutConfig::default(),
            file: None,
            otlp: None,
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.stdout.json_format = enabled;
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    pub fn with_otlp(mut self, config: OtlpExportConfig) -> Self {
        self.otlp = Some(config);
        self
    }

    pub fn with_resource_attribute(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.resource_attributes
            .push(KeyValue::new(key, value.into()));
        self
    }

    /// Builds the OpenTelemetry resource describing this process.
    pub fn build_resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.name", self.service_name.clone())];

        if let Some(version) = &self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }

        attributes.extend(self.resource_attributes.iter().cloned());
        Resource::new(attributes)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

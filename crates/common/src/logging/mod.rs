//! Logging subsystem: stdout, optional rolling file output and optional OTLP export.

pub mod manager;
pub mod types;


pub use manager::{finalize, init};
pub use types::{FileLoggingConfig, LoggerConfig, OtlpExportConfig, StdoutConfig};

pub use tracing_appender::rolling::Rotation;

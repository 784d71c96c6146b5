use crate::config::ConfigError;
use crate::screening::CatalogLoadError;
use crate::telemetry::TelemetryError;

/// Top-level failure surface for the binary's startup and CLI paths. HTTP
/// responses map `ScreeningError` directly in the router.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("question catalog error: {0}")]
    Catalog(#[from] CatalogLoadError),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SvgDeckError>;

/// Document-level failures. Anything wrong with a single element is recovered
/// from locally and never reaches this type.
#[derive(Debug, Error)]
pub enum SvgDeckError {
    #[error("malformed svg document: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("cannot decode svg document: {0}")]
    Encoding(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("asset error: {0}")]
    Asset(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the external style & geometry oracle. These are logged by the
/// converter, which then continues without oracle data.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle protocol violation: {0}")]
    Protocol(String),
    #[error("oracle payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

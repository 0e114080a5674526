use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("alert error: {0}")]
    Alert(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type OpsResult<T = (), E = OpsError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("CLI error: {0}")]
    Cli(#[from] clap::error::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
    #[error("Command error: {0}")]
    Command(#[from] std::io::Error),
    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
    #[error("git operation failed: {0}")]
    Git(String),
    #[error("build failed: {0}")]
    Build(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("record storage error: {0}")]
    Storage(String),
}

impl From<Box<dyn std::error::Error>> for OpsError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        OpsError::Runtime(anyhow::anyhow!("{:#?}", err))
    }
}

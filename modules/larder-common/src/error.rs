use thiserror::Error;

#[derive(Error, Debug)]
pub enum LarderError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

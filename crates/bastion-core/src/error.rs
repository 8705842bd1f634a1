use thiserror::Error;

#[derive(Debug, Error)]
pub enum BastionError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BastionError {
    /// Short error code string reported to operators.
    pub fn code(&self) -> &'static str {
        match self {
            BastionError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BastionError>;

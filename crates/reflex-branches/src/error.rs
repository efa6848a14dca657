use thiserror::Error;

#[derive(Debug, Error)]
pub enum BranchError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Unknown branch category: {0}")]
    UnknownCategory(String),
}

pub type Result<T> = std::result::Result<T, BranchError>;

use fedsearch_operators::OpError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Invalid clause: {0}")]
    InvalidClause(String),

    #[error("YAML clause error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Op(#[from] OpError),
}

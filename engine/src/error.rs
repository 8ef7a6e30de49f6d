use thiserror::Error;

use optionpool_types::{DomainError, RuleViolation};

/// Failure of an engine operation.
///
/// `Domain` errors are user-facing and carry a code, message key and
/// details payload. `Storage` errors are infrastructure failures; the unit
/// of work they interrupted has been rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    #[must_use]
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            Self::Storage(_) => None,
        }
    }

    #[must_use]
    pub fn rule(&self) -> Option<&RuleViolation> {
        match self {
            Self::Domain(DomainError::Rule(rule)) => Some(rule),
            _ => None,
        }
    }
}

impl From<RuleViolation> for EngineError {
    fn from(rule: RuleViolation) -> Self {
        Self::Domain(DomainError::Rule(rule))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::llm::{ClassificationError, LlmGatewayError};
use crate::models::{AuditStatus, EventType};
use crate::repos::StoreError;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),
    #[error("raw text must not be empty")]
    EmptyInput,
    #[error("classification provider call failed: {0}")]
    ClassificationApiFailure(#[source] LlmGatewayError),
    #[error("classification response could not be parsed: {reason}")]
    ClassificationParseFailure { reason: String, raw_response: String },
    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] StoreError),
    #[error("event data is {actual} but event type is {expected}")]
    EventTypeMismatch {
        expected: EventType,
        actual: EventType,
    },
    #[error("audit status cannot be set to {}", .0.as_str())]
    InvalidStatusTransition(AuditStatus),
    #[error("candidate {index} is out of range ({available} available)")]
    CandidateOutOfRange { index: usize, available: usize },
}

impl From<ClassificationError> for IntakeError {
    fn from(err: ClassificationError) -> Self {
        match err {
            ClassificationError::ApiFailure(source) => Self::ClassificationApiFailure(source),
            ClassificationError::ParseFailure {
                reason,
                raw_response,
            } => Self::ClassificationParseFailure {
                reason,
                raw_response,
            },
            ClassificationError::Prompt(reason) => Self::ClassificationParseFailure {
                reason,
                raw_response: String::new(),
            },
        }
    }
}

impl IntakeError {
    /// Stable label for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::EmptyInput => "empty_input",
            Self::ClassificationApiFailure(_) => "classification_api_failure",
            Self::ClassificationParseFailure { .. } => "classification_parse_failure",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::EventTypeMismatch { .. } => "event_type_mismatch",
            Self::InvalidStatusTransition(_) => "invalid_status_transition",
            Self::CandidateOutOfRange { .. } => "candidate_out_of_range",
        }
    }
}

pub mod audit;
pub mod error;
pub mod persist;
pub mod pipeline;

pub use audit::{AuditOutcome, AuditRecorder};
pub use error::IntakeError;
pub use persist::EventPersister;
pub use pipeline::{
    IntakeOutcome, IntakePipeline, IntakeRequest, OutcomeSource, PendingConfirmation,
};

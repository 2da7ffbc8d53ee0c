use chrono::NaiveDate;

use crate::models::TrainId;

/// Coarse classification of a [`CoreError`], used by the boundary to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; rejected before any inventory mutation.
    Validation,
    /// The request conflicts with existing state; nothing was changed.
    Conflict,
    NotFound,
    /// Payment collaborator refused or failed.
    Payment,
    /// A broken inventory invariant. Never corrected silently.
    Integrity,
    /// A backing service (lock store, database) could not serve the request in time.
    Unavailable,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid date format: {0}. Use YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Station {0} is not on route")]
    NotOnRoute(String),
    #[error("Invalid direction: position {from} does not precede position {to}")]
    InvalidDirection { from: i32, to: i32 },
    #[error("Invalid route: {0}")]
    InvalidRoute(String),
    #[error("Train {train_id} is not scheduled for {date}")]
    TrainNotScheduled { train_id: TrainId, date: NaiveDate },
    #[error("Date cannot be in the past: {0}")]
    DateInPast(NaiveDate),

    #[error("Train not found: {0}")]
    TrainNotFound(String),
    #[error("Route not found: {0}")]
    RouteNotFound(i64),
    #[error("Ticket not found: {0}")]
    NotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Ticket already cancelled: {0}")]
    AlreadyCancelled(String),
    #[error("Train {train_id} already scheduled for {date}")]
    DuplicateSchedule { train_id: TrainId, date: NaiveDate },
    #[error("Duplicate PNR: {0}")]
    DuplicatePnr(String),
    #[error("Train number already registered: {0}")]
    DuplicateTrain(String),
    #[error("Transaction already settled: {0}")]
    AlreadySettled(String),
    #[error("Invalid ticket state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Payment gateway failure: {0}")]
    Gateway(String),
    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Inventory integrity violation: {0}")]
    Integrity(String),

    #[error("Seat lock unavailable: {0}")]
    LockTimeout(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidDate(_)
            | CoreError::NotOnRoute(_)
            | CoreError::InvalidDirection { .. }
            | CoreError::InvalidRoute(_)
            | CoreError::TrainNotScheduled { .. }
            | CoreError::DateInPast(_) => ErrorKind::Validation,
            CoreError::TrainNotFound(_)
            | CoreError::RouteNotFound(_)
            | CoreError::NotFound(_)
            | CoreError::TransactionNotFound(_) => ErrorKind::NotFound,
            CoreError::AlreadyCancelled(_)
            | CoreError::DuplicateSchedule { .. }
            | CoreError::DuplicatePnr(_)
            | CoreError::DuplicateTrain(_)
            | CoreError::AlreadySettled(_)
            | CoreError::InvalidTransition { .. } => ErrorKind::Conflict,
            CoreError::Gateway(_) | CoreError::PaymentRejected(_) => ErrorKind::Payment,
            CoreError::Integrity(_) => ErrorKind::Integrity,
            CoreError::LockTimeout(_) => ErrorKind::Unavailable,
            CoreError::Storage(_) => ErrorKind::Internal,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

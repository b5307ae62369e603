use serde::Serialize;
use sled::transaction::TransactionError;

/// A single rejected field in an incoming request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every violation found in a request body, reported together.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request: {} field(s) rejected", .violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Order not found")]
    OrderNotFound,
    #[error("Order details do not match")]
    OrderMismatch,
    #[error("Order already paid")]
    OrderAlreadyPaid,
    #[error("Receipt code already used")]
    DuplicateReceipt,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Payment confirmation not found")]
    ConfirmationNotFound,
    #[error("Payment confirmation already processed")]
    AlreadyProcessed,
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record encoding failure: {0}")]
    Codec(String),
}

impl PaymentError {
    /// Failures caused by the backing store rather than by the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, PaymentError::Storage(_) | PaymentError::Codec(_))
    }
}

impl From<TransactionError<PaymentError>> for PaymentError {
    fn from(value: TransactionError<PaymentError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => PaymentError::Storage(err),
        }
    }
}

impl From<minicbor::decode::Error> for PaymentError {
    fn from(value: minicbor::decode::Error) -> Self {
        PaymentError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for PaymentError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        PaymentError::Codec(value.to_string())
    }
}

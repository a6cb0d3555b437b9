//! Scheduler error types.

use thiserror::Error;

/// Errors raised by the scheduler core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid sample for {resource_id}: {reason}")]
    InvalidSample { resource_id: String, reason: String },

    #[error("insufficient history for {resource_id}: {available} samples, need {required}")]
    InsufficientHistory {
        resource_id: String,
        available: usize,
        required: usize,
    },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("unknown pricing class: {0}")]
    UnknownPricingClass(String),

    #[error("action rejected for {resource_id}: action {in_flight} already in flight")]
    ActionRejected {
        resource_id: String,
        in_flight: String,
    },

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider fatal error: {0}")]
    ProviderFatal(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<ProviderError> for SchedulerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => SchedulerError::ProviderTransient(msg),
            ProviderError::Fatal(msg) => SchedulerError::ProviderFatal(msg),
        }
    }
}

/// Errors returned by cloud provider bindings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, rate limits and server-side hiccups; safe to retry
    #[error("transient: {0}")]
    Transient(String),

    /// Invalid spec, quota exceeded and other permanent rejections
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

use thiserror::Error;

/// Failures that abort a single reconciliation cycle.
///
/// Everything else the cycle can survive is handled in place: transient
/// provider errors during check-in or availability queries fall back to
/// documented assumptions, malformed persisted state degrades to zero
/// entitlement, and a failed secret write only costs bookkeeping accuracy.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("unable to determine number of active nodes: {0}")]
    Demand(#[source] anyhow::Error),
    #[error("unable to check out {amount} license(s): {source}")]
    Acquisition {
        amount: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("unable to push user notification: {0}")]
    Notification(#[source] anyhow::Error),
    #[error("unable to publish compliance document: {0}")]
    Publish(#[source] anyhow::Error),
}

pub type CycleResult<T> = Result<T, CycleError>;

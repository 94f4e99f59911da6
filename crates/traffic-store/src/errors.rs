use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum TrafficError {
    #[error("traffic store unavailable: {0}")]
    Unavailable(String),
    #[error("traffic store call timed out")]
    Timeout,
    #[error("traffic reporter is shut down")]
    Closed,
    #[error("internal error: {0}")]
    Internal(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// A period token outside the closed selector set.
    #[error("invalid period selector: {0:?}")]
    InvalidSelector(String),

    /// A caller-supplied reference instant that is not RFC 3339.
    #[error("invalid reference instant {0:?}: expected RFC 3339")]
    InvalidInstant(String),
}

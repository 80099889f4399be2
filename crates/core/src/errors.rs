use thiserror::Error;

/// Failures rooted in salon business rules, independent of storage or
/// transport concerns.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown draft `{0}`")]
    UnknownDraft(String),
    #[error("draft `{0}` has no message text to send")]
    EmptyDraft(String),
    #[error("unknown client `{0}`")]
    UnknownClient(i64),
    #[error("no client matched `{0}`")]
    ClientNotMatched(String),
    #[error("feedback is required to regenerate a draft")]
    MissingFeedback,
    #[error("invalid booking time range: start {start_min} with end {end_min}")]
    InvalidTimeRange { start_min: u16, end_min: u16 },
}

/// Failures at the application layer: domain rules plus the services the
/// application orchestrates (persistence, model calls, delivery).
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Failures shaped for an interface boundary (HTTP, CLI). Carries a
/// correlation id so operators can tie a user-visible error back to logs.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("bad request [{correlation_id}]: {message}")]
    BadRequest { correlation_id: String, message: String },
    #[error("resource not found [{correlation_id}]: {message}")]
    NotFound { correlation_id: String, message: String },
    #[error("upstream unavailable [{correlation_id}]: {message}")]
    UpstreamUnavailable { correlation_id: String, message: String },
    #[error("internal error [{correlation_id}]: {message}")]
    Internal { correlation_id: String, message: String },
}

impl InterfaceError {
    pub fn from_application(error: ApplicationError, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        match error {
            ApplicationError::Domain(domain) => match domain {
                DomainError::UnknownDraft(_)
                | DomainError::UnknownClient(_)
                | DomainError::ClientNotMatched(_) => {
                    Self::NotFound { correlation_id, message: domain.to_string() }
                }
                other => Self::BadRequest { correlation_id, message: other.to_string() },
            },
            ApplicationError::Integration(message) => {
                Self::UpstreamUnavailable { correlation_id, message }
            }
            ApplicationError::Persistence(message)
            | ApplicationError::Configuration(message) => {
                Self::Internal { correlation_id, message }
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::UpstreamUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// Message safe to show to an end user. Internal details stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } | Self::NotFound { message, .. } => message.clone(),
            Self::UpstreamUnavailable { correlation_id, .. } => format!(
                "An upstream service is unavailable. Reference: {correlation_id}"
            ),
            Self::Internal { correlation_id, .. } => {
                format!("Something went wrong on our side. Reference: {correlation_id}")
            }
        }
    }
}

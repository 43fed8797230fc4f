use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExplorerError {
    #[error("request to {endpoint} failed: {message}")]
    NetworkFailure { endpoint: String, message: String },

    #[error("{endpoint} returned a malformed response: {message}")]
    Decode { endpoint: String, message: String },

    #[error("no {what} found")]
    EmptyResult { what: String },

    #[error("request was superseded")]
    CancelledRequest,

    #[error("coordinate bounds have zero extent")]
    DegenerateGeometry,
}

impl ExplorerError {
    pub fn network(endpoint: &str, message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            endpoint: endpoint.to_owned(),
            message: message.into(),
        }
    }

    pub fn decode(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.to_owned(),
            message: message.into(),
        }
    }

    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyResult { what: what.into() }
    }

    /// Superseded requests are an internal detail and never reach a view.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::CancelledRequest)
    }

    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::CancelledRequest | Self::DegenerateGeometry => None,
            Self::EmptyResult { what } => Some(format!("No {what} for the current filters.")),
            other => Some(other.to_string()),
        }
    }
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_requests_are_silent() {
        assert!(ExplorerError::CancelledRequest.is_silent());
        assert_eq!(ExplorerError::CancelledRequest.user_message(), None);
        assert!(!ExplorerError::network("concepts", "timeout").is_silent());
    }

    #[test]
    fn empty_results_name_what_was_missing() {
        let message = ExplorerError::empty("graph nodes").user_message();
        assert_eq!(
            message.as_deref(),
            Some("No graph nodes for the current filters.")
        );
    }

    #[test]
    fn degenerate_geometry_is_never_shown() {
        assert_eq!(ExplorerError::DegenerateGeometry.user_message(), None);
    }
}

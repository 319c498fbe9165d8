use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Serialization(String),

    /// Rejected locally before anything was sent.
    #[error("{0}")]
    Invalid(String),

    /// A success response whose body did not match the expected shape.
    #[error("{0}")]
    Decode(String),

    #[error("{message}")]
    Http { status: u16, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    MissingVariable(&'static str),

    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_http_error_displays_server_message() {
        let err = ApiError::Http {
            status: 400,
            message: "Slot already taken".into(),
        };
        assert_eq!(err.to_string(), "Slot already taken");
        assert_eq!(err.status(), Some(400));
        assert_eq!(ApiError::Transport("refused".into()).status(), None);
    }
}

/// Problems with the credentials or configuration. Fatal at client construction.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid account key: {0}")]
    InvalidKey(String),
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("config file {path}: {reason}")]
    File { path: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid table name: {0}")]
    InvalidTable(String),
    #[error("invalid entity: {0}")]
    InvalidEntity(String),
    /// The request never reached the service; there is no status code.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// HTTP status of a remote rejection; `None` for every local failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body (or error text) suitable for a status line.
    pub fn detail(&self) -> String {
        match self {
            StoreError::Rejected { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_exposes_status_and_raw_body() {
        let err = StoreError::Rejected {
            status: 403,
            body: "AuthenticationFailed".into(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.detail(), "AuthenticationFailed");
    }

    #[test]
    fn local_failures_have_no_status() {
        let err = StoreError::Transport("connection refused".into());
        assert_eq!(err.status(), None);
        assert_eq!(err.detail(), "transport error: connection refused");
        let cfg: StoreError = ConfigError::Missing("account name").into();
        assert_eq!(cfg.status(), None);
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormRunnerError>;

#[derive(Debug, Error)]
pub enum FormRunnerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No active session; call navigate first")]
    NoSession,
}

impl From<reqwest::Error> for FormRunnerError {
    fn from(err: reqwest::Error) -> Self {
        FormRunnerError::Network(err.to_string())
    }
}

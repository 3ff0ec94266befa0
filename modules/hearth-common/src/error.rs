use thiserror::Error;

#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment safety violation: {0}")]
    SafetyViolation(String),

    #[error("Emergency stop engaged: automated registration is halted")]
    EmergencyStop,

    #[error("Run lock conflict: another discovery run is in progress")]
    RunLockConflict,

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl HearthError {
    /// Safety-class errors are never retried and count toward the
    /// emergency-stop threshold.
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            HearthError::SafetyViolation(_) | HearthError::EmergencyStop
        )
    }
}

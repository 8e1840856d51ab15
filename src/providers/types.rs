use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The backend answered with a non-success status.
    #[error("API error: {status} {status_text}")]
    Transport {
        status: u16,
        /// Canonical reason phrase for `status` (empty for unregistered
        /// codes), not the phrase the server put on its status line.
        status_text: String,
    },

    /// The request never completed (offline, DNS, refused, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a body that is not JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

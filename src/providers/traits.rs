use async_trait::async_trait;

use super::types::ExchangeError;

/// Something that answers one user utterance with one reply.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send `text` and wait for the reply. `session_id` overrides the
    /// provider's own session tracking when given.
    async fn send_message(
        &self,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<String, ExchangeError>;
}

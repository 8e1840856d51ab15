use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::MessageDraft;
use crate::providers::{ChatProvider, ExchangeError};
use crate::services::store::ChatStore;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("A reply is still pending for this conversation")]
    Busy,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Why a submission did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    NoConversation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was appended and no request was made.
    Ignored(IgnoreReason),
    /// The reply was appended to `conversation_id`.
    Replied {
        conversation_id: String,
        user_message_id: String,
        assistant_message_id: String,
        reply: String,
    },
    /// The conversation was deleted while the reply was pending; the reply
    /// was dropped.
    Cancelled { conversation_id: String },
}

/// Message round trips on top of the store: append the user's message,
/// ask the provider, append the reply.
#[derive(Clone)]
pub struct ChatService {
    store: ChatStore,
    provider: Arc<dyn ChatProvider>,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ChatService {
    pub fn new(store: ChatStore, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            store,
            provider,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self, conversation_id: &str) -> bool {
        self.in_flight().contains_key(conversation_id)
    }

    /// Submit `input` to the current conversation.
    ///
    /// The reply goes to the conversation that was current at submission
    /// time, even if the user has moved on since. A failed exchange keeps
    /// the user's message so it can be edited and resent.
    pub async fn submit(&self, input: &str) -> Result<SubmitOutcome, ChatError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::EmptyInput));
        }
        let Some(conversation_id) = self.store.current_conversation_id() else {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::NoConversation));
        };

        let token = {
            let mut in_flight = self.in_flight();
            if in_flight.contains_key(&conversation_id) {
                return Err(ChatError::Busy);
            }
            let token = CancellationToken::new();
            in_flight.insert(conversation_id.clone(), token.clone());
            token
        };

        let Some(user_message_id) = self
            .store
            .append_message(&conversation_id, MessageDraft::user(text))
        else {
            self.finish(&conversation_id);
            return Ok(SubmitOutcome::Ignored(IgnoreReason::NoConversation));
        };
        self.store.set_typing(true);

        let result = tokio::select! {
            _ = token.cancelled() => None,
            reply = self.provider.send_message(text, None) => Some(reply),
        };
        self.finish(&conversation_id);

        match result {
            None => {
                tracing::debug!(conversation_id = %conversation_id, "Dropped reply for deleted conversation");
                Ok(SubmitOutcome::Cancelled { conversation_id })
            }
            Some(Err(e)) => {
                tracing::error!("Error getting AI response: {}", e);
                Err(e.into())
            }
            Some(Ok(reply)) => {
                match self
                    .store
                    .append_message(&conversation_id, MessageDraft::assistant(reply.clone()))
                {
                    Some(assistant_message_id) => Ok(SubmitOutcome::Replied {
                        conversation_id,
                        user_message_id,
                        assistant_message_id,
                        reply,
                    }),
                    None => Ok(SubmitOutcome::Cancelled { conversation_id }),
                }
            }
        }
    }

    /// Clear the in-flight entry and recompute the typing flag.
    fn finish(&self, conversation_id: &str) {
        let any_pending = {
            let mut in_flight = self.in_flight();
            in_flight.remove(conversation_id);
            !in_flight.is_empty()
        };
        self.store.set_typing(any_pending);
    }

    /// Delete a conversation and abandon any reply still pending for it.
    pub fn delete_conversation(&self, conversation_id: &str) -> bool {
        if let Some(token) = self.in_flight().get(conversation_id) {
            token.cancel();
        }
        self.store.delete_conversation(conversation_id)
    }

    /// Start editing a message of the current conversation: the message and
    /// everything after it are removed, and its content is returned as the
    /// new draft.
    pub fn begin_edit(&self, message_id: &str) -> Option<String> {
        let conversation_id = self.store.current_conversation_id()?;
        self.store
            .delete_messages_from(&conversation_id, message_id)
            .into_iter()
            .next()
            .map(|m| m.content)
    }
}

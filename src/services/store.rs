use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::conversation::title_from_content;
use crate::models::preferences::{clamp_font_size, FONT_SIZE_STEP};
use crate::models::{Conversation, Message, MessageDraft, MessagePatch, Preferences, Theme};
use crate::services::storage::Storage;

/// Storage key of the persisted store snapshot.
pub const STORAGE_KEY: &str = "chatai-storage";

/// Storage key that keeps the last stored record that could not be read in
/// full, so a bad load never destroys the only copy.
pub const CORRUPT_BACKUP_KEY: &str = "chatai-storage.corrupt";

const PREVIEW_MAX_CHARS: usize = 100;

/// One committed state of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Most recently created first, unless reordered by deletes.
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<String>,
    pub preferences: Preferences,
    pub is_typing: bool,
}

impl ChatState {
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    /// Conversations whose title contains `query`, ignoring case. An empty
    /// query matches everything. List order is kept.
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn sidebar_sections(&self, query: &str) -> SidebarSections {
        let (pinned, recent): (Vec<_>, Vec<_>) = self
            .search(query)
            .into_iter()
            .map(|c| ConversationSummary::from_conversation(c, self.is_current(&c.id)))
            .partition(|s| s.pinned);
        SidebarSections { pinned, recent }
    }

    fn is_current(&self, id: &str) -> bool {
        self.current_conversation_id.as_deref() == Some(id)
    }

    fn same_persisted(&self, other: &ChatState) -> bool {
        self.conversations == other.conversations
            && self.current_conversation_id == other.current_conversation_id
            && self.preferences.theme == other.preferences.theme
            && self.preferences.font_size == other.preferences.font_size
    }
}

/// Sidebar row for a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub pinned: bool,
    pub is_current: bool,
    pub message_count: usize,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummary {
    fn from_conversation(conv: &Conversation, is_current: bool) -> Self {
        Self {
            id: conv.id.clone(),
            title: conv.title.clone(),
            pinned: conv.pinned,
            is_current,
            message_count: conv.messages.len(),
            last_message_preview: conv
                .messages
                .last()
                .map(|m| m.content.chars().take(PREVIEW_MAX_CHARS).collect()),
            created_at: conv.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidebarSections {
    pub pinned: Vec<ConversationSummary>,
    pub recent: Vec<ConversationSummary>,
}

impl SidebarSections {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.recent.is_empty()
    }

    /// Rows in display order: pinned first, then recent.
    pub fn iter(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.pinned.iter().chain(self.recent.iter())
    }
}

/// The persisted subset of [`ChatState`]. Sidebar visibility and the typing
/// flag are not stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    conversations: Vec<Conversation>,
    current_conversation_id: Option<String>,
    theme: Theme,
    font_size: u32,
}

fn default_font_size() -> u32 {
    Preferences::default().font_size
}

/// [`PersistedState`] with conversations left unparsed, so one bad entry
/// does not take the rest down with it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    conversations: Vec<serde_json::Value>,
    #[serde(default)]
    current_conversation_id: Option<String>,
    #[serde(default)]
    theme: Theme,
    #[serde(default = "default_font_size")]
    font_size: u32,
}

impl StoredRecord {
    /// Parse the record, keeping every conversation that reads cleanly.
    /// Returns `None` for the state when the record is not usable at all;
    /// the flag is set whenever anything was discarded.
    fn parse(json: &str) -> (Option<PersistedState>, bool) {
        let record: StoredRecord = match serde_json::from_str(json) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored chat state: {}", e);
                return (None, true);
            }
        };

        let total = record.conversations.len();
        let conversations: Vec<Conversation> = record
            .conversations
            .into_iter()
            .enumerate()
            .filter_map(|(i, raw)| match serde_json::from_value(raw) {
                Ok(conv) => Some(conv),
                Err(e) => {
                    tracing::warn!("Dropping unreadable stored conversation #{}: {}", i, e);
                    None
                }
            })
            .collect();
        let dropped = conversations.len() != total;

        let persisted = PersistedState {
            conversations,
            current_conversation_id: record.current_conversation_id,
            theme: record.theme,
            font_size: record.font_size,
        };
        (Some(persisted), dropped)
    }
}

impl PersistedState {
    fn from_state(state: &ChatState) -> Self {
        Self {
            conversations: state.conversations.clone(),
            current_conversation_id: state.current_conversation_id.clone(),
            theme: state.preferences.theme,
            font_size: state.preferences.font_size,
        }
    }

    fn into_state(self) -> ChatState {
        let mut seen = HashSet::new();
        let total = self.conversations.len();
        let conversations: Vec<Conversation> = self
            .conversations
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        if conversations.len() != total {
            tracing::warn!(
                "Dropped {} conversations with duplicate ids from stored state",
                total - conversations.len()
            );
        }

        let current_conversation_id = self
            .current_conversation_id
            .filter(|id| conversations.iter().any(|c| &c.id == id));

        ChatState {
            conversations,
            current_conversation_id,
            preferences: Preferences {
                theme: self.theme,
                font_size: clamp_font_size(self.font_size),
                ..Preferences::default()
            },
            is_typing: false,
        }
    }
}

struct StoreInner {
    state: watch::Sender<ChatState>,
    /// Held for the duration of a commit; makes the store single-writer.
    writer: Mutex<Option<Storage>>,
}

/// Single source of truth for conversations and preferences.
///
/// Every operation builds the next snapshot from the current one and
/// commits it in one step: subscribers never observe a half-applied
/// change, and the persisted subset is written whenever it changes.
/// Operations on unknown ids are no-ops; their return value tells the
/// caller whether anything matched.
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<StoreInner>,
}

impl ChatStore {
    /// A store that lives only in memory.
    #[cfg(test)]
    pub fn ephemeral() -> Self {
        Self::with_state(ChatState::default(), None)
    }

    /// Restore the store from `storage`, falling back to defaults when no
    /// usable record exists. Conversations that cannot be read are dropped
    /// individually; the original record is then copied to
    /// [`CORRUPT_BACKUP_KEY`] before anything overwrites it.
    pub fn load(storage: Storage) -> Self {
        let state = match storage.get(STORAGE_KEY) {
            Ok(Some(json)) => {
                let (persisted, lossy) = StoredRecord::parse(&json);
                if lossy {
                    match storage.set(CORRUPT_BACKUP_KEY, &json) {
                        Ok(()) => tracing::warn!(
                            "Kept a copy of the stored chat state under '{}'",
                            CORRUPT_BACKUP_KEY
                        ),
                        Err(e) => tracing::error!("Failed to back up stored chat state: {}", e),
                    }
                }
                persisted.map(PersistedState::into_state).unwrap_or_default()
            }
            Ok(None) => ChatState::default(),
            Err(e) => {
                tracing::error!("Failed to load chat state: {}", e);
                ChatState::default()
            }
        };
        tracing::debug!(
            conversations = state.conversations.len(),
            "Loaded chat state"
        );
        Self::with_state(state, Some(storage))
    }

    fn with_state(state: ChatState, storage: Option<Storage>) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self {
            inner: Arc::new(StoreInner {
                state: tx,
                writer: Mutex::new(storage),
            }),
        }
    }

    pub fn snapshot(&self) -> ChatState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state.subscribe()
    }

    fn commit<R>(&self, mutate: impl FnOnce(&mut ChatState) -> R) -> R {
        let storage = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = self.inner.state.borrow().clone();
        let output = mutate(&mut next);

        let persist = {
            let current = self.inner.state.borrow();
            if *current == next {
                return output;
            }
            !current.same_persisted(&next)
        };

        if persist {
            if let Some(storage) = storage.as_ref() {
                if let Err(e) = save(storage, &next) {
                    tracing::error!("Failed to persist chat state: {}", e);
                }
            }
        }

        self.inner.state.send_replace(next);
        output
    }

    pub fn create_conversation(&self) -> String {
        let conv = Conversation::new();
        let id = conv.id.clone();
        self.commit(|state| {
            state.conversations.insert(0, conv);
            state.current_conversation_id = Some(id.clone());
        });
        tracing::debug!(conversation_id = %id, "Created conversation");
        id
    }

    /// Make sure a conversation exists and is selected. Returns the
    /// current conversation id.
    pub fn initialize(&self) -> String {
        let existing = {
            let state = self.inner.state.borrow();
            if state.conversations.is_empty() {
                None
            } else {
                state.current_conversation_id.clone()
            }
        };
        match existing {
            Some(id) => id,
            None => self.create_conversation(),
        }
    }

    /// Select a conversation. Unknown ids leave the selection unchanged.
    pub fn select_conversation(&self, id: &str) -> bool {
        self.commit(|state| {
            if state.conversation(id).is_none() {
                return false;
            }
            state.current_conversation_id = Some(id.to_string());
            true
        })
    }

    /// Append a message and return its newly assigned id. The first message
    /// of a conversation also names it.
    pub fn append_message(&self, conversation_id: &str, draft: MessageDraft) -> Option<String> {
        self.commit(|state| {
            let conv = state.conversation_mut(conversation_id)?;
            let message = draft.into_message();
            let id = message.id.clone();
            if conv.messages.is_empty() {
                conv.title = title_from_content(&message.content);
            }
            conv.messages.push(message);
            Some(id)
        })
    }

    pub fn update_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        patch: &MessagePatch,
    ) -> bool {
        self.commit(|state| {
            state
                .conversation_mut(conversation_id)
                .and_then(|conv| conv.messages.iter_mut().find(|m| m.id == message_id))
                .map(|message| {
                    patch.apply(message);
                })
                .is_some()
        })
    }

    pub fn delete_message(&self, conversation_id: &str, message_id: &str) -> bool {
        self.commit(|state| {
            let Some(conv) = state.conversation_mut(conversation_id) else {
                return false;
            };
            let before = conv.messages.len();
            conv.messages.retain(|m| m.id != message_id);
            conv.messages.len() != before
        })
    }

    /// Remove `message_id` and every message after it, returning what was
    /// removed in order.
    pub fn delete_messages_from(&self, conversation_id: &str, message_id: &str) -> Vec<Message> {
        self.commit(|state| {
            state
                .conversation_mut(conversation_id)
                .and_then(|conv| {
                    let index = conv.message_index(message_id)?;
                    Some(conv.messages.split_off(index))
                })
                .unwrap_or_default()
        })
    }

    /// Delete a conversation with all its messages. If it was current, the
    /// first remaining conversation becomes current.
    pub fn delete_conversation(&self, id: &str) -> bool {
        let deleted = self.commit(|state| {
            let before = state.conversations.len();
            state.conversations.retain(|c| c.id != id);
            if state.conversations.len() == before {
                return false;
            }
            if state.current_conversation_id.as_deref() == Some(id) {
                state.current_conversation_id = state.conversations.first().map(|c| c.id.clone());
            }
            true
        });
        if deleted {
            tracing::debug!(conversation_id = %id, "Deleted conversation");
        }
        deleted
    }

    /// Flip the pinned flag. Returns the new value, or `None` if the
    /// conversation does not exist.
    pub fn toggle_pin(&self, id: &str) -> Option<bool> {
        self.commit(|state| {
            let conv = state.conversation_mut(id)?;
            conv.pinned = !conv.pinned;
            Some(conv.pinned)
        })
    }

    pub fn set_title(&self, id: &str, title: &str) -> bool {
        self.commit(|state| {
            state
                .conversation_mut(id)
                .map(|conv| conv.title = title.to_string())
                .is_some()
        })
    }

    pub fn set_typing(&self, is_typing: bool) {
        self.commit(|state| state.is_typing = is_typing);
    }

    pub fn toggle_sidebar(&self) -> bool {
        self.commit(|state| {
            state.preferences.sidebar_open = !state.preferences.sidebar_open;
            state.preferences.sidebar_open
        })
    }

    pub fn toggle_theme(&self) -> Theme {
        self.commit(|state| {
            state.preferences.theme = state.preferences.theme.toggled();
            state.preferences.theme
        })
    }

    pub fn increase_font_size(&self) -> u32 {
        self.commit(|state| {
            state.preferences.font_size =
                clamp_font_size(state.preferences.font_size.saturating_add(FONT_SIZE_STEP));
            state.preferences.font_size
        })
    }

    pub fn decrease_font_size(&self) -> u32 {
        self.commit(|state| {
            state.preferences.font_size =
                clamp_font_size(state.preferences.font_size.saturating_sub(FONT_SIZE_STEP));
            state.preferences.font_size
        })
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        self.inner.state.borrow().current_conversation().cloned()
    }

    pub fn current_conversation_id(&self) -> Option<String> {
        self.inner.state.borrow().current_conversation_id.clone()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.state.borrow().conversation(id).cloned()
    }

    pub fn sidebar_sections(&self, query: &str) -> SidebarSections {
        self.inner.state.borrow().sidebar_sections(query)
    }
}

fn save(storage: &Storage, state: &ChatState) -> Result<()> {
    let json = serde_json::to_string(&PersistedState::from_state(state))?;
    storage.set(STORAGE_KEY, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn store_with_messages(contents: &[&str]) -> (ChatStore, String, Vec<String>) {
        let store = ChatStore::ephemeral();
        let conv_id = store.create_conversation();
        let ids = contents
            .iter()
            .map(|c| store.append_message(&conv_id, MessageDraft::user(*c)).unwrap())
            .collect();
        (store, conv_id, ids)
    }

    fn contents(store: &ChatStore, conv_id: &str) -> Vec<String> {
        store
            .conversation(conv_id)
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    #[test]
    fn test_create_conversation_inserts_at_head_and_selects() {
        let store = ChatStore::ephemeral();
        let first = store.create_conversation();
        let second = store.create_conversation();

        let state = store.snapshot();
        assert_eq!(state.conversations.len(), 2);
        assert_eq!(state.conversations[0].id, second);
        assert_eq!(state.conversations[1].id, first);
        assert_eq!(state.current_conversation_id.as_deref(), Some(second.as_str()));
        assert_eq!(state.conversations[0].title, "New Chat");
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = ChatStore::ephemeral();
        let id = store.initialize();
        assert_eq!(store.initialize(), id);
        assert_eq!(store.snapshot().conversations.len(), 1);
    }

    #[test]
    fn test_initialize_without_current_creates_conversation() {
        let store = ChatStore::ephemeral();
        let existing = store.create_conversation();
        store.commit(|state| state.current_conversation_id = None);

        let id = store.initialize();
        assert_ne!(id, existing);
        assert_eq!(store.snapshot().conversations.len(), 2);
        assert_eq!(store.current_conversation_id(), Some(id));
    }

    #[test]
    fn test_select_unknown_conversation_is_ignored() {
        let store = ChatStore::ephemeral();
        let id = store.create_conversation();
        assert!(!store.select_conversation("missing"));
        assert_eq!(store.current_conversation_id(), Some(id));
    }

    #[test]
    fn test_select_conversation() {
        let store = ChatStore::ephemeral();
        let first = store.create_conversation();
        store.create_conversation();
        assert!(store.select_conversation(&first));
        assert_eq!(store.current_conversation().unwrap().id, first);
    }

    #[test]
    fn test_append_preserves_call_order() {
        let inputs = ["one", "two", "three", "four", "five"];
        let (store, conv_id, ids) = store_with_messages(&inputs);

        assert_eq!(contents(&store, &conv_id), inputs);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), inputs.len());
    }

    #[test]
    fn test_first_message_sets_title() {
        let long = "a".repeat(70);
        let (store, conv_id, _) = store_with_messages(&[long.as_str(), "second message"]);
        let conv = store.conversation(&conv_id).unwrap();
        assert_eq!(conv.title, "a".repeat(50));
    }

    #[test]
    fn test_append_to_unknown_conversation_is_noop() {
        let store = ChatStore::ephemeral();
        store.create_conversation();
        let before = store.snapshot();
        assert!(store
            .append_message("missing", MessageDraft::user("hi"))
            .is_none());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_update_message_merges_patch() {
        let (store, conv_id, ids) = store_with_messages(&["draft"]);
        let original = store.conversation(&conv_id).unwrap().messages[0].clone();

        assert!(store.update_message(&conv_id, &ids[0], &MessagePatch::content("final")));

        let updated = store.conversation(&conv_id).unwrap().messages[0].clone();
        assert_eq!(updated.content, "final");
        assert_eq!(updated.role, Role::User);
        assert_eq!(updated.timestamp, original.timestamp);
        assert!(!store.update_message(&conv_id, "missing", &MessagePatch::content("x")));
    }

    #[test]
    fn test_delete_message() {
        let (store, conv_id, ids) = store_with_messages(&["a", "b", "c"]);
        assert!(store.delete_message(&conv_id, &ids[1]));
        assert_eq!(contents(&store, &conv_id), ["a", "c"]);
        assert!(!store.delete_message(&conv_id, &ids[1]));
    }

    #[test]
    fn test_delete_messages_from_leaves_strict_prefix() {
        let inputs = ["a", "b", "c", "d"];
        for cut in 0..inputs.len() {
            let (store, conv_id, ids) = store_with_messages(&inputs);
            let original = store.conversation(&conv_id).unwrap().messages;

            let removed = store.delete_messages_from(&conv_id, &ids[cut]);

            let remaining = store.conversation(&conv_id).unwrap().messages;
            assert_eq!(remaining, original[..cut]);
            assert_eq!(removed, original[cut..]);
        }
    }

    #[test]
    fn test_delete_messages_from_unknown_message() {
        let (store, conv_id, _) = store_with_messages(&["a", "b"]);
        assert!(store.delete_messages_from(&conv_id, "missing").is_empty());
        assert_eq!(contents(&store, &conv_id), ["a", "b"]);
    }

    #[test]
    fn test_delete_only_current_conversation_clears_current() {
        let store = ChatStore::ephemeral();
        let id = store.create_conversation();
        assert!(store.delete_conversation(&id));
        assert!(store.snapshot().conversations.is_empty());
        assert_eq!(store.current_conversation_id(), None);
        assert!(store.current_conversation().is_none());
    }

    #[test]
    fn test_delete_current_falls_back_to_first_remaining() {
        let store = ChatStore::ephemeral();
        let oldest = store.create_conversation();
        let middle = store.create_conversation();
        let newest = store.create_conversation();

        assert!(store.delete_conversation(&newest));
        assert_eq!(store.current_conversation_id(), Some(middle.clone()));

        store.select_conversation(&oldest);
        assert!(store.delete_conversation(&middle));
        assert_eq!(store.current_conversation_id(), Some(oldest));
    }

    #[test]
    fn test_delete_other_conversation_keeps_current() {
        let store = ChatStore::ephemeral();
        let other = store.create_conversation();
        let current = store.create_conversation();
        assert!(store.delete_conversation(&other));
        assert_eq!(store.current_conversation_id(), Some(current));
        assert!(!store.delete_conversation(&other));
    }

    #[test]
    fn test_toggle_pin_and_rename() {
        let store = ChatStore::ephemeral();
        let id = store.create_conversation();
        assert_eq!(store.toggle_pin(&id), Some(true));
        assert_eq!(store.toggle_pin(&id), Some(false));
        assert_eq!(store.toggle_pin("missing"), None);

        assert!(store.set_title(&id, "Renamed"));
        assert_eq!(store.conversation(&id).unwrap().title, "Renamed");
        assert!(!store.set_title("missing", "x"));
    }

    #[test]
    fn test_font_size_stays_in_bounds() {
        let store = ChatStore::ephemeral();
        for _ in 0..10 {
            let size = store.increase_font_size();
            assert!((12..=24).contains(&size));
        }
        assert_eq!(store.increase_font_size(), 24);
        assert_eq!(store.increase_font_size(), 24);

        for _ in 0..10 {
            let size = store.decrease_font_size();
            assert!((12..=24).contains(&size));
        }
        assert_eq!(store.decrease_font_size(), 12);
    }

    #[test]
    fn test_preference_toggles() {
        let store = ChatStore::ephemeral();
        assert_eq!(store.toggle_theme(), Theme::Light);
        assert_eq!(store.toggle_theme(), Theme::Dark);
        assert!(!store.toggle_sidebar());
        assert!(store.toggle_sidebar());
    }

    #[test]
    fn test_sidebar_sections_filter_and_partition() {
        let store = ChatStore::ephemeral();
        let rust = store.create_conversation();
        store.set_title(&rust, "Rust lifetimes");
        let pinned = store.create_conversation();
        store.set_title(&pinned, "Trip planning");
        store.toggle_pin(&pinned);
        let other = store.create_conversation();
        store.set_title(&other, "rusty bikes");

        let all = store.sidebar_sections("");
        assert_eq!(all.pinned.len(), 1);
        assert_eq!(all.recent.len(), 2);
        assert_eq!(all.pinned[0].id, pinned);

        let filtered = store.sidebar_sections("RUST");
        assert!(filtered.pinned.is_empty());
        let titles: Vec<_> = filtered.recent.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["rusty bikes", "Rust lifetimes"]);
        assert!(filtered.recent[0].is_current);

        assert!(store.sidebar_sections("nothing matches").is_empty());
        assert_eq!(store.snapshot().search("trip").len(), 1);
        assert_eq!(store.snapshot().search("").len(), 3);
    }

    #[test]
    fn test_subscribers_see_committed_state() {
        let store = ChatStore::ephemeral();
        let mut rx = store.subscribe();
        let id = store.create_conversation();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.current_conversation_id, Some(id.clone()));

        // Operations that match nothing do not publish a new state.
        store.set_title("missing", "x");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_persist_and_reload_round_trip() {
        let storage = Storage::new_in_memory().unwrap();
        let store = ChatStore::load(storage.clone());
        let first = store.create_conversation();
        store.append_message(&first, MessageDraft::user("Hello"));
        store.append_message(&first, MessageDraft::assistant("Hi there"));
        store.toggle_pin(&first);
        store.create_conversation();
        store.select_conversation(&first);
        store.toggle_theme();
        store.increase_font_size();
        store.toggle_sidebar();
        store.set_typing(true);

        let saved = store.snapshot();
        let reloaded = ChatStore::load(storage).snapshot();

        assert_eq!(reloaded.conversations, saved.conversations);
        assert_eq!(reloaded.current_conversation_id, saved.current_conversation_id);
        assert_eq!(reloaded.preferences.theme, Theme::Light);
        assert_eq!(reloaded.preferences.font_size, 18);
        assert!(reloaded.preferences.sidebar_open);
        assert!(!reloaded.is_typing);
    }

    #[test]
    fn test_transient_changes_are_not_written() {
        let storage = Storage::new_in_memory().unwrap();
        let store = ChatStore::load(storage.clone());
        store.set_typing(true);
        store.toggle_sidebar();
        assert_eq!(storage.get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_persisted_record_uses_camel_case_keys() {
        let storage = Storage::new_in_memory().unwrap();
        let store = ChatStore::load(storage.clone());
        store.create_conversation();

        let json: serde_json::Value =
            serde_json::from_str(&storage.get(STORAGE_KEY).unwrap().unwrap()).unwrap();
        assert!(json.get("currentConversationId").is_some());
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["fontSize"], 16);
        assert!(json["conversations"][0].get("createdAt").is_some());
        assert!(json.get("sidebarOpen").is_none());
        assert!(json.get("isTyping").is_none());
    }

    #[test]
    fn test_load_sanitizes_stored_state() {
        let storage = Storage::new_in_memory().unwrap();
        storage
            .set(
                STORAGE_KEY,
                r#"{"conversations":[],"currentConversationId":"gone","theme":"light","fontSize":40}"#,
            )
            .unwrap();

        let state = ChatStore::load(storage).snapshot();
        assert_eq!(state.current_conversation_id, None);
        assert_eq!(state.preferences.font_size, 24);
        assert_eq!(state.preferences.theme, Theme::Light);
    }

    #[test]
    fn test_load_ignores_corrupt_record() {
        let storage = Storage::new_in_memory().unwrap();
        storage.set(STORAGE_KEY, "not json").unwrap();
        let store = ChatStore::load(storage.clone());
        assert_eq!(store.snapshot(), ChatState::default());

        store.initialize();
        assert_eq!(
            storage.get(CORRUPT_BACKUP_KEY).unwrap().as_deref(),
            Some("not json")
        );
    }

    #[test]
    fn test_bad_message_timestamp_keeps_history() {
        let storage = Storage::new_in_memory().unwrap();
        storage
            .set(
                STORAGE_KEY,
                r#"{"conversations":[{"id":"c1","title":"Old chat","createdAt":"2024-01-01T00:00:00Z","pinned":false,
                    "messages":[{"id":"m1","role":"user","content":"keep me","timestamp":"yesterday"}]}],
                    "currentConversationId":"c1","theme":"dark","fontSize":16}"#,
            )
            .unwrap();

        let store = ChatStore::load(storage.clone());
        assert_eq!(store.initialize(), "c1");
        store.toggle_theme();

        let after = storage.get(STORAGE_KEY).unwrap().unwrap();
        assert!(after.contains("keep me"));
        assert_eq!(storage.get(CORRUPT_BACKUP_KEY).unwrap(), None);
    }

    #[test]
    fn test_unreadable_conversation_is_dropped_alone() {
        let storage = Storage::new_in_memory().unwrap();
        let record = r#"{"conversations":[
            {"id":"bad","title":7,"createdAt":"2024-01-01T00:00:00Z","pinned":false,"messages":[]},
            {"id":"good","title":"Survivor","createdAt":"2024-01-02T00:00:00Z","pinned":true,"messages":[]}],
            "currentConversationId":"bad","theme":"light","fontSize":18}"#;
        storage.set(STORAGE_KEY, record).unwrap();

        let state = ChatStore::load(storage.clone()).snapshot();
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.conversations[0].title, "Survivor");
        assert_eq!(state.current_conversation_id, None);
        assert_eq!(state.preferences.theme, Theme::Light);
        assert_eq!(state.preferences.font_size, 18);
        assert_eq!(storage.get(CORRUPT_BACKUP_KEY).unwrap().as_deref(), Some(record));
    }
}

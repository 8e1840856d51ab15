pub mod conversation;
pub mod message;
pub mod preferences;

pub use conversation::Conversation;
pub use message::{Message, MessageDraft, MessagePatch, Role};
pub use preferences::{Preferences, Theme};

pub mod chat;
pub mod storage;
pub mod store;

pub use chat::{ChatError, ChatService, SubmitOutcome};
pub use storage::Storage;
pub use store::ChatStore;

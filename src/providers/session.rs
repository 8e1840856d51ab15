use chrono::Utc;
use rand::Rng;

use crate::services::storage::Storage;

/// Storage key of the session id shared by all exchanges from this profile.
pub const SESSION_KEY: &str = "chatai-session-id";

const SESSION_PREFIX: &str = "session_";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `session_<unix millis>_<9 base-36 chars>`. Unlikely to collide, but not
/// guaranteed unique.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}_{}", SESSION_PREFIX, Utc::now().timestamp_millis(), suffix)
}

/// Remembers the session id across runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: Storage,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn stored(&self) -> Option<String> {
        match self.storage.get_record(SESSION_KEY).await {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read session id: {}", e);
                None
            }
        }
    }

    /// Pick the session id for one exchange. An explicit id is used as is and
    /// not remembered; otherwise the stored id is reused, or a new one is
    /// generated and stored.
    pub async fn resolve(&self, explicit: Option<&str>) -> String {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return id.to_string();
        }

        let id = match self.stored().await {
            Some(id) => id,
            None => {
                let id = generate_session_id();
                tracing::debug!(session_id = %id, "Generated new session id");
                id
            }
        };
        if let Err(e) = self.storage.set_record(SESSION_KEY, &id).await {
            tracing::warn!("Failed to store session id: {}", e);
        }
        id
    }
}

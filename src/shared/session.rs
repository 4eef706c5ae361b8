use super::config::LimitsConfig;
use super::error::ChatError;
use super::models::{ChatSession, Message};
use super::storage::{
    CHAT_HISTORY_KEY, CLIENT_ID_KEY, CURRENT_SESSION_KEY, KeyValueStore, conversations_key,
    load_json, messages_key, save_json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TITLE: &str = "שיחה חדשה";

/// Title for a new conversation: the first `max_words` space-separated words
/// longer than two characters.
pub fn generate_title(first_message: &str, max_words: usize) -> String {
    let words: Vec<&str> = first_message
        .split(' ')
        .filter(|word| word.chars().count() > 2)
        .take(max_words)
        .collect();

    if words.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        words.join(" ")
    }
}

/// Title sent along with a chat message: the saved title if the session has
/// one, otherwise the start of the message being sent.
pub fn draft_session_title(existing: Option<&str>, input: &str, max_chars: usize) -> String {
    if let Some(title) = existing
        && !title.is_empty()
    {
        return title.to_string();
    }

    let mut title: String = input.chars().take(max_chars).collect();
    if input.chars().count() > max_chars {
        title.push_str("...");
    }

    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Conversation persistence: message lists keyed by session, and a capped
/// per-user list of session metadata, newest first.
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    max_sessions: usize,
    title_words: usize,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, limits: &LimitsConfig) -> Self {
        Self {
            store,
            max_sessions: limits.max_sessions,
            title_words: limits.title_words,
        }
    }

    pub fn save(&self, session_id: &str, messages: &[Message]) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), &messages_key(session_id), messages)
    }

    pub fn load(&self, session_id: &str) -> Vec<Message> {
        load_json(self.store.as_ref(), &messages_key(session_id)).unwrap_or_default()
    }

    pub fn list_sessions(&self, user_id: &str) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> =
            load_json(self.store.as_ref(), &conversations_key(user_id)).unwrap_or_default();
        sessions.truncate(self.max_sessions);
        sessions
    }

    pub fn find_session(&self, user_id: &str, session_id: &str) -> Option<ChatSession> {
        self.list_sessions(user_id)
            .into_iter()
            .find(|s| s.session_id == session_id)
    }

    /// Remove a session's messages and its metadata entry. Returns whether
    /// the user had a session with that id.
    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool, ChatError> {
        self.store.remove(&messages_key(session_id))?;

        let mut sessions = self.list_sessions(user_id);
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        let removed = sessions.len() != before;

        if removed {
            save_json(self.store.as_ref(), &conversations_key(user_id), &sessions)?;
            info!("Deleted session {}", session_id);
        }
        if self.current_session_id().as_deref() == Some(session_id) {
            self.store.remove(CURRENT_SESSION_KEY)?;
        }

        Ok(removed)
    }

    /// Insert new sessions at the head of the user's list. A known session
    /// keeps its place, title and creation time; only `last_message_at`
    /// moves. The list is then cut to the cap, dropping the oldest.
    pub fn upsert_session_meta(&self, session: ChatSession) -> Result<(), ChatError> {
        let mut sessions = self.list_sessions(&session.user_id);

        match sessions
            .iter_mut()
            .find(|s| s.session_id == session.session_id)
        {
            Some(existing) => existing.last_message_at = session.last_message_at,
            None => {
                debug!("New session {} for user {}", session.session_id, session.user_id);
                sessions.insert(0, session.clone());
            }
        }
        sessions.truncate(self.max_sessions);

        save_json(
            self.store.as_ref(),
            &conversations_key(&session.user_id),
            &sessions,
        )
    }

    /// Update the last-activity time of a known session. Returns false when
    /// the session is not in the user's list.
    pub fn touch(
        &self,
        user_id: &str,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ChatError> {
        let mut sessions = self.list_sessions(user_id);
        let Some(session) = sessions.iter_mut().find(|s| s.session_id == session_id) else {
            return Ok(false);
        };
        session.last_message_at = at;
        save_json(self.store.as_ref(), &conversations_key(user_id), &sessions)?;
        Ok(true)
    }

    /// Persist a conversation: its messages, plus its metadata entry titled
    /// from the first message.
    pub fn save_conversation(
        &self,
        user_id: &str,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), ChatError> {
        let Some(first) = messages.first() else {
            return Ok(());
        };

        let now = Utc::now();
        self.upsert_session_meta(ChatSession {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            title: generate_title(&first.content, self.title_words),
            created_at: now,
            last_message_at: now,
        })?;
        self.save(session_id, messages)
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.store.get(CURRENT_SESSION_KEY).filter(|id| !id.is_empty())
    }

    /// Start a new conversation and make it current.
    pub fn new_session_id(&self) -> Result<String, ChatError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.set_current_session_id(&session_id)?;
        debug!("Created new session ID: {}", session_id);
        Ok(session_id)
    }

    pub fn set_current_session_id(&self, session_id: &str) -> Result<(), ChatError> {
        self.store.set(CURRENT_SESSION_KEY, session_id)
    }

    pub fn current_or_new_session_id(&self) -> Result<String, ChatError> {
        match self.current_session_id() {
            Some(session_id) => Ok(session_id),
            None => self.new_session_id(),
        }
    }

    /// Identifier of this client installation, created on first use.
    pub fn client_id(&self) -> Result<String, ChatError> {
        if let Some(client_id) = self.store.get(CLIENT_ID_KEY)
            && !client_id.is_empty()
        {
            return Ok(client_id);
        }

        let client_id = uuid::Uuid::new_v4().to_string();
        self.store.set(CLIENT_ID_KEY, &client_id)?;
        debug!("Generated new client ID: {}", client_id);
        Ok(client_id)
    }

    /// Messages of the conversation currently on screen.
    pub fn chat_history(&self) -> Vec<Message> {
        load_json(self.store.as_ref(), CHAT_HISTORY_KEY).unwrap_or_default()
    }

    pub fn save_chat_history(&self, messages: &[Message]) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), CHAT_HISTORY_KEY, messages)
    }

    /// Make a saved conversation current and return its messages.
    pub fn open_session(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let messages = self.load(session_id);
        self.save_chat_history(&messages)?;
        self.set_current_session_id(session_id)?;
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::storage::MemoryStore;
    use chrono::Duration;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), &LimitsConfig::default())
    }

    fn session(user_id: &str, session_id: &str, at: DateTime<Utc>) -> ChatSession {
        ChatSession {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            title: format!("title {session_id}"),
            created_at: at,
            last_message_at: at,
        }
    }

    #[test]
    fn test_title_from_first_qualifying_words() {
        assert_eq!(generate_title("תכנות בפייתון הוא נהדר", 3), "תכנות בפייתון הוא");
        assert_eq!(generate_title("a to be or not", 3), "not");
        assert_eq!(generate_title("   ", 3), DEFAULT_TITLE);
        assert_eq!(generate_title("", 3), DEFAULT_TITLE);
    }

    #[test]
    fn test_draft_title() {
        assert_eq!(draft_session_title(Some("saved"), "anything", 50), "saved");
        assert_eq!(draft_session_title(None, "short", 50), "short");
        assert_eq!(draft_session_title(Some(""), "", 50), DEFAULT_TITLE);

        let long = "א".repeat(60);
        let title = draft_session_title(None, &long, 50);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_save_and_load_messages() {
        let sessions = store();
        let messages = vec![Message::user("שלום", None), Message::bot("היי", None)];

        sessions.save("s1", &messages).unwrap();
        assert_eq!(sessions.load("s1"), messages);
        assert!(sessions.load("missing").is_empty());
    }

    #[test]
    fn test_eleventh_session_evicts_oldest_inserted() {
        let sessions = store();
        let start = Utc::now();

        for i in 0..11 {
            // later sessions get older timestamps; eviction must still follow insertion
            let at = start - Duration::minutes(i);
            sessions
                .upsert_session_meta(session("u1", &format!("s{i}"), at))
                .unwrap();
        }

        let list = sessions.list_sessions("u1");
        assert_eq!(list.len(), 10);
        assert_eq!(list[0].session_id, "s10");
        assert!(list.iter().all(|s| s.session_id != "s0"));
    }

    #[test]
    fn test_upsert_existing_only_moves_timestamp() {
        let sessions = store();
        let t0 = Utc::now();
        sessions.upsert_session_meta(session("u1", "a", t0)).unwrap();
        sessions.upsert_session_meta(session("u1", "b", t0)).unwrap();

        let later = t0 + Duration::minutes(5);
        let mut update = session("u1", "a", later);
        update.title = "ignored".to_string();
        sessions.upsert_session_meta(update).unwrap();

        let list = sessions.list_sessions("u1");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].session_id, "b");
        assert_eq!(list[1].title, "title a");
        assert_eq!(list[1].created_at, t0);
        assert_eq!(list[1].last_message_at, later);
    }

    #[test]
    fn test_touch_and_delete() {
        let sessions = store();
        let t0 = Utc::now();
        sessions.upsert_session_meta(session("u1", "a", t0)).unwrap();
        sessions.save("a", &[Message::user("hi", None)]).unwrap();
        sessions.set_current_session_id("a").unwrap();

        assert!(sessions.touch("u1", "a", t0 + Duration::hours(1)).unwrap());
        assert!(!sessions.touch("u1", "zzz", t0).unwrap());

        assert!(sessions.delete_session("u1", "a").unwrap());
        assert!(sessions.list_sessions("u1").is_empty());
        assert!(sessions.load("a").is_empty());
        assert_eq!(sessions.current_session_id(), None);
        assert!(!sessions.delete_session("u1", "a").unwrap());
    }

    #[test]
    fn test_save_conversation_titles_from_first_message() {
        let sessions = store();
        let messages = vec![
            Message::user("תכנות בפייתון הוא נהדר", None),
            Message::bot("נכון", None),
        ];

        sessions.save_conversation("u1", "s1", &messages).unwrap();

        let saved = sessions.find_session("u1", "s1").unwrap();
        assert_eq!(saved.title, "תכנות בפייתון הוא");
        assert_eq!(sessions.load("s1").len(), 2);
    }

    #[test]
    fn test_ids_are_stable_once_created() {
        let sessions = store();

        let client = sessions.client_id().unwrap();
        assert_eq!(sessions.client_id().unwrap(), client);

        let current = sessions.current_or_new_session_id().unwrap();
        assert_eq!(sessions.current_session_id(), Some(current.clone()));
        assert_ne!(sessions.new_session_id().unwrap(), current);
    }

    #[test]
    fn test_open_session_becomes_current_history() {
        let sessions = store();
        let messages = vec![Message::user("hello", None)];
        sessions.save("old", &messages).unwrap();

        assert_eq!(sessions.open_session("old").unwrap(), messages);
        assert_eq!(sessions.chat_history(), messages);
        assert_eq!(sessions.current_session_id(), Some("old".to_string()));
    }
}

//! Chat session manager
//!
//! Owns the conversation state (messages, session id, waiting flag) and
//! drives the two webhook operations: restoring a previous session's
//! history and the send/receive message cycle. State snapshots flow
//! through a watch channel so any front-end can subscribe to changes.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::message::Message;
use crate::session::SessionStore;
use crate::webhook::{Attachment, WebhookClient, extract_reply, map_history};

/// Observable conversation state
#[derive(Debug, Clone)]
pub struct ChatState {
    /// Distinguished greeting, rendered above the transcript
    pub welcome_message: Option<Message>,
    /// Transcript in chronological order
    pub messages: Vec<Message>,
    /// Active session identifier, if any
    pub current_session_id: Option<String>,
    /// True strictly between the start of a send and its response
    pub waiting_for_response: bool,
}

/// Chat session manager
///
/// One instance manages one conversation. Callers are expected to
/// serialize sends (e.g. disable input while `waiting_for_response` is
/// true); loads racing a newer session are discarded via a generation
/// counter.
pub struct ChatManager {
    client: WebhookClient,
    /// Persisted session id; `None` when storage is unavailable
    store: Mutex<Option<SessionStore>>,
    session_key: String,
    input_key: String,
    metadata: Option<serde_json::Value>,
    load_previous_session: bool,
    /// Initial messages after the welcome message, used for resets
    initial_remainder: Vec<Message>,
    state: watch::Sender<ChatState>,
    /// Bumped whenever a newer load or session reset starts
    generation: AtomicU64,
}

impl ChatManager {
    /// Create a manager with a store at the configured database path
    ///
    /// A store that cannot be opened degrades to no persistence rather
    /// than failing construction; session ids are then minted fresh each
    /// run.
    pub fn new(config: ChatConfig) -> crate::Result<Self> {
        let store = match SessionStore::open(&config.db_path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Session store unavailable, continuing without persistence: {}", e);
                None
            }
        };
        Self::with_store(config, store)
    }

    /// Create a manager backed by an in-memory store (for testing)
    pub fn in_memory(config: ChatConfig) -> crate::Result<Self> {
        let store = SessionStore::in_memory()?;
        Self::with_store(config, Some(store))
    }

    fn with_store(config: ChatConfig, store: Option<SessionStore>) -> crate::Result<Self> {
        let client = WebhookClient::new(&config)?;

        let mut initial: Vec<Message> = config
            .initial_messages
            .iter()
            .map(|text| Message::bot(text.clone()))
            .collect();
        let welcome_message = if initial.is_empty() {
            None
        } else {
            Some(initial.remove(0))
        };

        let (state, _) = watch::channel(ChatState {
            welcome_message,
            messages: initial.clone(),
            current_session_id: None,
            waiting_for_response: false,
        });

        Ok(Self {
            client,
            store: Mutex::new(store),
            session_key: config.session_key,
            input_key: config.input_key,
            metadata: config.metadata,
            load_previous_session: config.load_previous_session,
            initial_remainder: initial,
            state,
            generation: AtomicU64::new(0),
        })
    }

    /// Initialize the conversation
    ///
    /// Restores the previous session when configured to. The embedding
    /// layer decides whether to await this or spawn it in the
    /// background; construction itself performs no IO.
    pub async fn init(&self) -> Option<String> {
        self.load_session().await
    }

    /// Restore the previous session and its message history
    ///
    /// Returns the active session id, or `None` when session loading is
    /// disabled. Reads the persisted id (minting and persisting a fresh
    /// one if absent), makes it current before fetching history so a
    /// failed fetch still leaves a usable session, then replaces the
    /// transcript with the mapped history. Network and parse failures
    /// degrade to an empty history.
    pub async fn load_session(&self) -> Option<String> {
        if !self.load_previous_session {
            debug!("Session loading disabled");
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = self.stored_or_fresh_session_id();

        self.state.send_modify(|state| {
            state.current_session_id = Some(session_id.clone());
        });

        let mut params = vec![
            ("action".to_string(), "loadPreviousSession".to_string()),
            (self.session_key.clone(), session_id.clone()),
        ];
        self.push_metadata(&mut params);

        let body = self.client.execute(&params, Vec::new()).await;
        let history = map_history(&body);

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale session load for {}", session_id);
            return Some(session_id);
        }

        info!("Restored session {} with {} messages", session_id, history.len());
        self.state.send_modify(|state| {
            state.messages = history;
            state.current_session_id = Some(session_id.clone());
        });

        Some(session_id)
    }

    /// Start a fresh session
    ///
    /// Mints a new id, persists it over any stored value, and resets the
    /// transcript to the initial messages. The welcome message is left
    /// untouched and no network call is made.
    pub async fn start_new_session(&self) -> String {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let session_id = uuid::Uuid::new_v4().to_string();
        self.persist_session_id(&session_id);

        let initial = self.initial_remainder.clone();
        self.state.send_modify(|state| {
            state.current_session_id = Some(session_id.clone());
            state.messages = initial;
        });

        info!("Started new session {}", session_id);
        session_id
    }

    /// Send a user message and append the bot reply
    ///
    /// The user message is appended optimistically before any network
    /// activity and is not reverted on failure. The waiting flag is
    /// raised for the duration of the request cycle and cleared on every
    /// path: the transport degrades failures to an empty body, so
    /// nothing between raise and clear can return early. Returns the
    /// appended bot message.
    pub async fn send_message(&self, text: &str, attachments: Vec<Attachment>) -> Message {
        let user_message = Message::user(text);
        self.state.send_modify(|state| {
            state.messages.push(user_message);
            state.waiting_for_response = true;
        });

        let session_id = self.current_session_id().unwrap_or_default();
        let mut params = vec![
            ("action".to_string(), "sendMessage".to_string()),
            (self.session_key.clone(), session_id),
            (self.input_key.clone(), text.to_string()),
        ];
        self.push_metadata(&mut params);

        let body = self.client.execute(&params, attachments).await;
        let reply = extract_reply(&body);
        debug!("Bot reply: {} chars", reply.len());

        let bot_message = Message::bot(reply);
        let returned = bot_message.clone();
        self.state.send_modify(|state| {
            state.messages.push(bot_message);
            state.waiting_for_response = false;
        });

        returned
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Clone the current state
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Current transcript
    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    /// Active session id, if any
    pub fn current_session_id(&self) -> Option<String> {
        self.state.borrow().current_session_id.clone()
    }

    /// Whether a send is in flight
    pub fn waiting_for_response(&self) -> bool {
        self.state.borrow().waiting_for_response
    }

    /// The distinguished greeting message, if configured
    pub fn welcome_message(&self) -> Option<Message> {
        self.state.borrow().welcome_message.clone()
    }

    /// Read the persisted session id, minting and persisting a fresh one
    /// when absent or when storage is unavailable
    fn stored_or_fresh_session_id(&self) -> String {
        let store = self.store.lock().unwrap();
        match store.as_ref().map(|s| s.get()) {
            Some(Ok(Some(id))) => id,
            Some(Ok(None)) => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Some(store) = store.as_ref() {
                    if let Err(e) = store.put(&id) {
                        warn!("Failed to persist session id: {}", e);
                    }
                }
                id
            }
            Some(Err(e)) => {
                warn!("Failed to read session id, using a fresh one: {}", e);
                uuid::Uuid::new_v4().to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Persist a session id, tolerating storage failure
    fn persist_session_id(&self, session_id: &str) {
        let store = self.store.lock().unwrap();
        if let Some(store) = store.as_ref() {
            if let Err(e) = store.put(session_id) {
                warn!("Failed to persist session id: {}", e);
            }
        }
    }

    /// Append serialized metadata to a parameter list
    fn push_metadata(&self, params: &mut Vec<(String, String)>) {
        if let Some(metadata) = &self.metadata {
            if let Ok(serialized) = serde_json::to_string(metadata) {
                params.push(("metadata".to_string(), serialized));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpMethod;
    use crate::message::Sender;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> ChatConfig {
        let mut config = ChatConfig::new(url);
        config.initial_messages =
            vec!["Welcome!".to_string(), "Ask me anything.".to_string()];
        config
    }

    fn manager_for(url: String) -> ChatManager {
        ChatManager::in_memory(test_config(url)).unwrap()
    }

    #[tokio::test]
    async fn test_initial_messages_split() {
        let manager = manager_for("http://127.0.0.1:1/".to_string());
        assert_eq!(manager.welcome_message().unwrap().text, "Welcome!");
        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Ask me anything.");
        assert_eq!(messages[0].sender, Sender::Bot);
    }

    #[tokio::test]
    async fn test_load_disabled_is_noop() {
        let mut config = test_config("http://127.0.0.1:1/".to_string());
        config.load_previous_session = false;
        let manager = ChatManager::in_memory(config).unwrap();

        assert!(manager.init().await.is_none());
        assert!(manager.current_session_id().is_none());
        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Ask me anything.");
    }

    #[tokio::test]
    async fn test_load_session_maps_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("loadPreviousSession"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":[
                    {"id":"HumanMessage-1","kwargs":{"content":"hi"}},
                    {"id":"AIMessage-2","kwargs":{"content":"hello"}}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let session_id = manager.load_session().await;
        assert!(session_id.is_some());
        assert_eq!(manager.current_session_id(), session_id);

        let messages = manager.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].text, "hi");
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(messages[1].text, "hello");
    }

    #[tokio::test]
    async fn test_load_session_sets_id_despite_failure() {
        // Nothing listens on the endpoint; the id must still be usable
        let manager = manager_for("http://127.0.0.1:1/".to_string());
        let session_id = manager.load_session().await;
        assert!(session_id.is_some());
        assert_eq!(manager.current_session_id(), session_id);
    }

    #[tokio::test]
    async fn test_load_session_uses_get_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::query_param("action", "loadPreviousSession"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(server.uri());
        config.method = HttpMethod::Get;
        let manager = ChatManager::in_memory(config).unwrap();
        assert!(manager.load_session().await.is_some());
    }

    #[tokio::test]
    async fn test_send_message_appends_user_then_bot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"output":"hello!"}"#),
            )
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        assert!(!manager.waiting_for_response());

        let bot = manager.send_message("hi bot", Vec::new()).await;
        assert_eq!(bot.text, "hello!");
        assert!(!manager.waiting_for_response());

        let messages = manager.messages();
        assert_eq!(messages.len(), 3); // remainder + user + bot
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].text, "hi bot");
        assert_eq!(messages[2].sender, Sender::Bot);
        assert_eq!(messages[2].text, "hello!");
    }

    #[tokio::test]
    async fn test_send_message_non_json_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain text reply"))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let bot = manager.send_message("hi", Vec::new()).await;
        assert_eq!(bot.text, "plain text reply");
    }

    #[tokio::test]
    async fn test_send_message_unknown_object_dumped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"foo":"bar"}"#))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let bot = manager.send_message("hi", Vec::new()).await;
        let expected =
            serde_json::to_string_pretty(&serde_json::json!({"foo": "bar"})).unwrap();
        assert_eq!(bot.text, expected);
    }

    #[tokio::test]
    async fn test_send_message_empty_object_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let bot = manager.send_message("hi", Vec::new()).await;
        assert_eq!(bot.text, "");
    }

    #[tokio::test]
    async fn test_send_failure_clears_waiting_flag() {
        let manager = manager_for("http://127.0.0.1:1/".to_string());
        let bot = manager.send_message("hi", Vec::new()).await;
        assert_eq!(bot.text, "");
        assert!(!manager.waiting_for_response());
        // The optimistic user message survives the failure
        let messages = manager.messages();
        assert_eq!(messages[messages.len() - 2].text, "hi");
    }

    #[tokio::test]
    async fn test_waiting_flag_observed_during_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"output":"slow"}"#)
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let manager = Arc::new(manager_for(server.uri()));
        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.send_message("hi", Vec::new()).await })
        };

        let mut observed_waiting = false;
        for _ in 0..50 {
            if manager.waiting_for_response() {
                observed_waiting = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(observed_waiting);

        let bot = task.await.unwrap();
        assert_eq!(bot.text, "slow");
        assert!(!manager.waiting_for_response());
    }

    #[tokio::test]
    async fn test_start_new_session_resets_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"output":"ok"}"#))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let first = manager.load_session().await.unwrap();
        manager.send_message("hi", Vec::new()).await;
        assert!(manager.messages().len() > 1);

        let second = manager.start_new_session().await;
        assert_ne!(first, second);
        assert_eq!(manager.current_session_id(), Some(second));

        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Ask me anything.");
        assert_eq!(manager.welcome_message().unwrap().text, "Welcome!");
    }

    #[tokio::test]
    async fn test_session_id_round_trip_across_instances() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("chat.db").to_str().unwrap().to_string();

        let mut config = test_config(server.uri());
        config.db_path = db_path.clone();
        let first = ChatManager::new(config).unwrap();
        let first_id = first.load_session().await.unwrap();
        drop(first);

        let mut config = test_config(server.uri());
        config.db_path = db_path;
        let second = ChatManager::new(config).unwrap();
        let second_id = second.load_session().await.unwrap();

        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn test_new_session_invalidates_inflight_load() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("loadPreviousSession"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        r#"{"data":[{"id":"AIMessage","kwargs":{"content":"stale"}}]}"#,
                    )
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let manager = Arc::new(manager_for(server.uri()));
        let load = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.load_session().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let new_id = manager.start_new_session().await;
        load.await.unwrap();

        // The stale history must not clobber the fresh session
        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Ask me anything.");
        assert_eq!(manager.current_session_id(), Some(new_id));
    }

    #[tokio::test]
    async fn test_metadata_included_in_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("name=\"metadata\""))
            .and(body_string_contains("cli"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"output":"ok"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(server.uri());
        config.metadata = Some(serde_json::json!({"source": "cli"}));
        let manager = ChatManager::in_memory(config).unwrap();
        let bot = manager.send_message("hi", Vec::new()).await;
        assert_eq!(bot.text, "ok");
    }

    #[tokio::test]
    async fn test_subscribe_notifies_on_change() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"output":"ok"}"#))
            .mount(&server)
            .await;

        let manager = manager_for(server.uri());
        let mut receiver = manager.subscribe();

        manager.send_message("hi", Vec::new()).await;
        receiver.changed().await.unwrap();
        let state = receiver.borrow_and_update().clone();
        assert_eq!(state.messages.len(), 3);
        assert!(!state.waiting_for_response);
    }
}

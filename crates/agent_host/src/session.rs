//! Session controller: one user-submit cycle from raw input to a persisted exchange.
//!
//! The controller owns the explicit [`SessionContext`] (who is logged in and
//! what is selected) and is the only writer of the conversation store. A
//! cycle either commits a whole exchange or nothing.

use crate::assembler::{assemble_once, assemble_streaming, StreamObserver};
use crate::prompts;
use parking_lot::RwLock;
use providers::InferenceClient;
use services::persistence::{self, BlobStore};
use services::ConversationStore;
use shared::agent_api::InferenceRequest;
use shared::conversation::{Exchange, DEFAULT_CONVERSATION, GENERAL_FOLDER};
use shared::settings::ChatSettings;
use shared::{ChatError, ChatResult};
use tokio::sync::mpsc;

/// Who is logged in and which conversation is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub username: Option<String>,
    pub folder: String,
    pub conversation: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            username: None,
            folder: GENERAL_FOLDER.to_string(),
            conversation: DEFAULT_CONVERSATION.to_string(),
        }
    }
}

/// Result of one submit, handed back to the UI driver as its redraw signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The exchange was committed. `persist_error` is set if saving failed;
    /// the exchange stays in memory either way.
    Replied {
        exchange: Exchange,
        persist_error: Option<String>,
    },
    /// Nothing was sent (e.g. empty input)
    Warning(String),
    /// The request failed; nothing was committed
    Failed(String),
}

pub struct SessionController<C: InferenceClient> {
    client: C,
    blobs: Box<dyn BlobStore>,
    settings: ChatSettings,
    store: RwLock<ConversationStore>,
    context: SessionContext,
}

impl<C: InferenceClient> SessionController<C> {
    /// Load the saved store (or start empty) and build a logged-out session
    pub fn new(client: C, blobs: Box<dyn BlobStore>, settings: ChatSettings) -> Self {
        let store = persistence::load_store(blobs.as_ref());
        Self {
            client,
            blobs,
            settings,
            store: RwLock::new(store),
            context: SessionContext::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Users with saved history, in the order they first logged in
    pub fn known_users(&self) -> Vec<String> {
        self.store.read().usernames()
    }

    fn username(&self) -> ChatResult<String> {
        self.context.username.clone().ok_or(ChatError::NotLoggedIn)
    }

    fn persist(&self) -> ChatResult<()> {
        persistence::save_store(self.blobs.as_ref(), &self.store.read())
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!("failed to save conversations: {}", e);
        }
    }

    fn first_conversation(&self, username: &str, folder: &str) -> ChatResult<String> {
        let names = self.store.read().list_conversations(username, folder)?;
        Ok(names
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string()))
    }

    /// Attach to the user's history, creating it on first use
    pub fn login(&mut self, username: &str) -> ChatResult<()> {
        let created = self.store.write().ensure_user(username)?;
        let username = username.trim().to_string();
        let conversation = self.first_conversation(&username, GENERAL_FOLDER)?;
        tracing::info!(user = %username, created, "logged in");

        self.context = SessionContext {
            username: Some(username),
            folder: GENERAL_FOLDER.to_string(),
            conversation,
        };
        if created {
            self.persist_logged();
        }
        Ok(())
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.context.username.take() {
            tracing::info!(user = %user, "logged out");
        }
        self.context = SessionContext::default();
    }

    pub fn folders(&self) -> ChatResult<Vec<String>> {
        let username = self.username()?;
        self.store.read().list_folders(&username)
    }

    pub fn conversations(&self) -> ChatResult<Vec<String>> {
        let username = self.username()?;
        self.store
            .read()
            .list_conversations(&username, &self.context.folder)
    }

    /// Exchanges of the selected conversation
    pub fn history(&self) -> ChatResult<Vec<Exchange>> {
        let username = self.username()?;
        let store = self.store.read();
        let exchanges = store.get_exchanges(
            &username,
            &self.context.folder,
            &self.context.conversation,
        )?;
        Ok(exchanges.to_vec())
    }

    /// Select a folder and its first conversation
    pub fn select_folder(&mut self, name: &str) -> ChatResult<()> {
        let username = self.username()?;
        let name = name.trim().to_string();
        let conversation = self.first_conversation(&username, &name)?;
        self.context.folder = name;
        self.context.conversation = conversation;
        Ok(())
    }

    pub fn select_conversation(&mut self, name: &str) -> ChatResult<()> {
        let username = self.username()?;
        let name = name.trim();
        self.store
            .read()
            .get_exchanges(&username, &self.context.folder, name)?;
        self.context.conversation = name.to_string();
        Ok(())
    }

    /// Create a folder and switch to it
    pub fn create_folder(&mut self, name: &str) -> ChatResult<String> {
        let username = self.username()?;
        let created = self.store.write().try_create_folder(&username, name)?;
        self.persist_logged();
        self.select_folder(&created)?;
        Ok(created)
    }

    /// Rename a folder; the selection follows the renamed folder
    pub fn rename_folder(&mut self, old: &str, new: &str) -> ChatResult<String> {
        let username = self.username()?;
        let renamed = self.store.write().rename_folder(&username, old, new)?;
        if self.context.folder == old.trim() {
            self.context.folder = renamed.clone();
        }
        self.persist_logged();
        Ok(renamed)
    }

    /// Create a conversation in the selected folder and switch to it
    pub fn create_conversation(&mut self, name: &str) -> ChatResult<String> {
        let username = self.username()?;
        let created =
            self.store
                .write()
                .try_create_conversation(&username, &self.context.folder, name)?;
        self.context.conversation = created.clone();
        self.persist_logged();
        Ok(created)
    }

    pub fn rename_conversation(&mut self, old: &str, new: &str) -> ChatResult<String> {
        let username = self.username()?;
        let renamed =
            self.store
                .write()
                .rename_conversation(&username, &self.context.folder, old, new)?;
        if self.context.conversation == old.trim() {
            self.context.conversation = renamed.clone();
        }
        self.persist_logged();
        Ok(renamed)
    }

    /// Run one request/response cycle. Never fails: every error becomes a
    /// `Warning` or `Failed` outcome and leaves the store untouched.
    pub async fn submit(
        &mut self,
        raw_input: &str,
        observer: &mut dyn StreamObserver,
    ) -> SubmitOutcome {
        let message = raw_input.trim();
        if message.is_empty() {
            return SubmitOutcome::Warning(ChatError::EmptyInput.to_string());
        }

        match self.run_exchange(message, observer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("submit failed: {}", e);
                SubmitOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_exchange(
        &mut self,
        message: &str,
        observer: &mut dyn StreamObserver,
    ) -> ChatResult<SubmitOutcome> {
        let username = self.username()?;
        let folder = self.context.folder.clone();
        let conversation = self.context.conversation.clone();

        let history = self
            .store
            .read()
            .get_exchanges(&username, &folder, &conversation)?
            .to_vec();
        let request = prompts::build_request(&self.settings, &history, message);

        tracing::debug!(
            user = %username,
            folder = %folder,
            conversation = %conversation,
            stream = self.settings.stream,
            "submitting message"
        );

        let reply = if self.settings.stream {
            self.stream_reply(&request, observer).await?
        } else {
            let raw = self.client.generate(&request).await?;
            let reply = assemble_once(&raw);
            observer.on_partial(&reply, false);
            reply
        };

        let exchange = Exchange::new(message, reply);
        self.store
            .write()
            .append_exchange(&username, &folder, &conversation, exchange.clone())?;

        let persist_error = self.persist().err().map(|e| {
            tracing::warn!("failed to save conversations: {}", e);
            e.to_string()
        });

        Ok(SubmitOutcome::Replied {
            exchange,
            persist_error,
        })
    }

    async fn stream_reply(
        &self,
        request: &InferenceRequest,
        observer: &mut dyn StreamObserver,
    ) -> ChatResult<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (sent, assembled) = tokio::join!(
            self.client.generate_stream(request, tx),
            assemble_streaming(&mut rx, observer)
        );
        // The producer's error carries the transport detail; prefer it
        sent?;
        assembled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::NoopObserver;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use services::MemoryBlobStore;
    use shared::agent_api::StreamChunk;
    use shared::settings::PromptMode;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedSender;

    enum Script {
        Reply(&'static str),
        Stream(Vec<&'static str>),
        StreamThenFail(Vec<&'static str>, &'static str),
        Unavailable(&'static str),
    }

    struct FakeClient {
        script: Script,
        requests: Arc<Mutex<Vec<InferenceRequest>>>,
    }

    impl FakeClient {
        fn new(script: Script) -> (Self, Arc<Mutex<Vec<InferenceRequest>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    script,
                    requests: Arc::clone(&requests),
                },
                requests,
            )
        }
    }

    #[async_trait]
    impl InferenceClient for FakeClient {
        async fn generate(&self, request: &InferenceRequest) -> ChatResult<String> {
            self.requests.lock().push(request.clone());
            match &self.script {
                Script::Reply(text) => Ok(text.to_string()),
                Script::Unavailable(msg) => Err(ChatError::InferenceUnavailable(msg.to_string())),
                _ => panic!("streaming script used without streaming"),
            }
        }

        async fn generate_stream(
            &self,
            request: &InferenceRequest,
            tx: UnboundedSender<StreamChunk>,
        ) -> ChatResult<()> {
            self.requests.lock().push(request.clone());
            match &self.script {
                Script::Stream(tokens) => {
                    for token in tokens {
                        let _ = tx.send(StreamChunk::Text(token.to_string()));
                        tokio::task::yield_now().await;
                    }
                    let _ = tx.send(StreamChunk::Done);
                    Ok(())
                }
                Script::StreamThenFail(tokens, msg) => {
                    for token in tokens {
                        let _ = tx.send(StreamChunk::Text(token.to_string()));
                        tokio::task::yield_now().await;
                    }
                    Err(ChatError::InferenceUnavailable(msg.to_string()))
                }
                Script::Unavailable(msg) => Err(ChatError::InferenceUnavailable(msg.to_string())),
                Script::Reply(_) => panic!("non-streaming script used for streaming"),
            }
        }
    }

    fn settings(stream: bool, prompt_mode: PromptMode) -> ChatSettings {
        ChatSettings {
            stream,
            prompt_mode,
            system_prompt: "sys".into(),
            ..ChatSettings::default()
        }
    }

    fn controller(
        script: Script,
        settings: ChatSettings,
    ) -> (
        SessionController<FakeClient>,
        MemoryBlobStore,
        Arc<Mutex<Vec<InferenceRequest>>>,
    ) {
        let (client, requests) = FakeClient::new(script);
        let blobs = MemoryBlobStore::new();
        let mut session = SessionController::new(client, Box::new(blobs.clone()), settings);
        session.login("ana").unwrap();
        (session, blobs, requests)
    }

    #[tokio::test]
    async fn test_empty_input_is_a_warning() {
        let (mut session, blobs, requests) = controller(
            Script::Reply("unused"),
            settings(false, PromptMode::SingleShot),
        );
        let before = blobs.contents();

        let outcome = session.submit("   \n", &mut NoopObserver).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Warning(ChatError::EmptyInput.to_string())
        );
        assert!(requests.lock().is_empty());
        assert_eq!(blobs.contents(), before);
        assert!(session.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_submit_commits_filtered_reply() {
        let (mut session, blobs, _) = controller(
            Script::Stream(vec!["<think>", "pondering", "</think>", "\n\nHello", " there"]),
            settings(true, PromptMode::HistoryAware),
        );

        let outcome = session.submit("  hi  ", &mut NoopObserver).await;

        let expected = Exchange::new("hi", "Hello there");
        assert_eq!(
            outcome,
            SubmitOutcome::Replied {
                exchange: expected.clone(),
                persist_error: None
            }
        );
        assert_eq!(session.history().unwrap(), vec![expected.clone()]);

        let saved = persistence::decode(&blobs.contents().unwrap()).unwrap();
        assert_eq!(
            saved
                .get_exchanges("ana", GENERAL_FOLDER, DEFAULT_CONVERSATION)
                .unwrap(),
            &[expected]
        );
    }

    #[tokio::test]
    async fn test_non_streaming_submit_strips_reasoning() {
        let (mut session, _, requests) = controller(
            Script::Reply("<think>\nhmm\n</think>\n\n¡Hola!"),
            settings(false, PromptMode::SingleShot),
        );

        let outcome = session.submit("hola", &mut NoopObserver).await;

        match outcome {
            SubmitOutcome::Replied { exchange, .. } => assert_eq!(exchange.bot, "¡Hola!"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            requests.lock()[0],
            InferenceRequest::Prompt("System: sys\nUser: hola\nAssistant:".into())
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_commits_nothing() {
        let (mut session, blobs, _) = controller(
            Script::StreamThenFail(vec!["Partial", " answer"], "connection reset"),
            settings(true, PromptMode::HistoryAware),
        );
        let before = blobs.contents();

        let outcome = session.submit("question", &mut NoopObserver).await;

        match outcome {
            SubmitOutcome::Failed(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(session.history().unwrap().is_empty());
        assert_eq!(blobs.contents(), before);
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_reported_not_stored() {
        let (mut session, _, _) = controller(
            Script::Unavailable("connection refused"),
            settings(false, PromptMode::SingleShot),
        );

        let outcome = session.submit("hello", &mut NoopObserver).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Failed(
                ChatError::InferenceUnavailable("connection refused".into()).to_string()
            )
        );
        assert!(session.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_aware_request_replays_conversation() {
        let (mut session, _, requests) = controller(
            Script::Stream(vec!["ok"]),
            settings(true, PromptMode::HistoryAware),
        );

        session.submit("first", &mut NoopObserver).await;
        session.submit("second", &mut NoopObserver).await;

        let requests = requests.lock();
        match &requests[1] {
            InferenceRequest::Chat(messages) => {
                let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
                assert_eq!(contents, vec!["sys", "first", "ok", "second"]);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_requires_login() {
        let (client, _) = FakeClient::new(Script::Reply("hi"));
        let mut session = SessionController::new(
            client,
            Box::new(MemoryBlobStore::new()),
            settings(false, PromptMode::SingleShot),
        );

        let outcome = session.submit("hello", &mut NoopObserver).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Failed(ChatError::NotLoggedIn.to_string())
        );
    }

    #[tokio::test]
    async fn test_login_reattaches_saved_history() {
        let (mut session, blobs, _) = controller(
            Script::Reply("answer"),
            settings(false, PromptMode::SingleShot),
        );
        session.submit("question", &mut NoopObserver).await;
        session.logout();

        let (client, _) = FakeClient::new(Script::Reply("unused"));
        let mut reloaded = SessionController::new(
            client,
            Box::new(blobs.clone()),
            settings(false, PromptMode::SingleShot),
        );
        assert_eq!(reloaded.known_users(), vec!["ana"]);
        reloaded.login("ana").unwrap();

        assert_eq!(
            reloaded.history().unwrap(),
            vec![Exchange::new("question", "answer")]
        );
    }

    #[test]
    fn test_corrupt_saved_blob_starts_empty() {
        let (client, _) = FakeClient::new(Script::Reply("unused"));
        let session = SessionController::new(
            client,
            Box::new(MemoryBlobStore::with_blob("{{{")),
            ChatSettings::default(),
        );
        assert!(session.known_users().is_empty());
    }

    #[test]
    fn test_folder_management_follows_selection() {
        let (mut session, blobs, _) = controller(
            Script::Reply("unused"),
            settings(false, PromptMode::SingleShot),
        );

        session.rename_folder(GENERAL_FOLDER, "Archive").unwrap();
        assert_eq!(session.context().folder, "Archive");
        assert_eq!(session.folders().unwrap(), vec![GENERAL_FOLDER, "Archive"]);

        let created = session.create_folder(" Work ").unwrap();
        assert_eq!(created, "Work");
        assert_eq!(session.context().folder, "Work");
        assert_eq!(session.context().conversation, DEFAULT_CONVERSATION);

        assert_eq!(
            session.create_folder("Work"),
            Err(ChatError::duplicate("folder", "Work"))
        );
        assert_eq!(
            session.select_folder("Nowhere"),
            Err(ChatError::not_found("folder", "Nowhere"))
        );

        let saved = persistence::decode(&blobs.contents().unwrap()).unwrap();
        assert_eq!(
            saved.list_folders("ana").unwrap(),
            vec![GENERAL_FOLDER, "Archive", "Work"]
        );
    }

    #[test]
    fn test_conversation_management() {
        let (mut session, _, _) = controller(
            Script::Reply("unused"),
            settings(false, PromptMode::SingleShot),
        );

        session.create_conversation("Trip").unwrap();
        assert_eq!(session.context().conversation, "Trip");

        session.rename_conversation("Trip", "Holiday").unwrap();
        assert_eq!(session.context().conversation, "Holiday");
        assert_eq!(
            session.conversations().unwrap(),
            vec![DEFAULT_CONVERSATION, "Holiday"]
        );

        session.select_conversation(DEFAULT_CONVERSATION).unwrap();
        assert_eq!(session.context().conversation, DEFAULT_CONVERSATION);
        assert!(matches!(
            session.select_conversation("Missing"),
            Err(ChatError::NotFound { kind: "conversation", .. })
        ));
        assert_eq!(
            session.rename_conversation("Holiday", "  "),
            Err(ChatError::BlankName {
                kind: "conversation"
            })
        );
    }
}

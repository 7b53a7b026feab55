//! Chat-turn driver.
//!
//! One `ChefSession` is one conversation: it owns the transcript, the prompt
//! mode and the recipe waiting to be saved. Each turn runs
//! send → stream → extract → parse, and a save runs the submitter.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::SousError;
use crate::extract::{extract_recipe_block, Extraction};
use crate::llm::{ChatBackend, ChatMode, ChefRequest};
use crate::models::{CandidateRecipe, ChatEntry, ConversationMessage, PersistedRecipe, PromptMessage};
use crate::normalize::RecipeParser;
use crate::stream::collect_text;
use crate::submit::Submitter;

pub const COOKING_SESSION_LABEL: &str = "New Cooking Session";

const APOLOGY: &str = "I apologize, but I had trouble formatting that recipe properly. Let's try again! Could you tell me what kind of recipe you'd like to create?";

/// A fenced block is always treated as a recipe attempt. A bare `{...}` only
/// counts when it is valid JSON, so prose like "add {salt} to taste" stays
/// conversation.
fn holds_recipe_block(reply: &str) -> bool {
    match extract_recipe_block(reply) {
        Extraction::Fenced(_) => true,
        Extraction::Bare(candidate) => {
            serde_json::from_str::<serde_json::Value>(candidate).is_ok()
        }
        Extraction::NotFound => false,
    }
}

pub fn recipe_created_message(title: &str) -> String {
    format!("🎉 I've created a recipe for \"{title}\"! Here's what we came up with:")
}

pub fn recipe_saved_message(title: &str) -> String {
    format!(
        "✅ Perfect! I've saved \"{title}\" to your recipe collection. You can now access it anytime from your recipe library and get cooking assistance when you're ready to make it!"
    )
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Ordinary reply, appended as-is.
    Conversation(String),
    /// A recipe was found and validated; it is now pending.
    RecipeReady(CandidateRecipe),
    /// A recipe block was found but rejected; carries the reason.
    RecipeRejected(String),
}

pub struct ChefSession {
    chat: Arc<dyn ChatBackend>,
    parser: Arc<dyn RecipeParser>,
    submitter: Submitter,
    user_id: Option<Uuid>,
    session_id: Option<String>,
    mode: ChatMode,
    entries: Vec<ChatEntry>,
    pending: Option<CandidateRecipe>,
    stream_timeout: Duration,
}

impl ChefSession {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        parser: Arc<dyn RecipeParser>,
        submitter: Submitter,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            chat,
            parser,
            submitter,
            user_id,
            session_id: None,
            mode: ChatMode::Generation,
            entries: Vec::new(),
            pending: None,
            stream_timeout: Duration::from_secs(60),
        }
    }

    /// Persist this conversation's turns server-side under `session_id`.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn pending(&self) -> Option<&CandidateRecipe> {
        self.pending.as_ref()
    }

    /// Messages only, in order. Markers are display-only.
    pub fn transcript(&self) -> Vec<ConversationMessage> {
        self.entries
            .iter()
            .filter_map(ChatEntry::as_message)
            .cloned()
            .collect()
    }

    pub fn prompt_messages(&self) -> Vec<PromptMessage> {
        self.entries
            .iter()
            .filter_map(ChatEntry::as_message)
            .map(PromptMessage::from)
            .collect()
    }

    /// Run one chat turn.
    ///
    /// On a transport failure the user message is removed again so the
    /// transcript looks as it did before the call.
    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome, SousError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SousError::InvalidInput("message is empty".to_string()));
        }

        self.entries
            .push(ChatEntry::Message(ConversationMessage::user(text)));

        let request = ChefRequest {
            user_id: self.user_id,
            chat_mode: self.mode,
            messages: self.prompt_messages(),
            session_id: self.session_id.clone(),
        };

        let reply = match self.fetch_reply(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.entries.pop();
                tracing::warn!(backend = %self.chat.name(), error = %e, "Chat turn failed");
                return Err(SousError::Network("Failed to send message.".to_string()));
            }
        };

        if self.mode == ChatMode::CookingHelp || !holds_recipe_block(&reply) {
            self.push_assistant(reply.clone());
            return Ok(TurnOutcome::Conversation(reply));
        }

        match self.parser.parse(&reply, self.user_id).await {
            Ok(recipe) => {
                tracing::info!(title = %recipe.title, "Recipe ready to save");
                self.push_assistant(recipe_created_message(&recipe.title));
                self.pending = Some(recipe.clone());
                Ok(TurnOutcome::RecipeReady(recipe))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recipe block rejected");
                self.push_assistant(APOLOGY.to_string());
                self.pending = None;
                Ok(TurnOutcome::RecipeRejected(e.user_message()))
            }
        }
    }

    async fn fetch_reply(&self, request: &ChefRequest) -> Result<String, SousError> {
        let stream = self.chat.stream_chat(request).await?;
        collect_text(stream, self.stream_timeout).await
    }

    /// Save the pending recipe together with the transcript so far.
    ///
    /// A failure leaves the session untouched so the save can be retried.
    pub async fn save(&mut self) -> Result<PersistedRecipe, SousError> {
        let recipe = self
            .pending
            .as_ref()
            .ok_or_else(|| SousError::InvalidInput("There is no recipe to save yet.".to_string()))?;

        let saved = self
            .submitter
            .submit(recipe, self.user_id, Some(self.transcript()))
            .await?;

        self.pending = None;
        self.push_assistant(recipe_saved_message(&saved.title));
        Ok(saved)
    }

    /// Continue from a saved recipe's generation transcript in cooking-help mode.
    pub fn begin_cooking(&mut self, recipe: &PersistedRecipe) {
        self.entries = recipe
            .generation_chat_log
            .iter()
            .flatten()
            .cloned()
            .map(ChatEntry::Message)
            .collect();
        self.entries.push(ChatEntry::marker(COOKING_SESSION_LABEL));
        self.mode = ChatMode::CookingHelp;
        self.pending = None;
        tracing::debug!(recipe_id = %recipe.id, history = self.entries.len() - 1, "Cooking session started");
    }

    fn push_assistant(&mut self, content: String) {
        self.entries
            .push(ChatEntry::Message(ConversationMessage::assistant(content)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RecipeCollection;
    use crate::models::Role;
    use crate::normalize::LocalRecipeParser;
    use crate::store::MemoryStore;
    use crate::stream::TextStream;
    use crate::submit::test_support::{tomato_soup, BrokenStore, FixedEstimator};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const TOMATO_REPLY: &str = "Sure! ```json\n{\"title\":\"Tomato Soup\",\"ingredients\":[{\"name\":\"tomato\",\"amount\":\"4\"}],\"instructions\":[\"Boil\",\"Blend\"]}\n```";

    /// Replays canned replies, split into chunks, and records every request.
    #[derive(Default)]
    struct ScriptedChat {
        replies: Mutex<VecDeque<Result<String, String>>>,
        requests: Mutex<Vec<ChefRequest>>,
    }

    impl ScriptedChat {
        fn with(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        async fn stream_chat(&self, request: &ChefRequest) -> Result<TextStream, SousError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no reply scripted".to_string()));
            match reply {
                Ok(text) => {
                    let chunks: Vec<Result<Bytes, SousError>> = text
                        .as_bytes()
                        .chunks(7)
                        .map(|c| Ok(Bytes::copy_from_slice(c)))
                        .collect();
                    Ok(futures::stream::iter(chunks).boxed())
                }
                Err(msg) => Err(SousError::Network(msg)),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn session(
        chat: Arc<ScriptedChat>,
        user: Option<Uuid>,
    ) -> (ChefSession, Arc<MemoryStore>, RecipeCollection) {
        let store = Arc::new(MemoryStore::new());
        let collection = RecipeCollection::new();
        let submitter = Submitter::new(
            Arc::new(FixedEstimator::ok()),
            store.clone(),
            collection.clone(),
        );
        let session = ChefSession::new(chat, Arc::new(LocalRecipeParser), submitter, user);
        (session, store, collection)
    }

    fn last_content(s: &ChefSession) -> String {
        s.transcript().last().map(|m| m.content.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_tomato_soup_turn_then_save() {
        let chat = ScriptedChat::with(vec![Ok(TOMATO_REPLY)]);
        let user = Uuid::new_v4();
        let (mut s, store, collection) = session(chat, Some(user));

        let outcome = s.send("Make me tomato soup").await.unwrap();
        match outcome {
            TurnOutcome::RecipeReady(r) => {
                assert_eq!(r.title, "Tomato Soup");
                assert_eq!(r.ingredients[0].name, "tomato");
                assert_eq!(r.ingredients[0].amount, "4");
                assert_eq!(r.instructions.len(), 2);
            }
            other => panic!("expected RecipeReady, got {:?}", other),
        }
        assert_eq!(last_content(&s), recipe_created_message("Tomato Soup"));
        assert!(s.pending().is_some());

        let saved = s.save().await.unwrap();
        assert!(saved.is_ai_generated);
        assert_eq!(saved.user_id, Some(user));
        assert_eq!(saved.generation_chat_log.as_ref().map(Vec::len), Some(2));
        assert_eq!(collection.len(), 1);
        assert_eq!(store.recipe_count(), 1);
        assert!(s.pending().is_none());
        assert_eq!(last_content(&s), recipe_saved_message("Tomato Soup"));
    }

    #[tokio::test]
    async fn test_plain_conversation_turn() {
        let reply = "I think chicken and rice would be great!";
        let chat = ScriptedChat::with(vec![Ok(reply)]);
        let (mut s, store, collection) = session(chat, Some(Uuid::new_v4()));

        let outcome = s.send("ideas?").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Conversation(reply.to_string()));
        assert_eq!(s.transcript().len(), 2);
        assert_eq!(last_content(&s), reply);
        assert!(s.pending().is_none());
        assert!(collection.is_empty());
        assert_eq!(store.recipe_count(), 0);
    }

    #[tokio::test]
    async fn test_braces_in_prose_stay_conversation() {
        let reply = "Season it with {your favourite herbs} and serve warm!";
        let chat = ScriptedChat::with(vec![Ok(reply)]);
        let (mut s, _, _) = session(chat, Some(Uuid::new_v4()));

        let outcome = s.send("how do I finish it?").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Conversation(reply.to_string()));
        assert_eq!(last_content(&s), reply);
        assert!(s.pending().is_none());
    }

    #[tokio::test]
    async fn test_bare_json_missing_fields_is_rejected() {
        let chat = ScriptedChat::with(vec![Ok("Here it is: {\"title\": \"Stew\"}")]);
        let (mut s, _, _) = session(chat, Some(Uuid::new_v4()));

        let outcome = s.send("save it").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::RecipeRejected(_)));
        assert_eq!(last_content(&s), APOLOGY);
    }

    #[tokio::test]
    async fn test_network_failure_rolls_back_user_message() {
        let chat = ScriptedChat::with(vec![Ok("Hello!"), Err("connection reset")]);
        let (mut s, _, _) = session(chat, Some(Uuid::new_v4()));

        s.send("hi").await.unwrap();
        let before = s.entries().to_vec();

        let err = s.send("still there?").await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(err.user_message(), "Failed to send message. Please try again.");
        assert_eq!(s.entries(), before.as_slice());
    }

    #[tokio::test]
    async fn test_malformed_recipe_apologizes_and_stays_usable() {
        let chat = ScriptedChat::with(vec![
            Ok("```json\n{\"title\": \"Half a recipe\"}\n```"),
            Ok("What would you like instead?"),
        ]);
        let (mut s, _, _) = session(chat, Some(Uuid::new_v4()));

        match s.send("save it").await.unwrap() {
            TurnOutcome::RecipeRejected(reason) => {
                assert!(reason.contains("ingredients"));
                assert!(reason.contains("instructions"));
            }
            other => panic!("expected RecipeRejected, got {:?}", other),
        }
        assert_eq!(last_content(&s), APOLOGY);
        assert!(s.pending().is_none());

        let outcome = s.send("something else").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Conversation(_)));
    }

    #[tokio::test]
    async fn test_cooking_session_filters_marker_from_prompt() {
        let chat = ScriptedChat::with(vec![Ok("Start by chopping the tomatoes.")]);
        let (mut s, _, _) = session(chat.clone(), Some(Uuid::new_v4()));

        let mut recipe = crate::models::PersistedRecipe::from_new(
            Uuid::new_v4(),
            crate::models::NewRecipe {
                user_id: None,
                title: "Tomato Soup".to_string(),
                description: None,
                ingredients: tomato_soup().ingredients,
                instructions: tomato_soup().instructions,
                notes: Default::default(),
                prep_time: None,
                cook_time: None,
                servings: None,
                image_url: None,
                is_ai_generated: true,
                generation_chat_log: None,
                nutrition: None,
            },
            chrono::Utc::now(),
        );
        recipe.generation_chat_log = Some(vec![
            ConversationMessage::user("tomato soup please"),
            ConversationMessage::assistant("Here it is"),
        ]);

        s.begin_cooking(&recipe);
        assert_eq!(s.mode(), ChatMode::CookingHelp);
        assert_eq!(s.entries().len(), 3);
        assert!(matches!(
            s.entries().last(),
            Some(ChatEntry::SessionMarker { label, .. }) if label == COOKING_SESSION_LABEL
        ));

        s.send("where do I start?").await.unwrap();

        let requests = chat.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.chat_mode, ChatMode::CookingHelp);
        assert_eq!(sent.messages.len(), 3);
        assert!(sent
            .messages
            .iter()
            .all(|m| m.content != COOKING_SESSION_LABEL));
        assert_eq!(sent.messages[2].role, Role::User);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_pending_recipe() {
        let chat = ScriptedChat::with(vec![Ok(TOMATO_REPLY)]);
        let collection = RecipeCollection::new();
        let submitter = Submitter::new(
            Arc::new(FixedEstimator::ok()),
            Arc::new(BrokenStore {
                calls: AtomicUsize::new(0),
            }),
            collection.clone(),
        );
        let mut s = ChefSession::new(
            chat,
            Arc::new(LocalRecipeParser),
            submitter,
            Some(Uuid::new_v4()),
        );

        s.send("tomato soup").await.unwrap();
        let before = s.entries().to_vec();

        assert!(matches!(s.save().await, Err(SousError::Persistence(_))));
        assert!(s.pending().is_some());
        assert_eq!(s.entries(), before.as_slice());
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_save_is_rejected() {
        let chat = ScriptedChat::with(vec![Ok(TOMATO_REPLY)]);
        let (mut s, store, _) = session(chat, None);

        s.send("tomato soup").await.unwrap();
        assert!(matches!(s.save().await, Err(SousError::Auth(_))));
        assert_eq!(store.recipe_count(), 0);
        assert!(s.pending().is_some());
    }

    #[tokio::test]
    async fn test_save_without_pending_recipe() {
        let chat = ScriptedChat::with(vec![]);
        let (mut s, _, _) = session(chat, Some(Uuid::new_v4()));
        assert!(matches!(s.save().await, Err(SousError::InvalidInput(_))));
    }
}

//! Chat session state management and request execution

use futures::StreamExt;
use neethi_api::{ChunkStream, GenerationOptions, Message, Role};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::{Conversation, SessionState},
    error::{Error, Result},
    events::{NoticeLevel, SessionEvent},
    handle::SessionHandle,
    storage::{LocalStorage, Preferences},
    transport::Transport,
};

/// Owns every conversation, the active selection and the busy flag, and
/// drives requests against a [`Transport`].
///
/// Cloning is cheap; clones share the same state. State is only mutated
/// through these methods, and every change is broadcast as a
/// [`SessionEvent`].
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<SessionState>,
    preferences: Mutex<Preferences>,
    defaults: GenerationOptions,
    transport: Arc<dyn Transport>,
    storage: LocalStorage,
    /// Cleared when stored conversations could not be read, so they are
    /// never overwritten
    writable: AtomicBool,
    event_tx: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
}

impl ChatSession {
    /// Create a session, restoring whatever `storage` holds.
    ///
    /// Unreadable conversations are logged and the session starts empty,
    /// with conversation writes disabled until [`clear_conversations`]
    /// purges storage. Messages left streaming by an interrupted run are
    /// settled, and a stored active id that names no conversation is dropped.
    ///
    /// [`clear_conversations`]: Self::clear_conversations
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: LocalStorage,
        defaults: GenerationOptions,
    ) -> Self {
        let (mut conversations, writable) = match storage.load_conversations() {
            Ok(conversations) => (conversations, true),
            Err(e) => {
                tracing::warn!(
                    "Error loading conversations, leaving stored data untouched: {}",
                    e
                );
                (Vec::new(), false)
            }
        };
        let repaired: usize = conversations
            .iter_mut()
            .map(Conversation::settle_streaming)
            .sum();
        if repaired > 0 {
            tracing::info!("Settled {} interrupted message(s)", repaired);
        }

        let active_id = storage
            .load_active_id()
            .unwrap_or_else(|e| {
                tracing::warn!("Error loading active conversation: {}", e);
                None
            })
            .filter(|id| {
                let known = conversations.iter().any(|c| &c.id == id);
                if !known {
                    tracing::debug!("Dropping stale active conversation id {}", id);
                }
                known
            });

        let preferences = storage.load_preferences().unwrap_or_else(|e| {
            tracing::warn!("Error loading preferences: {}", e);
            Preferences::default()
        });

        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    conversations,
                    active_id,
                    is_busy: false,
                    last_error: None,
                }),
                preferences: Mutex::new(preferences),
                defaults,
                transport,
                storage,
                writable: AtomicBool::new(writable),
                event_tx,
                handle: SessionHandle::new(),
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Snapshot of the whole state
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    /// Snapshot of the active conversation
    pub fn active_conversation(&self) -> Option<Conversation> {
        self.inner.state.lock().active().cloned()
    }

    /// Snapshot of every conversation
    pub fn conversations(&self) -> Vec<Conversation> {
        self.inner.state.lock().conversations.clone()
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.state.lock().active_id.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    /// Whether a request is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().is_busy
    }

    /// Get a cloneable handle for poking the session from external code.
    pub fn handle(&self) -> SessionHandle {
        self.inner.handle.clone()
    }

    /// Abort the in-flight request. Content streamed so far is kept.
    pub fn abort(&self) {
        self.inner.handle.abort();
    }

    /// Wait until no request is in flight.
    pub async fn wait_for_idle(&self) {
        self.inner.handle.wait_for_idle().await;
    }

    /// Generation options for the next request: defaults overlaid with
    /// the stored preferences
    pub fn options(&self) -> GenerationOptions {
        self.inner.preferences.lock().apply(&self.inner.defaults)
    }

    pub fn preferences(&self) -> Preferences {
        self.inner.preferences.lock().clone()
    }

    /// Replace and persist the preferences
    pub fn set_preferences(&self, preferences: Preferences) {
        if let Err(e) = self.inner.storage.save_preferences(&preferences) {
            tracing::warn!("Error saving preferences: {}", e);
        }
        *self.inner.preferences.lock() = preferences;
    }

    /// Send a user message and stream the assistant's reply into the
    /// active conversation, creating one if none is active.
    ///
    /// Blank input is ignored. Fails with [`Error::Busy`] while another
    /// request is in flight. On a transport failure the partial reply is
    /// kept, the error is recorded and returned.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let guard = self.begin()?;
        self.run_exchange(guard, text.to_string()).await
    }

    /// Drop the last assistant reply and its prompt, then send the prompt
    /// again.
    ///
    /// Does nothing unless the active conversation ends in an assistant
    /// reply to a user message.
    pub async fn regenerate_last_message(&self) -> Result<()> {
        let mut events = Vec::new();
        let prompt = self.update(|state| {
            if state.is_busy {
                return Err(Error::Busy);
            }
            let Some(conversation) = state.active_mut() else {
                return Ok(None);
            };
            let Some(prompt) = conversation.take_last_exchange() else {
                return Ok(None);
            };
            events.push(SessionEvent::MessagesTruncated {
                conversation_id: conversation.id.clone(),
                remaining: conversation.messages.len(),
            });
            state.is_busy = true;
            state.last_error = None;
            Ok(Some(prompt))
        })?;

        let Some(prompt) = prompt else {
            tracing::debug!("Nothing to regenerate");
            return Ok(());
        };
        let guard = self.acquired();
        self.emit_all(events);
        self.run_exchange(guard, prompt).await
    }

    /// Send a user message and wait for the complete reply without
    /// streaming.
    pub async fn complete_once(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let guard = self.begin()?;
        let (conversation_id, history) = self.append_user_message(text.to_string());
        let options = self.options();
        let token = self.inner.handle.token();

        let result = tokio::select! {
            _ = token.cancelled() => Err(Error::Aborted),
            response = self.inner.transport.complete(history, &options) => {
                response.map_err(Error::from)
            }
        };

        match result {
            Ok(response) => {
                let mut reply = response.message;
                reply.role = Role::Assistant;
                reply.is_streaming = false;
                let appended = self.update(|state| {
                    let conversation = state.conversation_mut(&conversation_id)?;
                    conversation.push(reply.clone());
                    Some(reply)
                });
                if let Some(message) = appended {
                    self.emit(SessionEvent::MessageAppended {
                        conversation_id,
                        message,
                    });
                }
                drop(guard);
                Ok(())
            }
            Err(e) => {
                self.record_failure(&e);
                drop(guard);
                Err(e)
            }
        }
    }

    /// Create an empty conversation and make it active.
    ///
    /// It is persisted with the next change that writes conversations.
    pub fn create_new_conversation(&self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.update(|state| {
            state.conversations.push(conversation);
            state.active_id = Some(id.clone());
        });
        self.emit(SessionEvent::ConversationCreated {
            conversation_id: id.clone(),
        });
        self.emit(SessionEvent::ActiveChanged {
            conversation_id: Some(id.clone()),
        });
        id
    }

    /// Make `id` the active conversation. Unknown ids are ignored.
    pub fn switch_conversation(&self, id: &str) -> bool {
        let switched = self.update(|state| {
            if !state.contains(id) {
                return false;
            }
            state.active_id = Some(id.to_string());
            true
        });
        if !switched {
            tracing::debug!("Ignoring switch to unknown conversation {}", id);
            return false;
        }
        if self.is_writable() {
            if let Err(e) = self.inner.storage.save_active_id(Some(id)) {
                tracing::warn!("Error saving active conversation: {}", e);
            }
        }
        self.emit(SessionEvent::ActiveChanged {
            conversation_id: Some(id.to_string()),
        });
        true
    }

    /// Delete a conversation. If it was active, the first remaining
    /// conversation becomes active.
    pub fn delete_conversation(&self, id: &str) -> bool {
        let outcome = self.update(|state| {
            let index = state.conversations.iter().position(|c| c.id == id)?;
            state.conversations.remove(index);
            let was_active = state.active_id.as_deref() == Some(id);
            if was_active {
                state.active_id = state.conversations.first().map(|c| c.id.clone());
            }
            Some(was_active.then(|| state.active_id.clone()))
        });
        let Some(active_change) = outcome else {
            tracing::debug!("Ignoring delete of unknown conversation {}", id);
            return false;
        };

        self.flush();
        self.emit(SessionEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        });
        if let Some(conversation_id) = active_change {
            self.emit(SessionEvent::ActiveChanged { conversation_id });
        }
        self.notify(NoticeLevel::Success, "Conversation deleted");
        true
    }

    /// Set a conversation's title verbatim
    pub fn rename_conversation(&self, id: &str, title: &str) -> bool {
        let renamed = self.update(|state| match state.conversation_mut(id) {
            Some(conversation) => {
                conversation.title = title.to_string();
                conversation.touch();
                true
            }
            None => false,
        });
        if !renamed {
            return false;
        }
        self.flush();
        self.emit(SessionEvent::ConversationRenamed {
            conversation_id: id.to_string(),
            title: title.to_string(),
        });
        true
    }

    /// Remove every conversation and purge storage
    pub fn clear_conversations(&self) {
        self.update(|state| {
            state.conversations.clear();
            state.active_id = None;
            state.last_error = None;
        });
        match self.inner.storage.clear_all() {
            Ok(()) => self.inner.writable.store(true, Ordering::Release),
            Err(e) => tracing::warn!("Error clearing storage: {}", e),
        }
        *self.inner.preferences.lock() = Preferences::default();
        self.emit(SessionEvent::Cleared);
        self.emit(SessionEvent::ActiveChanged {
            conversation_id: None,
        });
        self.notify(NoticeLevel::Success, "All conversations cleared");
    }

    // ---- Request plumbing ----

    /// Claim the busy flag, or fail if a request is already in flight
    fn begin(&self) -> Result<RequestGuard> {
        self.update(|state| {
            if state.is_busy {
                return Err(Error::Busy);
            }
            state.is_busy = true;
            state.last_error = None;
            Ok(())
        })?;
        Ok(self.acquired())
    }

    /// Side effects of a successful busy claim
    fn acquired(&self) -> RequestGuard {
        self.inner.handle.start();
        self.emit(SessionEvent::BusyChanged { busy: true });
        RequestGuard {
            session: self.clone(),
            target: None,
        }
    }

    /// Append a user message to the active conversation, creating one if
    /// needed. Returns the conversation id and the history to send.
    fn append_user_message(&self, text: String) -> (String, Vec<Message>) {
        let mut events = Vec::new();
        let result = self.update(|state| {
            let (index, created) = state.ensure_active();
            let conversation = &mut state.conversations[index];
            if created {
                events.push(SessionEvent::ConversationCreated {
                    conversation_id: conversation.id.clone(),
                });
                events.push(SessionEvent::ActiveChanged {
                    conversation_id: Some(conversation.id.clone()),
                });
            }

            let previous_title = conversation.title.clone();
            let message = Message::user(text);
            conversation.push(message.clone());
            events.push(SessionEvent::MessageAppended {
                conversation_id: conversation.id.clone(),
                message,
            });
            if conversation.title != previous_title {
                events.push(SessionEvent::ConversationRenamed {
                    conversation_id: conversation.id.clone(),
                    title: conversation.title.clone(),
                });
            }
            (conversation.id.clone(), conversation.messages.clone())
        });
        self.emit_all(events);
        result
    }

    /// Append the user message plus a streaming placeholder, then stream
    /// the reply into the placeholder.
    async fn run_exchange(&self, mut guard: RequestGuard, text: String) -> Result<()> {
        let (conversation_id, history) = self.append_user_message(text);

        let placeholder = Message::assistant_placeholder();
        let message_id = placeholder.id.clone();
        self.update(|state| {
            if let Some(conversation) = state.conversation_mut(&conversation_id) {
                conversation.push(placeholder.clone());
            }
        });
        guard.target = Some((conversation_id.clone(), message_id.clone()));
        self.emit(SessionEvent::MessageAppended {
            conversation_id: conversation_id.clone(),
            message: placeholder,
        });

        let options = self.options();
        let token = self.inner.handle.token();
        let result = self
            .stream_reply(&conversation_id, &message_id, history, &options, &token)
            .await;

        if let Err(ref e) = result {
            self.record_failure(e);
        }
        // Settles the placeholder, releases busy and persists
        drop(guard);
        result
    }

    async fn stream_reply(
        &self,
        conversation_id: &str,
        message_id: &str,
        history: Vec<Message>,
        options: &GenerationOptions,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut chunks: ChunkStream = tokio::select! {
            _ = token.cancelled() => return Err(Error::Aborted),
            stream = self.inner.transport.stream(history, options) => stream?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Aborted),
                next = chunks.next() => next,
            };
            match next {
                Some(Ok(delta)) => self.apply_chunk(conversation_id, message_id, delta),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }

    fn apply_chunk(&self, conversation_id: &str, message_id: &str, delta: String) {
        let applied = self.update(|state| {
            let conversation = state.conversation_mut(conversation_id)?;
            conversation.message_mut(message_id)?.content.push_str(&delta);
            conversation.touch();
            Some(())
        });
        match applied {
            Some(()) => self.emit(SessionEvent::MessageUpdated {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                delta,
            }),
            None => tracing::debug!("Dropping chunk for removed message {}", message_id),
        }
    }

    fn record_failure(&self, error: &Error) {
        if matches!(error, Error::Aborted) {
            tracing::info!("Request aborted");
            return;
        }
        let message = error.to_string();
        tracing::error!("Error sending message: {}", message);
        self.update(|state| state.last_error = Some(message.clone()));
        self.emit(SessionEvent::Error { message });
        self.notify(NoticeLevel::Error, "Failed to send message");
    }

    // ---- State helpers ----

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.inner.state.lock();
        f(&mut state)
    }

    fn is_writable(&self) -> bool {
        self.inner.writable.load(Ordering::Acquire)
    }

    /// Best-effort write of the conversations and the active id
    fn flush(&self) {
        if !self.is_writable() {
            tracing::debug!("Skipping save, stored conversations were unreadable");
            return;
        }
        let (conversations, active_id) = {
            let state = self.inner.state.lock();
            (state.conversations.clone(), state.active_id.clone())
        };
        if let Err(e) = self.inner.storage.save_conversations(&conversations) {
            tracing::warn!("Error saving conversations: {}", e);
        }
        if let Err(e) = self.inner.storage.save_active_id(active_id.as_deref()) {
            tracing::warn!("Error saving active conversation: {}", e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.emit(SessionEvent::Notice {
            level,
            message: message.to_string(),
        });
    }
}

/// Releases the busy flag when a request ends, however it ends.
///
/// Clears the streaming flag on the target message, persists the state
/// and wakes idle waiters.
struct RequestGuard {
    session: ChatSession,
    target: Option<(String, String)>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let session = &self.session;
        let settled = session.update(|state| {
            state.is_busy = false;
            let (conversation_id, message_id) = self.target.as_ref()?;
            let conversation = state.conversation_mut(conversation_id)?;
            let was_streaming = conversation
                .message_mut(message_id)
                .map(|m| std::mem::replace(&mut m.is_streaming, false))
                .unwrap_or(false);
            if !was_streaming {
                return None;
            }
            conversation.touch();
            Some((conversation_id.clone(), message_id.clone()))
        });

        session.flush();
        session.inner.handle.finish();
        if let Some((conversation_id, message_id)) = settled {
            session.emit(SessionEvent::StreamEnded {
                conversation_id,
                message_id,
            });
        }
        session.emit(SessionEvent::BusyChanged { busy: false });
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use dociq_llm::{ChatMessage, ChatRequest, Role, Utf8StreamDecoder};
use futures::StreamExt;

use crate::message::{
    Message, MessageId, MessageStatus, StreamState, StreamTransition, Transcript, TurnId,
};
use crate::samples::{DocumentStats, SampleDoc};
use crate::transport::{ChatTransport, TransportResult};

/// Shown in place of the assistant reply when a turn fails.
pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Result of one [`ChatSession::submit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, blank document, or a turn already streaming.
    Ignored,
    Completed(TurnId),
    Failed(TurnId),
}

/// Document the session is answering questions about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedDocument {
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
struct SessionState {
    transcript: Transcript,
    stream_state: StreamState,
    next_message_id: u64,
    next_turn_id: u64,
}

impl SessionState {
    fn alloc_message_id(&mut self) -> MessageId {
        self.next_message_id += 1;
        MessageId::new(self.next_message_id)
    }

    fn alloc_turn_id(&mut self) -> TurnId {
        self.next_turn_id += 1;
        TurnId::new(self.next_turn_id)
    }
}

/// Accepted turn, owned by the `submit` future.
///
/// Ends the turn on drop, so a submit cancelled mid-stream still releases
/// the streaming guard and marks its reply slot cancelled.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    turn: TurnId,
    assistant_id: MessageId,
    finished: bool,
}

impl TurnGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
        self.session.finish_turn(self.turn);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!(turn = self.turn.0, "chat turn dropped before completion");
        self.session.cancel_reply(self.assistant_id);
        self.session.finish_turn(self.turn);
    }
}

/// Client-side controller for one document conversation.
///
/// Cloning shares the same conversation. Locks are never held across an await.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    document: Arc<ArcSwap<LoadedDocument>>,
    transport: Arc<dyn ChatTransport>,
}

impl ChatSession {
    /// Creates an idle session with no document and an empty transcript.
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            document: Arc::new(ArcSwap::from_pointee(LoadedDocument::default())),
            transport,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent between statements, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current document snapshot.
    pub fn document(&self) -> Arc<LoadedDocument> {
        self.document.load_full()
    }

    /// Replaces the document text; the transcript is kept.
    pub fn set_document(&self, text: impl Into<String>) {
        self.document.store(Arc::new(LoadedDocument {
            title: None,
            text: text.into(),
        }));
    }

    /// Loads a built-in sample and starts a fresh transcript.
    pub fn load_sample(&self, sample: &SampleDoc) {
        self.document.store(Arc::new(LoadedDocument {
            title: Some(sample.title.to_string()),
            text: sample.content.to_string(),
        }));
        self.reset_transcript();
    }

    /// Drops both document and transcript. An in-flight turn keeps running
    /// but can no longer write into the transcript.
    pub fn clear(&self) {
        self.document.store(Arc::new(LoadedDocument::default()));
        self.reset_transcript();
    }

    /// Empties the transcript, keeping the document.
    pub fn reset_transcript(&self) {
        self.lock().transcript.clear();
    }

    /// Character and word counts of the current document.
    pub fn document_stats(&self) -> DocumentStats {
        DocumentStats::of(&self.document.load().text)
    }

    /// Copies the transcript for rendering.
    pub fn snapshot(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    /// Returns the current streaming state.
    pub fn state(&self) -> StreamState {
        self.lock().stream_state
    }

    /// Returns true while a turn is in flight.
    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Runs one turn to completion: appends the question, streams the reply
    /// into a placeholder, then returns to idle.
    ///
    /// Dropping the returned future mid-turn cancels the turn: the reply slot
    /// is marked [`MessageStatus::Cancelled`] and the session goes idle.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let question = input.trim();
        // Captured once; later document edits do not affect this request.
        let document = self.document.load_full();
        if question.is_empty() || document.text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let Some((guard, history)) = self.begin_turn(question) else {
            tracing::debug!("submit ignored while a turn is streaming");
            return SubmitOutcome::Ignored;
        };

        let request = ChatRequest::new(document.text.clone(), history);
        let result = self.stream_reply(&guard, request).await;
        let outcome = match result {
            Ok(()) => SubmitOutcome::Completed(guard.turn),
            Err(error) => {
                tracing::warn!(turn = guard.turn.0, error = %error, "chat turn failed");
                self.write_reply(guard.assistant_id, APOLOGY_MESSAGE, MessageStatus::Failed);
                SubmitOutcome::Failed(guard.turn)
            }
        };
        guard.finish();
        outcome
    }

    fn begin_turn(&self, question: &str) -> Option<(TurnGuard<'_>, Vec<ChatMessage>)> {
        let mut state = self.lock();
        let turn = state.alloc_turn_id();
        let next = state
            .stream_state
            .apply(StreamTransition::Start(turn))
            .ok()?;
        state.stream_state = next;

        let user_id = state.alloc_message_id();
        let assistant_id = state.alloc_message_id();
        state.transcript.push(Message::user(user_id, question));
        let history = state.transcript.history();
        state
            .transcript
            .push(Message::assistant_streaming(assistant_id, turn));

        let guard = TurnGuard {
            session: self,
            turn,
            assistant_id,
            finished: false,
        };
        Some((guard, history))
    }

    async fn stream_reply(&self, guard: &TurnGuard<'_>, request: ChatRequest) -> TransportResult<()> {
        let mut reply = self.transport.open(request).await?;
        let mut decoder = Utf8StreamDecoder::new();
        let mut content = String::new();

        while let Some(chunk) = reply.next().await {
            content.push_str(&decoder.decode(&chunk?));
            self.write_reply(
                guard.assistant_id,
                &content,
                MessageStatus::Streaming(guard.turn),
            );
        }

        content.push_str(&decoder.finish());
        self.write_reply(guard.assistant_id, &content, MessageStatus::Done);
        Ok(())
    }

    /// Replaces the whole reply slot, if it still exists.
    fn write_reply(&self, assistant_id: MessageId, content: &str, status: MessageStatus) {
        let mut state = self.lock();
        let Some(message) = state.transcript.get_mut(assistant_id) else {
            tracing::debug!(message_id = assistant_id.0, "reply slot cleared; dropping write");
            return;
        };
        debug_assert_eq!(message.role, Role::Assistant);
        message.content.clear();
        message.content.push_str(content);
        message.status = status;
    }

    /// Keeps whatever text arrived and marks the slot cancelled.
    fn cancel_reply(&self, assistant_id: MessageId) {
        let mut state = self.lock();
        match state.transcript.get_mut(assistant_id) {
            Some(message) if message.is_streaming() => message.status = MessageStatus::Cancelled,
            _ => {}
        }
    }

    fn finish_turn(&self, turn: TurnId) {
        let mut state = self.lock();
        match state.stream_state.apply(StreamTransition::Finish(turn)) {
            Ok(next) => state.stream_state = next,
            Err(rejection) => {
                tracing::warn!(turn = turn.0, ?rejection, "stream state out of sync on finish");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use dociq_llm::BoxFuture;
    use futures::stream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::samples::SAMPLE_DOCS;
    use crate::transport::{ReplyStream, TransportError};

    #[derive(Default)]
    struct FakeTransport {
        replies: Mutex<VecDeque<TransportResult<ReplyStream>>>,
        requests: Mutex<Vec<ChatRequest>>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn push(&self, reply: TransportResult<ReplyStream>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn push_chunks(&self, chunks: Vec<&'static [u8]>) {
            let items = chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect::<Vec<_>>();
            self.push(Ok(stream::iter(items).boxed()));
        }

        /// Reply that stays open until the returned sender is dropped.
        fn push_channel(&self) -> mpsc::Sender<TransportResult<Bytes>> {
            let (sender, receiver) = mpsc::channel(8);
            let reply = stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|item| (item, receiver))
            })
            .boxed();
            self.push(Ok(reply));
            sender
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    impl ChatTransport for FakeTransport {
        fn open<'a>(
            &'a self,
            request: ChatRequest,
        ) -> BoxFuture<'a, TransportResult<ReplyStream>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.requests.lock().unwrap().push(request);
                self.replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(TransportError::disconnected("fake", "no reply scripted")))
            })
        }
    }

    fn session_with(transport: &Arc<FakeTransport>) -> ChatSession {
        let session = ChatSession::new(transport.clone());
        session.set_document("The sky is blue.");
        session
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn last_content(session: &ChatSession) -> String {
        session.snapshot().last().unwrap().content.clone()
    }

    #[tokio::test]
    async fn streamed_reply_fills_assistant_message() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_chunks(vec![b"The sky ", b"is blue."]);
        let session = session_with(&transport);

        let outcome = session.submit("  What color is the sky?  ").await;
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert!(!session.is_streaming());

        let transcript = session.snapshot();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].content, "What color is the sky?");
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
        assert_eq!(transcript.messages()[1].content, "The sky is blue.");
        assert_eq!(transcript.messages()[1].status, MessageStatus::Done);

        let request = transport.request(0);
        assert_eq!(request.document, "The sky is blue.");
        assert_eq!(request.messages, vec![ChatMessage::user("What color is the sky?")]);
    }

    #[tokio::test]
    async fn submit_while_streaming_is_ignored() {
        let transport = Arc::new(FakeTransport::default());
        let reply = transport.push_channel();
        let session = session_with(&transport);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.submit("What color is the sky?").await }
        });
        wait_until(|| transport.calls() == 1).await;

        reply.send(Ok(Bytes::from_static(b"The sky "))).await.unwrap();
        wait_until(|| last_content(&session) == "The sky ").await;
        assert!(matches!(
            session.snapshot().last().unwrap().status,
            MessageStatus::Streaming(_)
        ));

        assert_eq!(session.submit("Are you sure?").await, SubmitOutcome::Ignored);
        assert_eq!(session.snapshot().len(), 2);
        assert_eq!(transport.calls(), 1);

        reply.send(Ok(Bytes::from_static(b"is blue."))).await.unwrap();
        drop(reply);
        assert!(matches!(running.await.unwrap(), SubmitOutcome::Completed(_)));
        assert_eq!(last_content(&session), "The sky is blue.");
        assert_eq!(session.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn aborted_submit_releases_the_session() {
        let transport = Arc::new(FakeTransport::default());
        let reply = transport.push_channel();
        let session = session_with(&transport);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.submit("What color is the sky?").await }
        });
        wait_until(|| transport.calls() == 1).await;
        reply.send(Ok(Bytes::from_static(b"The sky "))).await.unwrap();
        wait_until(|| last_content(&session) == "The sky ").await;
        assert!(session.state().active_turn().is_some());

        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        assert!(!session.is_streaming());
        assert_eq!(session.state().active_turn(), None);
        let cancelled = session.snapshot().last().unwrap().clone();
        assert_eq!(cancelled.content, "The sky ");
        assert_eq!(cancelled.status, MessageStatus::Cancelled);

        transport.push_chunks(vec![b"Blue."]);
        let outcome = session.submit("Are you sure?").await;
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert_eq!(transport.calls(), 2);
        assert_eq!(last_content(&session), "Blue.");
        assert_eq!(
            transport.request(1).messages,
            vec![
                ChatMessage::user("What color is the sky?"),
                ChatMessage::new(Role::Assistant, "The sky "),
                ChatMessage::user("Are you sure?"),
            ]
        );
    }

    #[tokio::test]
    async fn blank_input_or_document_is_ignored() {
        let transport = Arc::new(FakeTransport::default());
        let session = ChatSession::new(transport.clone());

        assert_eq!(session.submit("question").await, SubmitOutcome::Ignored);
        session.set_document("   \n");
        assert_eq!(session.submit("question").await, SubmitOutcome::Ignored);
        session.set_document("doc");
        assert_eq!(session.submit("   ").await, SubmitOutcome::Ignored);

        assert!(session.snapshot().is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn disconnect_shows_apology_and_next_turn_works() {
        let transport = Arc::new(FakeTransport::default());
        transport.push(Ok(stream::iter(vec![
            Ok(Bytes::from_static(b"The sky ")),
            Err(TransportError::disconnected("fake", "reset by peer")),
        ])
        .boxed()));
        transport.push_chunks(vec![b"Blue."]);
        let session = session_with(&transport);

        let outcome = session.submit("What color is the sky?").await;
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        let failed = session.snapshot().last().unwrap().clone();
        assert_eq!(failed.content, APOLOGY_MESSAGE);
        assert_eq!(failed.status, MessageStatus::Failed);
        assert!(!session.is_streaming());

        let outcome = session.submit("Say it again").await;
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert_eq!(last_content(&session), "Blue.");
        assert_eq!(session.snapshot().len(), 4);
        assert_eq!(
            transport.request(1).messages,
            vec![
                ChatMessage::user("What color is the sky?"),
                ChatMessage::assistant(APOLOGY_MESSAGE),
                ChatMessage::user("Say it again"),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_request_shows_apology() {
        let transport = Arc::new(FakeTransport::default());
        transport.push(Err(TransportError::ResponseStatus {
            stage: "fake",
            status: 500,
        }));
        let session = session_with(&transport);

        assert!(matches!(
            session.submit("question").await,
            SubmitOutcome::Failed(_)
        ));
        assert_eq!(last_content(&session), APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn clear_mid_stream_drops_late_writes() {
        let transport = Arc::new(FakeTransport::default());
        let reply = transport.push_channel();
        let session = session_with(&transport);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.submit("What color is the sky?").await }
        });
        wait_until(|| transport.calls() == 1).await;

        session.clear();
        assert!(session.snapshot().is_empty());
        assert!(session.is_streaming());

        reply.send(Ok(Bytes::from_static(b"late text"))).await.unwrap();
        drop(reply);
        running.await.unwrap();

        assert!(session.snapshot().is_empty());
        assert!(!session.is_streaming());
        assert_eq!(session.document_stats(), DocumentStats::default());
    }

    #[tokio::test]
    async fn multibyte_text_split_across_chunks_is_preserved() {
        let transport = Arc::new(FakeTransport::default());
        let text = "Le ciel est bleu \u{2014} 天空是蓝色的.";
        let bytes = text.as_bytes();
        // Split inside the em dash and inside a CJK character.
        let dash = text.find('\u{2014}').unwrap() + 1;
        let cjk = text.find('天').unwrap() + 2;
        let owned = vec![
            bytes[..dash].to_vec(),
            bytes[dash..cjk].to_vec(),
            bytes[cjk..].to_vec(),
        ];
        transport.push(Ok(stream::iter(
            owned.into_iter().map(|chunk| Ok(Bytes::from(chunk))).collect::<Vec<_>>(),
        )
        .boxed()));
        let session = session_with(&transport);

        session.submit("Translate").await;
        assert_eq!(last_content(&session), text);
    }

    #[tokio::test]
    async fn loading_a_sample_resets_transcript() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_chunks(vec![b"ok"]);
        let session = session_with(&transport);
        session.submit("hello").await;
        assert_eq!(session.snapshot().len(), 2);

        session.load_sample(&SAMPLE_DOCS[0]);
        assert!(session.snapshot().is_empty());
        let document = session.document();
        assert_eq!(document.title.as_deref(), Some("Employment Contract"));
        assert_eq!(session.document_stats(), DocumentStats::of(SAMPLE_DOCS[0].content));
    }
}

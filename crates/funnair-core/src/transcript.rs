//! Chat transcript and the reconciler that grows it from streamed fragments
//!
//! A [`ChatSession`] owns the transcript and a small phase machine. Only the
//! last message can change, and only while the session is
//! [`ChatPhase::AwaitingResponse`]; every change replaces that message with
//! a new value so renderers that compare states see each step.

use std::future::Future;

use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::{ChatId, ChatMessage, ChatRole};
use crate::stream::{StreamDecoder, StreamItem};

/// Shown in place of a reply that failed
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    AwaitingResponse,
    /// The last reply failed. Accepts new input like `Idle`.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("message is empty")]
    Empty,
    #[error("a response is still streaming")]
    Busy,
}

/// Result of feeding one event to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The reply grew
    Updated,
    /// The reply finished; bookings may have changed
    Completed,
    /// The reply was replaced by [`ERROR_REPLY`]
    Failed,
    Cancelled,
    /// Nothing to apply it to
    Ignored,
}

/// Ordered chat messages for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn replace_last(&mut self, message: ChatMessage) {
        if let Some(last) = self.messages.last_mut() {
            *last = message;
        }
    }

    fn pop(&mut self) {
        self.messages.pop();
    }
}

pub struct ChatSession {
    chat_id: ChatId,
    transcript: Transcript,
    phase: ChatPhase,
    // reply text so far for the current cycle
    accumulated: String,
    reply_started: bool,
    cycle: u64,
}

impl ChatSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            transcript: Transcript::new(),
            phase: ChatPhase::Idle,
            accumulated: String::new(),
            reply_started: false,
            cycle: 0,
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase == ChatPhase::AwaitingResponse
    }

    /// Counter bumped by every accepted submission. Events from a stream
    /// started under an older cycle must be dropped by the caller.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether the reply placeholder is still empty while waiting
    pub fn is_reply_pending(&self) -> bool {
        self.is_busy() && self.accumulated.is_empty()
    }

    /// Append the user's message and start waiting for a reply.
    ///
    /// Returns the text to send. Rejected while a reply is streaming.
    pub fn submit(&mut self, input: &str) -> Result<String, SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::Busy);
        }
        if input.trim().is_empty() {
            return Err(SubmitError::Empty);
        }

        self.transcript.push(ChatMessage::user(input));
        self.phase = ChatPhase::AwaitingResponse;
        self.accumulated.clear();
        self.reply_started = false;
        self.cycle += 1;
        debug!(cycle = self.cycle, "chat message submitted");
        Ok(input.to_string())
    }

    /// Append the empty assistant message that fragments will fill.
    /// Does nothing unless a reply is awaited and not yet started.
    pub fn begin_response(&mut self) -> bool {
        if !self.is_busy() || self.reply_started {
            return false;
        }
        self.transcript.push(ChatMessage::assistant(""));
        self.reply_started = true;
        true
    }

    pub fn apply_item(&mut self, item: StreamItem) -> Step {
        if !self.is_busy() {
            return Step::Ignored;
        }
        self.begin_response();

        match item {
            StreamItem::Fragment(text) => {
                self.accumulated.push_str(&text);
                if let Some(last) = self.transcript.last() {
                    let updated = last.with_content(self.accumulated.as_str());
                    self.transcript.replace_last(updated);
                }
                Step::Updated
            }
            StreamItem::Done => self.complete(),
        }
    }

    /// The stream ended without `[DONE]`; treated like a normal finish
    pub fn apply_end(&mut self) -> Step {
        if !self.is_busy() {
            return Step::Ignored;
        }
        self.complete()
    }

    pub fn apply_error(&mut self, err: &ApiError) -> Step {
        if !self.is_busy() {
            return Step::Ignored;
        }
        if err.is_cancelled() {
            return self.cancel();
        }

        warn!(error = %err, cycle = self.cycle, "chat reply failed");
        let reply = ChatMessage::assistant(ERROR_REPLY);
        if self.reply_started {
            self.transcript.replace_last(reply);
        } else {
            self.transcript.push(reply);
        }
        self.finish(ChatPhase::Error);
        Step::Failed
    }

    /// Stop the current reply, keeping whatever text already arrived
    pub fn cancel(&mut self) -> Step {
        if !self.is_busy() {
            return Step::Ignored;
        }

        let placeholder = self.transcript.last().map(|m| m.role) == Some(ChatRole::Assistant);
        if self.reply_started && placeholder && self.accumulated.is_empty() {
            self.transcript.pop();
        }
        info!(cycle = self.cycle, chars = self.accumulated.len(), "chat reply cancelled");
        self.finish(ChatPhase::Idle);
        Step::Cancelled
    }

    fn complete(&mut self) -> Step {
        info!(cycle = self.cycle, chars = self.accumulated.len(), "chat reply complete");
        self.finish(ChatPhase::Idle);
        Step::Completed
    }

    fn finish(&mut self, phase: ChatPhase) {
        self.phase = phase;
        self.reply_started = false;
        self.accumulated.clear();
    }
}

/// Run one full exchange: submit `input`, open a stream with `connect`, and
/// apply its items until it ends.
///
/// `observe` sees the transcript after every change. `on_refresh` runs once,
/// after a reply completes, and never after a failure or cancellation.
pub async fn exchange<C, Fut, S, E>(
    session: &mut ChatSession,
    input: &str,
    connect: C,
    mut observe: impl FnMut(&Transcript),
    on_refresh: impl FnOnce(),
) -> Result<Step, SubmitError>
where
    C: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<StreamDecoder<S>, ApiError>>,
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let message = session.submit(input)?;
    observe(session.transcript());
    session.begin_response();
    observe(session.transcript());

    let mut decoder = match connect(message).await {
        Ok(decoder) => decoder,
        Err(e) => {
            let step = session.apply_error(&e);
            observe(session.transcript());
            return Ok(step);
        }
    };

    loop {
        let step = match decoder.next().await {
            Some(Ok(item)) => session.apply_item(item),
            Some(Err(e)) => session.apply_error(&e),
            None => session.apply_end(),
        };

        match step {
            Step::Updated => observe(session.transcript()),
            Step::Completed => {
                on_refresh();
                return Ok(step);
            }
            Step::Failed | Step::Cancelled => {
                observe(session.transcript());
                return Ok(step);
            }
            Step::Ignored => return Ok(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use reqwest::StatusCode;
    use std::io;
    use tokio_util::sync::CancellationToken;

    type Chunk = Result<Bytes, io::Error>;
    type TestDecoder = StreamDecoder<stream::Iter<std::vec::IntoIter<Chunk>>>;

    fn fragment(s: &str) -> StreamItem {
        StreamItem::Fragment(s.to_string())
    }

    fn events(parts: &[&str]) -> Vec<Chunk> {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("data: {}\n\n", serde_json::json!({ "chunk": part })));
        }
        body.push_str("data: [DONE]\n\n");
        vec![Ok(Bytes::from(body))]
    }

    fn decoder_for(chunks: Vec<Chunk>) -> TestDecoder {
        StreamDecoder::new(stream::iter(chunks), CancellationToken::new())
    }

    fn last_content(session: &ChatSession) -> &str {
        &session.transcript().last().unwrap().content
    }

    #[test]
    fn test_submit_appends_user_then_assistant() {
        let mut session = ChatSession::new(ChatId::new());
        let sent = session.submit("Show my bookings").unwrap();
        assert_eq!(sent, "Show my bookings");
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript().messages()[0].role, ChatRole::User);
        assert_eq!(session.phase(), ChatPhase::AwaitingResponse);

        assert!(session.begin_response());
        assert!(!session.begin_response());
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "");
        assert!(session.is_reply_pending());
    }

    #[test]
    fn test_submit_rejects_blank_input() {
        let mut session = ChatSession::new(ChatId::new());
        assert_eq!(session.submit("   "), Err(SubmitError::Empty));
        assert!(session.transcript().is_empty());
        assert_eq!(session.phase(), ChatPhase::Idle);
    }

    #[test]
    fn test_submit_rejected_while_streaming() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("first").unwrap();
        session.apply_item(fragment("Hel"));

        assert_eq!(session.submit("second"), Err(SubmitError::Busy));
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.cycle(), 1);

        session.apply_item(fragment("lo"));
        assert_eq!(last_content(&session), "Hello");
    }

    #[test]
    fn test_fragments_accumulate_in_order() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        session.begin_response();
        let id = session.transcript().last().unwrap().id;

        let mut seen = Vec::new();
        for part in ["He", "llo", " world"] {
            assert_eq!(session.apply_item(fragment(part)), Step::Updated);
            seen.push(last_content(&session).to_string());
        }
        assert_eq!(seen, vec!["He", "Hello", "Hello world"]);
        assert_eq!(session.transcript().last().unwrap().id, id);

        assert_eq!(session.apply_item(StreamItem::Done), Step::Completed);
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert_eq!(last_content(&session), "Hello world");
    }

    #[test]
    fn test_items_after_completion_are_ignored() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        session.apply_item(fragment("done"));
        assert_eq!(session.apply_item(StreamItem::Done), Step::Completed);

        assert_eq!(session.apply_item(fragment("late")), Step::Ignored);
        assert_eq!(session.apply_item(StreamItem::Done), Step::Ignored);
        assert_eq!(session.apply_end(), Step::Ignored);
        assert_eq!(last_content(&session), "done");
    }

    #[test]
    fn test_error_replaces_partial_reply() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        session.apply_item(fragment("Your "));
        session.apply_item(fragment("booking"));
        let partial_id = session.transcript().last().unwrap().id;

        let err = ApiError::Stream(Box::new(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
        assert_eq!(session.apply_error(&err), Step::Failed);

        let last = session.transcript().last().unwrap();
        assert_eq!(last.content, ERROR_REPLY);
        assert_eq!(last.role, ChatRole::Assistant);
        assert_ne!(last.id, partial_id);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.phase(), ChatPhase::Error);

        // a failed cycle doesn't block the next one
        assert!(session.submit("again").is_ok());
    }

    #[test]
    fn test_error_before_reply_started() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        let err = ApiError::Request {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Failed to get chat response".to_string(),
        };
        assert_eq!(session.apply_error(&err), Step::Failed);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(last_content(&session), ERROR_REPLY);
    }

    #[test]
    fn test_cancel_keeps_partial_text() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        session.apply_item(fragment("Your flight"));

        assert_eq!(session.cancel(), Step::Cancelled);
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert_eq!(last_content(&session), "Your flight");
        assert_eq!(session.apply_item(fragment(" is late")), Step::Ignored);
        assert_eq!(session.apply_error(&ApiError::Cancelled), Step::Ignored);
    }

    #[test]
    fn test_cancel_drops_empty_placeholder() {
        let mut session = ChatSession::new(ChatId::new());
        session.submit("hi").unwrap();
        session.begin_response();
        assert_eq!(session.apply_error(&ApiError::Cancelled), Step::Cancelled);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript().last().unwrap().role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_exchange_end_to_end() {
        let mut session = ChatSession::new(ChatId::new());
        let mut snapshots: Vec<Vec<(ChatRole, String)>> = Vec::new();
        let mut refreshes = 0;

        let step = exchange(
            &mut session,
            "Show my bookings",
            |message| async move {
                assert_eq!(message, "Show my bookings");
                Ok::<_, ApiError>(decoder_for(events(&["Your ", "booking is CONFIRMED."])))
            },
            |t| {
                snapshots.push(
                    t.messages()
                        .iter()
                        .map(|m| (m.role, m.content.clone()))
                        .collect(),
                )
            },
            || refreshes += 1,
        )
        .await
        .unwrap();

        assert_eq!(step, Step::Completed);
        assert_eq!(refreshes, 1);

        let user = (ChatRole::User, "Show my bookings".to_string());
        let reply = |s: &str| (ChatRole::Assistant, s.to_string());
        assert_eq!(
            snapshots,
            vec![
                vec![user.clone()],
                vec![user.clone(), reply("")],
                vec![user.clone(), reply("Your ")],
                vec![user.clone(), reply("Your booking is CONFIRMED.")],
            ]
        );
    }

    #[tokio::test]
    async fn test_exchange_transport_error_skips_refresh() {
        let mut session = ChatSession::new(ChatId::new());
        let mut chunks = vec![Ok(Bytes::from_static(
            b"data: {\"chunk\": \"He\"}\ndata: {\"chunk\": \"llo\"}\n",
        ))];
        chunks.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        let mut refreshed = false;

        let step = exchange(
            &mut session,
            "hi",
            |_| async move { Ok::<_, ApiError>(decoder_for(chunks)) },
            |_| {},
            || refreshed = true,
        )
        .await
        .unwrap();

        assert_eq!(step, Step::Failed);
        assert!(!refreshed);
        assert_eq!(last_content(&session), ERROR_REPLY);
    }

    #[tokio::test]
    async fn test_exchange_connect_failure() {
        let mut session = ChatSession::new(ChatId::new());
        let mut refreshed = false;

        let step = exchange(
            &mut session,
            "hi",
            |_| async move {
                Err::<TestDecoder, _>(ApiError::Request {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    detail: "Failed to get chat response".to_string(),
                })
            },
            |_| {},
            || refreshed = true,
        )
        .await
        .unwrap();

        assert_eq!(step, Step::Failed);
        assert!(!refreshed);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(last_content(&session), ERROR_REPLY);
    }

    #[tokio::test]
    async fn test_exchange_without_done_still_refreshes() {
        let mut session = ChatSession::new(ChatId::new());
        let chunks = vec![Ok(Bytes::from_static(b"data: {\"chunk\": \"ok\"}\n"))];
        let mut refreshes = 0;

        let step = exchange(
            &mut session,
            "hi",
            |_| async move { Ok::<_, ApiError>(decoder_for(chunks)) },
            |_| {},
            || refreshes += 1,
        )
        .await
        .unwrap();

        assert_eq!(step, Step::Completed);
        assert_eq!(refreshes, 1);
        assert_eq!(last_content(&session), "ok");
    }

    #[tokio::test]
    async fn test_exchange_rejects_blank_input() {
        let mut session = ChatSession::new(ChatId::new());
        let result = exchange(
            &mut session,
            "",
            |_| async move { Ok::<_, ApiError>(decoder_for(Vec::new())) },
            |_| {},
            || {},
        )
        .await;
        assert_eq!(result, Err(SubmitError::Empty));
    }
}

use dociq_llm::{ChatMessage, Role};

/// Identifier for one user turn and the assistant reply it produces.
///
/// Allocated fresh on every accepted submit so late writes from a finished
/// or cleared turn can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    /// Wraps a raw counter value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stable identifier for one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Wraps a raw counter value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    Streaming(TurnId),
    /// Content has been replaced with the apology text.
    Failed,
    /// The turn was dropped mid-stream; content holds whatever arrived.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
}

impl Message {
    /// Builds a message with explicit status.
    pub fn new(id: MessageId, role: Role, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            status,
        }
    }

    /// Finished user message.
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content, MessageStatus::Done)
    }

    /// Empty assistant slot that a streaming turn fills in.
    pub fn assistant_streaming(id: MessageId, turn: TurnId) -> Self {
        Self::new(id, Role::Assistant, String::new(), MessageStatus::Streaming(turn))
    }

    /// True while a turn is still writing into this slot.
    pub fn is_streaming(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming(_))
    }
}

/// Ordered conversation history for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Looks a message up by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Mutable lookup by id; `None` once the transcript was cleared.
    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages, including an in-flight slot.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Wire history for the next request. Skips slots still being filled and blank messages.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|message| !message.content.trim().is_empty())
            .filter(|message| !message.is_streaming())
            .map(|message| ChatMessage::new(message.role, message.content.clone()))
            .collect()
    }
}

/// Streaming lifecycle of a session. At most one turn is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(TurnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransition {
    Start(TurnId),
    /// Ends the turn whether it completed or failed.
    Finish(TurnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming { active: TurnId, attempted: TurnId },
    NoActiveStream,
    TurnMismatch { active: TurnId, attempted: TurnId },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    /// Turn currently in flight, if any.
    pub fn active_turn(&self) -> Option<TurnId> {
        match self {
            Self::Streaming(turn) => Some(*turn),
            Self::Idle => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Computes the next state, rejecting overlapping or stale transitions.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match (self, transition) {
            (Self::Idle, StreamTransition::Start(turn)) => Ok(Self::Streaming(turn)),
            (Self::Streaming(active), StreamTransition::Start(attempted)) => {
                Err(StreamTransitionRejection::AlreadyStreaming {
                    active: *active,
                    attempted,
                })
            }
            (Self::Streaming(active), StreamTransition::Finish(turn)) if *active == turn => {
                Ok(Self::Idle)
            }
            (Self::Streaming(active), StreamTransition::Finish(attempted)) => {
                Err(StreamTransitionRejection::TurnMismatch {
                    active: *active,
                    attempted,
                })
            }
            (Self::Idle, StreamTransition::Finish(_)) => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_is_rejected_while_streaming() {
        let streaming = StreamState::Idle
            .apply(StreamTransition::Start(TurnId::new(1)))
            .unwrap();
        assert_eq!(
            streaming.apply(StreamTransition::Start(TurnId::new(2))),
            Err(StreamTransitionRejection::AlreadyStreaming {
                active: TurnId::new(1),
                attempted: TurnId::new(2),
            })
        );
    }

    #[test]
    fn finish_must_match_active_turn() {
        let streaming = StreamState::Streaming(TurnId::new(3));
        assert!(matches!(
            streaming.apply(StreamTransition::Finish(TurnId::new(4))),
            Err(StreamTransitionRejection::TurnMismatch { .. })
        ));
        assert_eq!(
            streaming.apply(StreamTransition::Finish(TurnId::new(3))),
            Ok(StreamState::Idle)
        );
        assert_eq!(
            StreamState::Idle.apply(StreamTransition::Finish(TurnId::new(3))),
            Err(StreamTransitionRejection::NoActiveStream)
        );
    }

    #[test]
    fn history_skips_streaming_and_blank_messages() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user(MessageId::new(1), "first"));
        transcript.push(Message::new(
            MessageId::new(2),
            Role::Assistant,
            "Sorry",
            MessageStatus::Failed,
        ));
        transcript.push(Message::new(
            MessageId::new(3),
            Role::Assistant,
            "  ",
            MessageStatus::Done,
        ));
        transcript.push(Message::user(MessageId::new(4), "second"));
        transcript.push(Message::assistant_streaming(MessageId::new(5), TurnId::new(2)));

        let history = transcript.history();
        assert_eq!(
            history,
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("Sorry"),
                ChatMessage::user("second"),
            ]
        );
    }

    #[test]
    fn messages_are_found_by_id_not_position() {
        let mut transcript = Transcript::new();
        transcript.push(Message::assistant_streaming(MessageId::new(7), TurnId::new(1)));
        transcript.push(Message::user(MessageId::new(8), "later"));

        transcript.get_mut(MessageId::new(7)).unwrap().content = "filled".to_string();
        assert_eq!(transcript.get(MessageId::new(7)).unwrap().content, "filled");
        assert_eq!(transcript.last().unwrap().content, "later");
        assert!(transcript.get(MessageId::new(9)).is_none());
    }
}

use crate::cli::ConversationMode;
use crate::model::Message;

/// One prompt/response exchange. The response is empty while the request
/// for this turn is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub prompt: String,
    pub response: String,
}

impl Turn {
    pub fn pending(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: String::new(),
        }
    }
}

/// Conversation state for one run. `Persistent` grows across prompts and is
/// only ever touched by the sequential path; `Ephemeral` holds a single turn
/// and is private to one worker.
#[derive(Debug)]
pub enum Transcript {
    Persistent(Vec<Turn>),
    Ephemeral(Option<Turn>),
}

impl Transcript {
    pub fn new(mode: ConversationMode) -> Self {
        match mode {
            ConversationMode::On => Self::Persistent(Vec::new()),
            ConversationMode::Off => Self::Ephemeral(None),
        }
    }

    pub fn add_prompt(&mut self, prompt: impl Into<String>) {
        match self {
            Self::Persistent(turns) => turns.push(Turn::pending(prompt)),
            Self::Ephemeral(slot) => *slot = Some(Turn::pending(prompt)),
        }
    }

    /// Overwrites the response of the most recent turn. Recording several
    /// choices in arrival order leaves the last one standing as the
    /// transcript answer, while all choices are still reported downstream.
    pub fn record_response(&mut self, response: impl Into<String>) {
        let latest = match self {
            Self::Persistent(turns) => turns.last_mut(),
            Self::Ephemeral(slot) => slot.as_mut(),
        };
        if let Some(turn) = latest {
            turn.response = response.into();
        }
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        match self {
            Self::Persistent(turns) => turns.clone(),
            Self::Ephemeral(slot) => slot.iter().cloned().collect(),
        }
    }
}

/// One system message carrying the guideline, then a user/assistant pair per
/// turn. The in-flight turn contributes an empty assistant message, which
/// the chat API tolerates.
pub fn build_messages(guideline: &str, history: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    messages.push(Message::system(guideline));
    for turn in history {
        messages.push(Message::user(turn.prompt.clone()));
        messages.push(Message::assistant(turn.response.clone()));
    }
    messages
}

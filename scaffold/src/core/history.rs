//! Append-only conversation log with role-sequence invariants.
//!
//! Invariants (checked on every mutation):
//! - at most one `System` message, and only as the first message
//! - the first message is `System`, so every later message follows one
//! - no two consecutive `User` messages
//! - no two consecutive `Assistant` messages

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Which sequence rule a mutation would break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A `System` message somewhere other than position 0.
    SystemNotFirst,
    /// A non-`System` message with no `System` message before it.
    MissingSystem,
    ConsecutiveUser,
    ConsecutiveAssistant,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Violation::SystemNotFirst => {
                "cannot add a system message after other messages have been added"
            }
            Violation::MissingSystem => "cannot add a message before a system message",
            Violation::ConsecutiveUser => "cannot add two user messages in a row",
            Violation::ConsecutiveAssistant => "cannot add two assistant messages in a row",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("invalid message sequence at index {index}: {violation}")]
    InvalidSequence { index: usize, violation: Violation },
    #[error("message index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Check whether `role` may follow `previous` (`None` = empty history).
fn check_transition(previous: Option<Role>, role: Role) -> Result<(), Violation> {
    match (previous, role) {
        (None, Role::System) => Ok(()),
        (Some(_), Role::System) => Err(Violation::SystemNotFirst),
        (None, _) => Err(Violation::MissingSystem),
        (Some(Role::User), Role::User) => Err(Violation::ConsecutiveUser),
        (Some(Role::Assistant), Role::Assistant) => Err(Violation::ConsecutiveAssistant),
        _ => Ok(()),
    }
}

/// Validate a whole message sequence against the invariants.
pub fn validate_sequence(messages: &[Message]) -> Result<(), HistoryError> {
    let mut previous = None;
    for (index, message) in messages.iter().enumerate() {
        check_transition(previous, message.role)
            .map_err(|violation| HistoryError::InvalidSequence { index, violation })?;
        previous = Some(message.role);
    }
    Ok(())
}

/// Ordered, invariant-checked conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, rejecting any invariant violation.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<(), HistoryError> {
        let previous = self.messages.last().map(|message| message.role);
        check_transition(previous, role).map_err(|violation| HistoryError::InvalidSequence {
            index: self.messages.len(),
            violation,
        })?;
        self.messages.push(Message::new(role, content));
        Ok(())
    }

    /// Replace the message at `index`. The resulting sequence must still be valid;
    /// on error the history is unchanged.
    pub fn replace(&mut self, index: usize, message: Message) -> Result<(), HistoryError> {
        let len = self.messages.len();
        if index >= len {
            return Err(HistoryError::IndexOutOfBounds { index, len });
        }
        let previous = index.checked_sub(1).map(|i| self.messages[i].role);
        check_transition(previous, message.role)
            .map_err(|violation| HistoryError::InvalidSequence { index, violation })?;
        if let Some(next) = self.messages.get(index + 1) {
            check_transition(Some(message.role), next.role).map_err(|violation| {
                HistoryError::InvalidSequence {
                    index: index + 1,
                    violation,
                }
            })?;
        }
        self.messages[index] = message;
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Lossless, ordered JSON dump of `{role, content}` entries.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.messages)
    }

    /// Rebuild a history from a [`History::to_json`] dump, re-checking invariants.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let messages: Vec<Message> = serde_json::from_str(raw)?;
        Self::try_from(messages).map_err(anyhow::Error::from)
    }
}

impl TryFrom<Vec<Message>> for History {
    type Error = HistoryError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        validate_sequence(&messages)?;
        Ok(Self { messages })
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> History {
        let mut history = History::new();
        history.append(Role::System, "sys").expect("system");
        history.append(Role::User, "task").expect("user");
        history
    }

    #[test]
    fn first_message_must_be_system() {
        let mut history = History::new();
        let err = history.append(Role::User, "hi").unwrap_err();
        assert_eq!(
            err,
            HistoryError::InvalidSequence {
                index: 0,
                violation: Violation::MissingSystem
            }
        );
        let err = history.append(Role::Assistant, "hi").unwrap_err();
        assert!(err.to_string().contains("before a system message"));
        assert!(history.is_empty());
    }

    #[test]
    fn second_system_message_is_rejected() {
        let mut history = seeded();
        let err = history.append(Role::System, "again").unwrap_err();
        assert_eq!(
            err,
            HistoryError::InvalidSequence {
                index: 2,
                violation: Violation::SystemNotFirst
            }
        );
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn consecutive_roles_are_rejected() {
        let mut history = seeded();
        assert!(matches!(
            history.append(Role::User, "more"),
            Err(HistoryError::InvalidSequence {
                violation: Violation::ConsecutiveUser,
                ..
            })
        ));
        history.append(Role::Assistant, "reply").expect("assistant");
        assert!(matches!(
            history.append(Role::Assistant, "again"),
            Err(HistoryError::InvalidSequence {
                violation: Violation::ConsecutiveAssistant,
                ..
            })
        ));
    }

    #[test]
    fn system_may_be_followed_by_assistant() {
        let mut history = History::new();
        history.append(Role::System, "sys").expect("system");
        history.append(Role::Assistant, "hello").expect("assistant");
        history.append(Role::User, "hi").expect("user");
    }

    /// Exhaustively appends every role sequence up to length 5 and checks that
    /// whatever was accepted satisfies the invariants.
    #[test]
    fn accepted_sequences_always_satisfy_invariants() {
        let roles = [Role::System, Role::User, Role::Assistant];
        let total = roles.len().pow(5);
        for mut code in 0..total {
            let mut history = History::new();
            for _ in 0..5 {
                let role = roles[code % roles.len()];
                code /= roles.len();
                let _ = history.append(role, "x");
            }
            let messages = history.messages();
            assert!(validate_sequence(messages).is_ok());
            let systems = messages.iter().filter(|m| m.role == Role::System).count();
            assert!(systems <= 1);
            if let Some(first) = messages.first() {
                assert_eq!(first.role, Role::System);
            }
            for pair in messages.windows(2) {
                assert!(!(pair[0].role == Role::User && pair[1].role == Role::User));
                assert!(!(pair[0].role == Role::Assistant && pair[1].role == Role::Assistant));
            }
        }
    }

    #[test]
    fn iteration_is_ordered_and_restartable() {
        let mut history = seeded();
        history.append(Role::Assistant, "a1").expect("assistant");
        let first: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        let second: Vec<&str> = (&history).into_iter().map(|m| m.content.as_str()).collect();
        assert_eq!(first, vec!["sys", "task", "a1"]);
        assert_eq!(first, second);
    }

    #[test]
    fn replace_keeps_invariants() {
        let mut history = seeded();
        history.append(Role::Assistant, "a1").expect("assistant");

        history
            .replace(1, Message::new(Role::User, "edited"))
            .expect("same-role replace");
        assert_eq!(history.get(1).map(|m| m.content.as_str()), Some("edited"));

        let err = history
            .replace(2, Message::new(Role::User, "user twice"))
            .unwrap_err();
        assert!(matches!(
            err,
            HistoryError::InvalidSequence {
                index: 2,
                violation: Violation::ConsecutiveUser
            }
        ));
        let err = history
            .replace(1, Message::new(Role::Assistant, "assistant twice"))
            .unwrap_err();
        assert!(matches!(
            err,
            HistoryError::InvalidSequence {
                index: 2,
                violation: Violation::ConsecutiveAssistant
            }
        ));
        assert_eq!(
            history.replace(9, Message::new(Role::User, "x")),
            Err(HistoryError::IndexOutOfBounds { index: 9, len: 3 })
        );
        assert_eq!(history.get(2).map(|m| m.content.as_str()), Some("a1"));
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut history = seeded();
        history
            .append(Role::Assistant, "quotes \" and\nnewlines <bash>ls</bash>")
            .expect("assistant");
        history.append(Role::User, "ünïcødé ✓").expect("user");

        let raw = history.to_json().expect("serialize");
        let loaded = History::from_json(&raw).expect("parse");
        assert_eq!(loaded, history);
    }

    #[test]
    fn json_uses_lowercase_roles() {
        let raw = seeded().to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["role"], "user");
        assert_eq!(value[1]["content"], "task");
    }

    #[test]
    fn from_json_rejects_invalid_sequences() {
        let raw = r#"[{"role":"user","content":"no system"}]"#;
        let err = History::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("before a system message"));
    }
}

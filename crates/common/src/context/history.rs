//! History Windower - Bounded conversation context for the model
//!
//! The caller owns the conversation and re-submits it on every request;
//! only the first `window` turns are forwarded, flattened into
//! role-tagged messages.

use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Number of turns forwarded by default
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// One exchange; serialized as a two-element array `[question, answer]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn(pub String, pub String);

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self(question.into(), answer.into())
    }

    pub fn question(&self) -> &str {
        &self.0
    }

    pub fn answer(&self) -> &str {
        &self.1
    }
}

/// Roles under which questions and answers are replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRoles {
    pub question: Role,
    pub answer: Role,
}

impl HistoryRoles {
    /// Questions as user turns, answers as assistant turns
    pub const CONVERSATIONAL: Self = Self { question: Role::User, answer: Role::Assistant };

    /// Both sides replayed as assistant context
    pub const CONTEXT_ONLY: Self = Self { question: Role::Assistant, answer: Role::Assistant };
}

/// Converts caller-supplied history into model messages
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindower {
    window: usize,
    roles: HistoryRoles,
}

impl HistoryWindower {
    pub fn new(window: usize, roles: HistoryRoles) -> Self {
        Self { window, roles }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Flatten the first `window` turns, question before answer.
    ///
    /// Always returns `2 * min(history.len(), window)` messages.
    pub fn messages(&self, history: &[Turn]) -> Vec<ChatMessage> {
        history
            .iter()
            .take(self.window)
            .flat_map(|turn| {
                [
                    ChatMessage::new(self.roles.question, turn.question()),
                    ChatMessage::new(self.roles.answer, turn.answer()),
                ]
            })
            .collect()
    }
}

impl Default for HistoryWindower {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW, HistoryRoles::CONVERSATIONAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<Turn> {
        (0..n).map(|i| Turn::new(format!("q{}", i), format!("a{}", i))).collect()
    }

    #[test]
    fn test_turn_wire_format() {
        let turn: Turn = serde_json::from_str(r#"["질문", "답변"]"#).unwrap();
        assert_eq!(turn.question(), "질문");
        assert_eq!(turn.answer(), "답변");
        assert_eq!(serde_json::to_string(&turn).unwrap(), r#"["질문","답변"]"#);
    }

    #[test]
    fn test_empty_history() {
        assert!(HistoryWindower::default().messages(&[]).is_empty());
    }

    #[test]
    fn test_message_count_is_bounded() {
        let windower = HistoryWindower::default();
        for n in 0..9 {
            assert_eq!(windower.messages(&turns(n)).len(), 2 * n.min(5));
        }
    }

    #[test]
    fn test_keeps_first_turns_in_order() {
        let messages = HistoryWindower::default().messages(&turns(7));
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["q0", "a0", "q1", "a1", "q2", "a2", "q3", "a3", "q4", "a4"]
        );
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_context_only_roles() {
        let windower = HistoryWindower::new(5, HistoryRoles::CONTEXT_ONLY);
        let messages = windower.messages(&turns(2));
        assert!(messages.iter().all(|m| m.role == Role::Assistant));
    }

    #[test]
    fn test_input_not_mutated_and_deterministic() {
        let history = turns(3);
        let snapshot = history.clone();
        let windower = HistoryWindower::new(2, HistoryRoles::CONVERSATIONAL);
        let first = windower.messages(&history);
        let second = windower.messages(&history);
        assert_eq!(first, second);
        assert_eq!(history, snapshot);
        assert_eq!(first.len(), 4);
    }
}

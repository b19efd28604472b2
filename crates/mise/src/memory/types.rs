//! Memory document types
//!
//! `UserMemory` serializes with the camelCase field names of the stored
//! JSON document (`recentChatHistory`, `relevantInfo`).

use serde::{Deserialize, Serialize};

/// Default capacity of the recent chat history window
pub const DEFAULT_MAX_MESSAGES: usize = 5;

/// Snapshot of one user's memory document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMemory {
    /// Stable user identifier
    pub user_id: String,
    /// Most recent chat messages, oldest first
    #[serde(default)]
    pub recent_chat_history: Vec<String>,
    /// Facts and preferences accumulated about the user
    #[serde(default)]
    pub relevant_info: Vec<String>,
}

impl UserMemory {
    /// Create an empty memory document for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            recent_chat_history: Vec::new(),
            relevant_info: Vec::new(),
        }
    }

    /// Append a chat message, evicting from the front to stay within `max_messages`
    pub fn push_chat_message(&mut self, message: impl Into<String>, max_messages: usize) {
        self.recent_chat_history.push(message.into());
        if self.recent_chat_history.len() > max_messages {
            let excess = self.recent_chat_history.len() - max_messages;
            self.recent_chat_history.drain(..excess);
        }
    }

    /// Append facts in order; duplicates are kept
    pub fn extend_relevant_info<I, S>(&mut self, facts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_info
            .extend(facts.into_iter().map(Into::into));
    }

    /// Reset both sequences
    pub fn clear(&mut self) {
        self.recent_chat_history.clear();
        self.relevant_info.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let memory = UserMemory::new("alice");
        assert_eq!(memory.user_id, "alice");
        assert!(memory.recent_chat_history.is_empty());
        assert!(memory.relevant_info.is_empty());
    }

    #[test]
    fn test_history_keeps_most_recent_in_order() {
        let mut memory = UserMemory::new("alice");
        for n in 0..12usize {
            memory.push_chat_message(format!("msg {n}"), DEFAULT_MAX_MESSAGES);
            assert!(memory.recent_chat_history.len() <= DEFAULT_MAX_MESSAGES);

            let expected: Vec<String> = (0..=n)
                .skip((n + 1).saturating_sub(DEFAULT_MAX_MESSAGES))
                .map(|i| format!("msg {i}"))
                .collect();
            assert_eq!(memory.recent_chat_history, expected);
        }
    }

    #[test]
    fn test_history_shrinks_to_lower_cap() {
        let mut memory = UserMemory::new("alice");
        for n in 0..5 {
            memory.push_chat_message(format!("msg {n}"), 5);
        }
        memory.push_chat_message("msg 5", 2);
        assert_eq!(memory.recent_chat_history, vec!["msg 4", "msg 5"]);
    }

    #[test]
    fn test_relevant_info_not_deduplicated() {
        let mut memory = UserMemory::new("alice");
        memory.extend_relevant_info(["dislikes mushrooms"]);
        memory.extend_relevant_info(["dislikes mushrooms", "likes basil"]);
        assert_eq!(
            memory.relevant_info,
            vec!["dislikes mushrooms", "dislikes mushrooms", "likes basil"]
        );
    }

    #[test]
    fn test_document_field_names() {
        let mut memory = UserMemory::new("alice");
        memory.push_chat_message("hi", 5);
        memory.extend_relevant_info(["likes vegetarian food"]);

        let json = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["recentChatHistory"][0], "hi");
        assert_eq!(json["relevantInfo"][0], "likes vegetarian food");
    }

    #[test]
    fn test_clear() {
        let mut memory = UserMemory::new("alice");
        memory.push_chat_message("hi", 5);
        memory.extend_relevant_info(["likes basil"]);
        memory.clear();
        assert_eq!(memory, UserMemory::new("alice"));
    }
}

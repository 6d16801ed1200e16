//! Prompt context for the next speaker.
//!
//! Each agent sees the conversation from its own side: its earlier turns are
//! `assistant` messages, everyone else's are `user` messages labelled with
//! the speaker's name.

use crate::agent::AgentId;
use crate::providers::Message;
use crate::transcript::Turn;

/// Number of recent turns included in each prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Conversation rules given to every agent. `{theme}` is substituted.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are in a conversation with other AIs.
Current topic: {theme}

Conversation rules:
1. Keep the conversation natural and interesting.
2. React to what the other AIs said.
3. Bring in new perspectives or questions.
4. Answer concisely, in under 500 characters.
5. Let your own personality show.
6. Do not prefix your reply with any AI's name; respond directly."#;

/// Builds [`PromptContext`]s from the transcript.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    history_window: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// # Example
    /// ```
    /// use roundtable::conversation::ContextBuilder;
    ///
    /// let builder = ContextBuilder::new();
    /// let ctx = builder.build("Is tea better than coffee?", &[]);
    /// assert!(ctx.system_prompt().contains("Is tea better than coffee?"));
    /// ```
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Replace the system prompt template. `{theme}` is substituted.
    pub fn with_system_prompt(mut self, template: &str) -> Self {
        self.system_prompt = template.to_string();
        self
    }

    /// How many recent turns to include. Zero sends only the theme.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Borrow the tail of `turns` for the next prompt.
    pub fn build<'a>(&self, theme: &'a str, turns: &'a [Turn]) -> PromptContext<'a> {
        let start = turns.len().saturating_sub(self.history_window);
        PromptContext {
            system_prompt: self.system_prompt.replace("{theme}", theme),
            theme,
            history: &turns[start..],
        }
    }
}

/// Read-only view of what the next speaker gets to see.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    system_prompt: String,
    theme: &'a str,
    history: &'a [Turn],
}

impl<'a> PromptContext<'a> {
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn theme(&self) -> &str {
        self.theme
    }

    pub fn history(&self) -> &'a [Turn] {
        self.history
    }

    /// Chat messages from `speaker`'s point of view.
    pub fn messages_for(&self, speaker: &AgentId) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.push(Message::user(&format!("Conversation topic: {}", self.theme)));
        for turn in self.history {
            if &turn.speaker == speaker {
                messages.push(Message::assistant(&turn.text));
            } else {
                messages.push(Message::user(&format!("{}: {}", turn.speaker, turn.text)));
            }
        }
        messages
    }
}

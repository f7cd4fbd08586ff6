//! The chat boundaries: reading user input and delivering replies

use async_trait::async_trait;

use super::Node;
use crate::{
    context::ExecutionContext,
    error::Result,
    state::{ChatMessage, ConversationState, Role, StateUpdate},
};

/// Waits for the next user message; the end of input or a blank message terminates the chat
pub struct ReadMessageNode;

#[async_trait]
impl Node for ReadMessageNode {
    fn name(&self) -> &str {
        "read_message"
    }

    async fn run(&self, _state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        match ctx.chat.next_message().await.filter(|t| !t.trim().is_empty()) {
            Some(text) => Ok(StateUpdate::new()
                .message(ChatMessage::user(text))
                .need_user_input(false)),
            None => {
                tracing::debug!("chat input closed");
                Ok(StateUpdate::new()
                    .terminate_chat(true)
                    .need_user_input(false))
            }
        }
    }
}

/// Delivers every assistant message after the last delivered one
pub struct ChatOutputNode;

#[async_trait]
impl Node for ChatOutputNode {
    fn name(&self) -> &str {
        "chat_output"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        let start = state.last_printed_idx.map_or(0, |idx| idx + 1);
        for message in state.messages.iter().skip(start) {
            if message.role == Role::Assistant {
                ctx.chat.deliver(&message.content).await;
            }
        }

        let mut update = StateUpdate::new().has_pending_messages(false);
        if let Some(last) = state.messages.len().checked_sub(1) {
            update = update.last_printed_idx(last);
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ListChat;
    use crate::testing::{ScriptedSubAgent, context, store};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_output_delivers_only_new_assistant_messages() {
        let chat = Arc::new(ListChat::default());
        let ctx = context(store(), ScriptedSubAgent::new(), chat.clone(), vec![]);
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.messages = vec![
            ChatMessage::assistant("Welcome"),
            ChatMessage::user("hi"),
            ChatMessage::system("internal note"),
            ChatMessage::assistant("How can I help?"),
        ];
        state.has_pending_messages = true;

        state.apply(ChatOutputNode.run(&state, &ctx).await.unwrap());
        state.messages.push(ChatMessage::assistant("Anything else?"));
        state.apply(ChatOutputNode.run(&state, &ctx).await.unwrap());

        assert_eq!(chat.delivered(), vec!["Welcome", "How can I help?", "Anything else?"]);
        assert_eq!(state.last_printed_idx, Some(4));
        assert!(!state.has_pending_messages);
    }

    #[tokio::test]
    async fn test_read_message_and_end_of_input() {
        let chat = Arc::new(ListChat::new(["hello"]));
        let ctx = context(store(), ScriptedSubAgent::new(), chat, vec![]);
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.need_user_input = true;

        state.apply(ReadMessageNode.run(&state, &ctx).await.unwrap());
        assert_eq!(state.messages[0].content, "hello");
        assert!(!state.need_user_input);
        assert!(!state.terminate_chat);

        state.apply(ReadMessageNode.run(&state, &ctx).await.unwrap());
        assert!(state.terminate_chat);
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_ends_the_chat() {
        let chat = Arc::new(ListChat::new(["   "]));
        let ctx = context(store(), ScriptedSubAgent::new(), chat, vec![]);
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.need_user_input = true;

        state.apply(ReadMessageNode.run(&state, &ctx).await.unwrap());

        assert!(state.terminate_chat);
        assert!(!state.need_user_input);
        assert!(state.messages.is_empty());
    }
}

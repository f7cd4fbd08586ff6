//! Distills reusable answers into the knowledge base

use async_trait::async_trait;
use serde::Deserialize;
use udahub_agent::{ResponseSchema, SubAgentRequest, run_typed};
use udahub_ai::Message;

use super::Node;
use crate::{
    context::{ExecutionContext, KNOWLEDGE_AUTHOR},
    error::Result,
    prompts,
    state::{ConversationState, StateUpdate, transcript},
};

#[derive(Debug, Deserialize)]
struct Learned {
    new_knowledge: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: String,
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub struct LearningNode;

#[async_trait]
impl Node for LearningNode {
    fn name(&self) -> &str {
        "learning"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        if state.messages.is_empty() {
            return Ok(StateUpdate::new());
        }
        let tools = ctx
            .tools
            .by_author(KNOWLEDGE_AUTHOR)
            .by_tags(&["knowledge"])
            .by_read_only(true);

        let request = SubAgentRequest::new(
            "learning",
            prompts::LEARNING_SYSTEM,
            ResponseSchema::new("knowledge_entry", prompts::learning_schema())?,
            ctx.config.step_limits.learning,
        )
        .with_tools(tools.get_all())
        .with_messages(vec![Message::user(transcript(&state.messages))]);

        let learned: Learned = match run_typed(ctx.sub_agent.as_ref(), request).await {
            Ok(learned) => learned,
            Err(e) => {
                tracing::warn!("Knowledge extraction failed: {}", e);
                return Ok(StateUpdate::new());
            }
        };
        if !learned.new_knowledge || learned.title.trim().is_empty() {
            return Ok(StateUpdate::new());
        }

        match ctx
            .knowledge
            .create_entry(
                &state.user.account_id,
                learned.title.trim(),
                learned.content.trim(),
                split_tags(&learned.tags),
            )
            .await
        {
            Ok(entry) => tracing::info!(article_id = %entry.article_id, title = %entry.title, "knowledge learned"),
            Err(e) => tracing::warn!("Failed to store learned knowledge: {}", e),
        }
        Ok(StateUpdate::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ListChat;
    use crate::state::ChatMessage;
    use crate::testing::{ScriptedSubAgent, context, store};
    use std::sync::Arc;

    fn conversation() -> ConversationState {
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.messages = vec![
            ChatMessage::user("How do I reset my password?"),
            ChatMessage::assistant("Use the 'forgot password' link on the login page."),
        ];
        state
    }

    #[tokio::test]
    async fn test_new_knowledge_is_stored() {
        let store = store();
        let agent = ScriptedSubAgent::new();
        agent.answer(
            "learning",
            serde_json::json!({
                "new_knowledge": true,
                "title": "How to reset password?",
                "content": "Use the 'forgot password' link on the login page.",
                "tags": "Account, password , "
            }),
        );
        let ctx = context(store.clone(), agent, Arc::new(ListChat::default()), vec![]);

        let update = LearningNode.run(&conversation(), &ctx).await.unwrap();

        assert!(update.is_empty());
        let knowledge = store.knowledge();
        assert_eq!(knowledge.len(), 1);
        assert_eq!(knowledge[0].tags, vec!["account", "password"]);
        assert_eq!(knowledge[0].account_id, "cultpass");
    }

    #[tokio::test]
    async fn test_nothing_new_stores_nothing() {
        let store = store();
        let agent = ScriptedSubAgent::new();
        agent.answer(
            "learning",
            serde_json::json!({"new_knowledge": false, "title": "", "content": "", "tags": ""}),
        );
        let ctx = context(store.clone(), agent, Arc::new(ListChat::default()), vec![]);

        LearningNode.run(&conversation(), &ctx).await.unwrap();

        assert!(store.knowledge().is_empty());
    }
}

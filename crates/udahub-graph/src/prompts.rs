//! Prompts, response schemas and user-facing notices

use serde_json::json;
use udahub_agent::BoxedTool;

use crate::state::UserContext;

pub const INVALID_ACCOUNT: &str = "The provided account ID is invalid.";
pub const HANDOFF: &str = "I am forwarding you to a human agent...";
pub const WORKER_APOLOGY: &str =
    "I am sorry, I could not process your request right now. Let me get someone to help you.";
pub const INTERNAL_ERROR: &str = "An internal error occurred.";
pub const NOT_STORED: &str =
    "I could not save this conversation. Please reopen it later so it can be recorded.";

pub fn validation_failed(contact: &str) -> String {
    format!(
        "I was unable to validate your identity. If this issue persists please reach out to '{}'.",
        contact
    )
}

pub fn welcome(full_name: &str, account_name: &str) -> String {
    format!(
        "Welcome {}!\nI am UDA-Hub and I will be helping you on behalf of {}.",
        full_name, account_name
    )
}

pub fn first_contact(udahub_user_id: &str) -> String {
    format!(
        "It seems like I am serving you the first time. I created a new UDA Hub user for you to keep context.\nYour user ID with me is {}",
        udahub_user_id
    )
}

pub fn welcome_back(full_name: Option<&str>, ticket_id: &str) -> String {
    match full_name {
        Some(name) => format!("Welcome back {}! We are continuing ticket {}.", name, ticket_id),
        None => format!("Welcome back! We are continuing ticket {}.", ticket_id),
    }
}

pub fn ticket_not_found(ticket_id: &str) -> String {
    format!(
        "I could not find a ticket with the ID {}. Let's start a new conversation.",
        ticket_id
    )
}

pub fn history_unavailable(ticket_id: &str) -> String {
    format!(
        "I could not load the history of ticket {} right now. We can still continue it here.",
        ticket_id
    )
}

pub fn continuation_notice(ticket_id: &str) -> String {
    format!(
        "You can continue this conversation anytime by providing the ticket ID: {}",
        ticket_id
    )
}

pub fn confirm_action(summary: &str) -> String {
    format!("Please confirm: {}. Shall I go ahead? (yes/no)", summary)
}

pub fn validation_system(account_id: &str, external_user_id: &str) -> String {
    format!(
        "You are a validation agent for UDA Hub. You need to validate a user for the customer with the account_id='{account_id}'.\n\
         It has already been checked that {account_id} is a legit customer of UDA Hub.\n\
         You have tools for accessing both UDA Hub's system and the system of the customer.\n\n\
         The external user with user_id='{external_user_id}' needs to be validated using the following steps:\n\
         1. Check with the customer whether the user exists. If you cannot find the user in the customer's system it is an invalid user and you stop here.\n\
         2. If you find the user, check with UDA Hub whether there is a matching user. If you find one stop here.\n\
         3. If not, create a new UDA Hub user with the details you got from the customer.\n\n\
         Rules:\n\
         - Call every tool at most once.\n\
         - Do not try to create a new UDA Hub user if you already found one.\n\
         - If creating the user reports that it already exists, look it up instead."
    )
}

pub fn validation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": { "type": "string" },
            "external_user_id": { "type": "string" },
            "udahub_user_id": { "type": ["string", "null"] },
            "full_name": { "type": ["string", "null"] },
            "udahub_user_created": { "type": "boolean" },
            "validation_successful": { "type": "boolean" },
            "error_message": { "type": ["string", "null"] }
        },
        "required": ["account_id", "external_user_id", "udahub_user_created", "validation_successful"]
    })
}

pub fn supervisor_system(workers: &str) -> String {
    format!(
        "You are a supervisor agent inside a helpdesk chatbot.\n\
         Analyze the user's request and forward it to the most suitable worker agent, which will take over.\n\
         These are the available worker agents:\n{workers}\n\n\
         Additionally determine the priority of the request:\n\
         - critical: anything related to fraud or preventing harm to the user.\n\
         - high: the user is angry.\n\
         - normal: the default priority.\n\n\
         Rules:\n\
         - If the priority is critical always assign \"escalate_to_human\".\n\
         - If you cannot find a suitable worker assign \"escalate_to_human\"."
    )
}

pub fn supervisor_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "worker": { "type": "string", "description": "Name of the worker agent that should handle the request." },
            "priority": { "type": "string", "enum": ["normal", "high", "critical"] }
        },
        "required": ["worker", "priority"]
    })
}

fn describe_user(user: &UserContext) -> String {
    format!(
        "Customer account: {} ({})\n{}\
         User: {} (customer user_id='{}', UDA Hub user_id='{}')",
        user.account_name.as_deref().unwrap_or(&user.account_id),
        user.account_id,
        user.account_description
            .as_deref()
            .map(|d| format!("About the customer: {}\n", d))
            .unwrap_or_default(),
        user.full_name.as_deref().unwrap_or("unknown"),
        user.external_user_id,
        user.udahub_user_id.as_deref().unwrap_or("unknown"),
    )
}

fn describe_actions(actions: &[BoxedTool]) -> String {
    if actions.is_empty() {
        return "You cannot propose any actions. Always set proposed_action to null.".to_string();
    }
    let list = actions
        .iter()
        .map(|t| {
            format!(
                "- {}: {}\n  arguments schema: {}",
                t.name(),
                t.description(),
                t.parameters_schema()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Actions you may propose (they are executed only after the user confirms):\n{}\n\
         Propose an action only once every required argument is known. \
         If information is missing, ask the user for it instead and set proposed_action to null.",
        list
    )
}

pub fn worker_system(instructions: &str, user: &UserContext, actions: &[BoxedTool]) -> String {
    format!(
        "{instructions}\n\n{user}\n\n{actions}\n\n\
         Answer format:\n\
         - ai_response: your message to the user.\n\
         - user_follow_up_needed: true if you need a reply from the user.\n\
         - request_handoff: true if a human agent should take over.\n\
         - task_complete: true if the user's request is fully resolved.\n\
         - proposed_action: an action to execute after confirmation, or null.",
        user = describe_user(user),
        actions = describe_actions(actions),
    )
}

pub fn worker_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "ai_response": { "type": "string" },
            "user_follow_up_needed": { "type": "boolean" },
            "request_handoff": { "type": "boolean" },
            "task_complete": { "type": "boolean" },
            "proposed_action": {
                "type": ["object", "null"],
                "properties": {
                    "tool": { "type": "string" },
                    "arguments": { "type": "object" },
                    "summary": { "type": "string" }
                },
                "required": ["tool", "arguments", "summary"]
            }
        },
        "required": ["ai_response", "user_follow_up_needed", "request_handoff", "task_complete"]
    })
}

pub const FAQ_INSTRUCTIONS: &str = "You are the FAQ agent of a customer support desk. \
Answer general questions about the customer's service using the knowledge base tools. \
Only answer with information you found; if the knowledge base has no answer, say so and offer a handoff.";

pub const SUBSCRIPTION_INSTRUCTIONS: &str = "You are the subscription agent of a customer support desk. \
Help the user understand the status, tier and quota of their subscription and help them cancel, \
reactivate or upgrade it. Look up the user's subscription before answering.";

pub const RESERVATION_INSTRUCTIONS: &str = "You are the reservation agent of a customer support desk. \
Help the user list, make and cancel reservations for experiences. \
To make a reservation you need the experience, the date, the time and the party size; \
ask for whatever is missing before proposing the reservation.";

pub const BROWSING_INSTRUCTIONS: &str = "You are the browsing agent of a customer support desk. \
Help the user discover experiences: search the catalog, describe experiences and check availability. \
Hand over to the reservation agent by completing your task once the user wants to book.";

pub fn confirmation_system(summary: &str) -> String {
    format!(
        "You check whether the user agreed to a proposed action.\n\
         The proposed action was: {}\n\
         Read the user's latest message and decide whether it is an explicit confirmation. \
         Anything else, including questions and changes to the request, is not a confirmation.",
        summary
    )
}

pub fn confirmation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "confirmed": { "type": "boolean" } },
        "required": ["confirmed"]
    })
}

pub fn action_executed(tool: &str, result: &str) -> String {
    format!("The confirmed action '{}' was executed. Result: {}", tool, result)
}

pub fn action_failed(tool: &str, error: &str) -> String {
    format!("The confirmed action '{}' failed: {}", tool, error)
}

pub fn action_declined(summary: &str) -> String {
    format!("The user did not confirm the proposed action ({}). Nothing was executed.", summary)
}

pub fn action_rejected(tool: &str, reason: &str) -> String {
    format!("The proposed action '{}' was not recorded: {}", tool, reason)
}

pub const SUMMARY_SYSTEM: &str = "You are a helpful assistant for summarizing conversations between customers and support agents.\n\
You get the full conversation as input and create a short summary that captures its main topic.\n\
The summary must be suitable as the topic of a ticket in a ticketing system: short and to the point, \
at most 150 characters, without irrelevant details.\n\
Additionally pick up to five relevant tags that describe the topic of the conversation.";

pub fn summary_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string", "maxLength": 150 },
            "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 5 }
        },
        "required": ["summary", "tags"]
    })
}

pub const LEARNING_SYSTEM: &str = "You extract knowledge from conversations between customers and support agents.\n\
Decide whether the conversation contains new knowledge worth adding to the knowledge base.\n\n\
Plan:\n\
1. Identify general questions that the support agent answered.\n\
2. Reflect whether the answer is relevant for future customers or too specific to this conversation.\n\
3. Check the knowledge base with your tools; if it already contains the knowledge, there is nothing new.\n\
4. Otherwise write a title in form of a question (e.g. 'How to reset password?'), the answer as content and comma-separated tags.\n\n\
Rules:\n\
- The title has at most 10 words and the content at most 100 words.\n\
- Do not create entries about products of the customer company; they change too often.\n\
- Do not add redundant or low-quality entries.";

pub fn learning_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "new_knowledge": { "type": "boolean" },
            "title": { "type": "string" },
            "content": { "type": "string" },
            "tags": { "type": "string" }
        },
        "required": ["new_knowledge", "title", "content", "tags"]
    })
}

//! End-to-end runs of the conversation graph with scripted sub-agents

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use udahub_agent::{
    BoxedTool, SubAgent, SubAgentRequest, Tool, ToolAnnotations, ToolFilter, ToolMetadata,
    ToolResult,
};
use udahub_graph::{
    Account, Checkpoint, Checkpointer, ConversationState, Error, ExecutionContext, GraphConfig,
    GraphEvent, InMemoryStore, ListChat, MemoryCheckpointer, NodeId, Route, TaskStatus,
    TicketStatus, TicketStore, UdaHub, UserContext, WorkerKind, prompts,
};

#[derive(Default)]
struct ScriptedSubAgent {
    replies: Mutex<HashMap<String, VecDeque<Option<Value>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSubAgent {
    fn answer(&self, name: &str, value: Value) {
        self.replies
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(Some(value));
    }

    fn fail(&self, name: &str) {
        self.replies
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(None);
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|n| *n == name).count()
    }
}

#[async_trait]
impl SubAgent for ScriptedSubAgent {
    async fn run(&self, request: SubAgentRequest) -> udahub_agent::Result<Value> {
        self.calls.lock().push(request.name.clone());
        let reply = self
            .replies
            .lock()
            .get_mut(&request.name)
            .and_then(|q| q.pop_front());
        match reply {
            Some(Some(value)) => {
                request.response_schema.validate(&value)?;
                Ok(value)
            }
            Some(None) => Err(udahub_agent::Error::StepLimitExceeded {
                limit: request.step_limit,
            }),
            None => Err(udahub_agent::Error::Other(format!(
                "unexpected sub-agent run '{}'",
                request.name
            ))),
        }
    }
}

struct RecordingTool {
    name: &'static str,
    metadata: ToolMetadata,
    schema: Value,
    calls: Mutex<Vec<Value>>,
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "records its calls"
    }
    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }
    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }
    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        self.calls.lock().push(arguments);
        ToolResult::json(&json!({"reservation_id": "r-1", "status": "reserved"}))
    }
}

struct Harness {
    hub: UdaHub,
    store: Arc<InMemoryStore>,
    agent: Arc<ScriptedSubAgent>,
    chat: Arc<ListChat>,
    checkpointer: Arc<MemoryCheckpointer>,
    booking: Arc<RecordingTool>,
}

impl Harness {
    fn new(messages: &[&str]) -> Self {
        Self::with_config(messages, GraphConfig::default())
    }

    fn with_config(messages: &[&str], config: GraphConfig) -> Self {
        let store = Arc::new(InMemoryStore::new().with_account(Account {
            account_id: "cultpass".into(),
            account_name: "CultPass".into(),
            account_description: None,
        }));
        let agent = Arc::new(ScriptedSubAgent::default());
        let chat = Arc::new(ListChat::new(messages.iter().copied()));
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let booking = Arc::new(RecordingTool {
            name: "make_cultpass_reservation",
            metadata: ToolMetadata::new(
                "cultpass",
                &["cultpass", "reservation"],
                ToolAnnotations::mutating(false, false),
            ),
            schema: json!({
                "type": "object",
                "properties": {
                    "experience_id": {"type": "string"},
                    "date": {"type": "string"},
                    "time": {"type": "string"},
                    "party_size": {"type": "integer"}
                },
                "required": ["experience_id", "date", "time", "party_size"]
            }),
            calls: Mutex::new(Vec::new()),
        });
        let tools: Vec<BoxedTool> = vec![booking.clone()];
        let ctx = ExecutionContext::builder()
            .accounts(store.clone())
            .tickets(store.clone())
            .knowledge(store.clone())
            .sub_agent(agent.clone())
            .chat(chat.clone())
            .tools(ToolFilter::new(tools))
            .config(config)
            .build()
            .unwrap();
        let hub = UdaHub::new(ctx, checkpointer.clone());
        Self {
            hub,
            store,
            agent,
            chat,
            checkpointer,
            booking,
        }
    }

    fn validates(&self, created: bool) {
        self.agent.answer(
            "validation",
            json!({
                "account_id": "cultpass",
                "external_user_id": "f556c0",
                "udahub_user_id": "u-1",
                "full_name": "Alice Kim",
                "udahub_user_created": created,
                "validation_successful": true,
                "error_message": null
            }),
        );
    }

    fn routes_to(&self, worker: &str) {
        self.agent
            .answer("supervisor", json!({"worker": worker, "priority": "normal"}));
    }

    fn worker_says(&self, worker: &str, text: &str, follow_up: bool, complete: bool, action: Value) {
        self.agent.answer(
            worker,
            json!({
                "ai_response": text,
                "user_follow_up_needed": follow_up,
                "request_handoff": false,
                "task_complete": complete,
                "proposed_action": action
            }),
        );
    }

    fn summarizes(&self, summary: &str) {
        self.agent
            .answer("summary", json!({"summary": summary, "tags": ["support"]}));
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<GraphEvent>) -> Vec<GraphEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn started(events: &[GraphEvent]) -> Vec<NodeId> {
    events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::NodeStarted { node, .. } => Some(*node),
            _ => None,
        })
        .collect()
}

fn routes(events: &[GraphEvent]) -> Vec<Route> {
    events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::Routed { route, .. } => Some(*route),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_faq_conversation_end_to_end() {
    let h = Harness::new(&["What is CultPass?"]);
    h.validates(true);
    h.routes_to("faq");
    h.worker_says("faq", "CultPass gives you access to cultural experiences.", false, true, json!(null));
    h.summarizes("Question about what CultPass is");
    let mut rx = h.hub.context().subscribe();

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, Some("t-1")).await.unwrap();

    let delivered = h.chat.delivered();
    assert_eq!(delivered.len(), 4);
    assert!(delivered[0].starts_with("Welcome Alice Kim!"));
    assert!(delivered[1].contains("first time"));
    assert_eq!(delivered[2], "CultPass gives you access to cultural experiences.");
    let ticket_id = outcome.ticket_id.clone().unwrap();
    assert!(delivered[3].contains(&ticket_id));

    assert_eq!(outcome.state.task.status, TaskStatus::Completed);
    let tickets = h.store.tickets();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].status, TicketStatus::Resolved);
    assert_eq!(tickets[0].summary, "Question about what CultPass is");

    let events = drain(&mut rx);
    let nodes = started(&events);
    assert_eq!(&nodes[..3], &[NodeId::Validation, NodeId::Enrichment, NodeId::Supervisor]);
    assert_eq!(nodes.last(), Some(&NodeId::ChatOutput));
    assert!(events.iter().any(|e| matches!(e, GraphEvent::TicketStored { .. })));
    assert!(matches!(events.last(), Some(GraphEvent::ThreadFinished { .. })));

    let saved = h.checkpointer.get("t-1").await.unwrap().unwrap();
    assert_eq!(saved.next, NodeId::End);
}

#[tokio::test]
async fn test_greetings_are_delivered_before_the_first_classification() {
    let h = Harness::new(&[]);
    h.validates(true);
    h.summarizes("Greeting without a request");
    let mut rx = h.hub.context().subscribe();

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    let nodes = started(&drain(&mut rx));
    assert_eq!(
        &nodes[..4],
        &[NodeId::Validation, NodeId::Enrichment, NodeId::Supervisor, NodeId::ChatOutput]
    );
    // Input ended right away, so nothing was ever classified
    assert_eq!(h.agent.calls("supervisor"), 0);
    let delivered = h.chat.delivered();
    assert!(delivered[0].starts_with("Welcome"));
    assert!(delivered[1].contains("u-1"));
    assert!(outcome.state.is_memorized);
}

#[tokio::test]
async fn test_unknown_account_ends_with_one_message() {
    let h = Harness::new(&["hello"]);

    let outcome = h.hub.start_chat("nope", "f556c0", None, None).await.unwrap();

    assert_eq!(h.chat.delivered(), vec![prompts::INVALID_ACCOUNT.to_string()]);
    assert_eq!(outcome.state.task.status, TaskStatus::Failed);
    assert!(outcome.state.terminate_chat);
    assert_eq!(h.chat.consumed(), 0);
    assert_eq!(h.agent.calls("validation"), 0);
}

#[tokio::test]
async fn test_follow_up_returns_to_input_boundary() {
    let h = Harness::new(&["Can I bring a friend?", "To the jazz night"]);
    h.validates(false);
    h.routes_to("faq");
    h.worker_says("faq", "Which experience do you mean?", true, false, json!(null));
    h.routes_to("faq");
    h.worker_says("faq", "Yes, up to two guests.", false, true, json!(null));
    h.summarizes("Guests at the jazz night");
    let mut rx = h.hub.context().subscribe();

    h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    let routes = routes(&drain(&mut rx));
    let after_worker = routes
        .iter()
        .position(|r| *r == Route::ToWorker(WorkerKind::Faq))
        .unwrap();
    assert_eq!(
        &routes[after_worker + 1..after_worker + 3],
        &[Route::ToOutputBoundary, Route::ToInputBoundary]
    );
    assert_eq!(h.chat.consumed(), 2);
}

#[tokio::test]
async fn test_reply_without_flags_waits_for_the_user() {
    let h = Harness::new(&["What is CultPass?", "   "]);
    h.validates(false);
    h.routes_to("faq");
    h.worker_says("faq", "CultPass is a culture subscription.", false, false, json!(null));
    h.summarizes("Question about CultPass");
    let mut rx = h.hub.context().subscribe();

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    assert_eq!(h.agent.calls("supervisor"), 1);
    assert_eq!(h.agent.calls("faq"), 1);
    let routes = routes(&drain(&mut rx));
    let after_worker = routes
        .iter()
        .position(|r| *r == Route::ToWorker(WorkerKind::Faq))
        .unwrap();
    assert_eq!(
        &routes[after_worker + 1..after_worker + 3],
        &[Route::ToOutputBoundary, Route::ToInputBoundary]
    );
    // The blank line ended the chat without being recorded
    assert!(outcome.state.terminate_chat);
    assert!(outcome.state.is_memorized);
    assert!(outcome.state.messages.iter().all(|m| !m.content.trim().is_empty()));
}

#[tokio::test]
async fn test_critical_request_is_escalated() {
    let h = Harness::new(&["Someone is using my account to book events"]);
    h.validates(false);
    h.agent
        .answer("supervisor", json!({"worker": "subscription", "priority": "critical"}));
    h.summarizes("Suspected account fraud");

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    assert!(outcome.state.escalated);
    assert_eq!(h.agent.calls("subscription"), 0);
    assert!(h.chat.delivered().iter().any(|m| m == prompts::HANDOFF));
    assert_eq!(h.store.tickets()[0].status, TicketStatus::Escalated);
}

#[tokio::test]
async fn test_classification_failure_falls_back_to_escalation() {
    let h = Harness::new(&["???"]);
    h.validates(false);
    h.agent.fail("supervisor");
    h.summarizes("Unclear request");

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    assert_eq!(outcome.state.worker, Some(WorkerKind::EscalateToHuman));
    assert!(outcome.state.escalated);
}

#[tokio::test]
async fn test_reservation_is_booked_after_confirmation() {
    let h = Harness::new(&["Book the jazz night", "Saturday 8pm for two", "yes"]);
    h.validates(false);
    h.routes_to("reservation");
    h.worker_says(
        "reservation",
        "Which date, time and party size?",
        true,
        false,
        json!({"tool": "make_cultpass_reservation", "arguments": {"experience_id": "jazz"}, "summary": "Book jazz"}),
    );
    h.routes_to("reservation");
    h.worker_says(
        "reservation",
        "",
        false,
        false,
        json!({
            "tool": "make_cultpass_reservation",
            "arguments": {"experience_id": "jazz", "date": "2025-09-06", "time": "20:00", "party_size": 2},
            "summary": "Book jazz on 2025-09-06 at 20:00 for 2"
        }),
    );
    h.agent.answer("confirmation", json!({"confirmed": true}));
    h.worker_says("reservation", "You are booked!", false, true, json!(null));
    h.summarizes("Jazz night reservation");

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    let calls = h.booking.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["party_size"], 2);
    assert!(outcome.state.pending_action.is_none());
    // The confirmation went straight back to the worker without classification
    assert_eq!(h.agent.calls("supervisor"), 2);
    assert!(h.chat.delivered().iter().any(|m| m.contains("Please confirm: Book jazz")));
    assert_eq!(outcome.state.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_declined_reservation_is_not_booked() {
    let h = Harness::new(&["Book jazz on 2025-09-06 at 20:00 for 2", "no, wait"]);
    h.validates(false);
    h.routes_to("reservation");
    h.worker_says(
        "reservation",
        "",
        false,
        false,
        json!({
            "tool": "make_cultpass_reservation",
            "arguments": {"experience_id": "jazz", "date": "2025-09-06", "time": "20:00", "party_size": 2},
            "summary": "Book jazz"
        }),
    );
    h.agent.answer("confirmation", json!({"confirmed": false}));
    h.worker_says("reservation", "No problem, nothing was booked.", false, true, json!(null));
    h.summarizes("Cancelled reservation request");

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();

    assert!(h.booking.calls.lock().is_empty());
    assert!(outcome.state.pending_action.is_none());
    assert!(outcome.state.messages.iter().any(|m| m.content.contains("did not confirm")));
}

#[tokio::test]
async fn test_resume_from_read_message_cursor() {
    let h = Harness::new(&["What are your opening hours?"]);
    h.routes_to("faq");
    h.worker_says("faq", "We are open daily from 9 to 18.", false, true, json!(null));
    h.summarizes("Opening hours");
    let mut state = ConversationState::new("cultpass", "f556c0");
    state.user = UserContext {
        account_id: "cultpass".into(),
        external_user_id: "f556c0".into(),
        udahub_user_id: Some("u-1".into()),
        ..Default::default()
    };
    state.is_validated = true;
    state.is_enriched = true;
    state.need_user_input = true;
    h.checkpointer
        .put(Checkpoint::new("t-9", state, NodeId::ReadMessage))
        .await
        .unwrap();
    let mut rx = h.hub.context().subscribe();

    let outcome = h.hub.start_chat("cultpass", "f556c0", None, Some("t-9")).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(GraphEvent::ThreadStarted { node: NodeId::ReadMessage, .. })
    ));
    assert_eq!(h.agent.calls("validation"), 0);
    assert_eq!(outcome.state.messages[0].content, "What are your opening hours?");
    assert!(outcome.ticket_id.is_some());
}

#[tokio::test]
async fn test_ticket_continuation_appends_to_the_same_ticket() {
    let h = Harness::new(&["Is the museum open on Mondays?", "And on Sundays?"]);
    h.validates(false);
    h.routes_to("faq");
    h.worker_says("faq", "No, it is closed on Mondays.", false, true, json!(null));
    h.summarizes("Museum opening days");

    let first = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap();
    let ticket_id = first.ticket_id.unwrap();
    let stored = h.store.get_messages(&ticket_id).await.unwrap().len();

    h.validates(false);
    h.routes_to("faq");
    h.worker_says("faq", "Yes, it is open on Sundays.", false, true, json!(null));
    let second = h
        .hub
        .start_chat("cultpass", "f556c0", Some(&ticket_id), None)
        .await
        .unwrap();

    assert_eq!(second.ticket_id.as_deref(), Some(ticket_id.as_str()));
    assert_eq!(h.store.tickets().len(), 1);
    assert_eq!(h.agent.calls("summary"), 1);
    let messages = h.store.get_messages(&ticket_id).await.unwrap();
    assert!(messages.len() > stored);
    assert_eq!(messages[..stored].iter().filter(|m| m.content.contains("Mondays")).count(), 2);
    assert!(messages[stored..].iter().any(|m| m.content == "Yes, it is open on Sundays."));
    assert!(second.state.messages.iter().any(|m| m.content.contains("Welcome back Alice Kim!")));
}

#[tokio::test]
async fn test_finished_thread_restarts_with_history() {
    let h = Harness::new(&["What is CultPass?", "Thanks, and how much is it?"]);
    h.validates(false);
    h.routes_to("faq");
    h.worker_says("faq", "A culture subscription.", false, true, json!(null));
    h.summarizes("What CultPass is");
    let first = h.hub.start_chat("cultpass", "f556c0", None, Some("t-2")).await.unwrap();
    let history = first.state.messages.len();

    h.routes_to("faq");
    h.worker_says("faq", "It costs 29 euros per month.", false, true, json!(null));
    let second = h.hub.start_chat("cultpass", "f556c0", None, Some("t-2")).await.unwrap();

    assert_eq!(h.agent.calls("validation"), 1);
    assert_eq!(second.ticket_id, first.ticket_id);
    assert!(second.state.messages.len() > history);
    assert_eq!(second.state.messages[..history], first.state.messages[..]);
    assert_eq!(h.store.tickets().len(), 1);
    assert_eq!(h.chat.delivered().iter().filter(|m| m.starts_with("You can continue")).count(), 2);
}

#[tokio::test]
async fn test_graph_step_ceiling() {
    let config = GraphConfig {
        max_graph_steps: 2,
        ..Default::default()
    };
    let h = Harness::with_config(&["hello"], config);
    h.validates(false);

    let err = h.hub.start_chat("cultpass", "f556c0", None, None).await.unwrap_err();

    assert!(matches!(err, Error::StepLimitExceeded { limit: 2 }));
}

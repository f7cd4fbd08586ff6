//! Chat transports: where user messages come from and replies go to

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use udahub_agent::Transport;
use udahub_ai::{CompletionOptions, Context, Message};

/// Words that end a conversation when typed by the user
pub const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

fn is_exit_word(text: &str) -> bool {
    EXIT_WORDS.contains(&text.trim().to_lowercase().as_str())
}

#[async_trait]
pub trait ChatInterface: Send + Sync {
    /// Next user message, or `None` once the stream has ended
    async fn next_message(&self) -> Option<String>;

    /// Show an assistant message to the user
    async fn deliver(&self, message: &str);
}

/// Replays a fixed list of user messages and records everything delivered
#[derive(Default)]
pub struct ListChat {
    messages: Vec<String>,
    cursor: Mutex<usize>,
    delivered: Mutex<Vec<String>>,
    echo: bool,
}

impl ListChat {
    pub fn new<S: Into<String>>(messages: impl IntoIterator<Item = S>) -> Self {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Also print both sides of the conversation to stdout
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }

    /// How many user messages have been handed out
    pub fn consumed(&self) -> usize {
        *self.cursor.lock()
    }
}

#[async_trait]
impl ChatInterface for ListChat {
    async fn next_message(&self) -> Option<String> {
        let mut cursor = self.cursor.lock();
        let message = self.messages.get(*cursor).cloned()?;
        *cursor += 1;
        if self.echo {
            println!("user> {}", message);
        }
        Some(message)
    }

    async fn deliver(&self, message: &str) {
        tracing::debug!(message, "delivered");
        if self.echo {
            println!("assistant> {}", message);
        }
        self.delivered.lock().push(message.to_string());
    }
}

/// Reads from stdin and prints to stdout
pub struct ConsoleChat {
    lines: tokio::sync::Mutex<tokio::io::Lines<BufReader<tokio::io::Stdin>>>,
}

impl ConsoleChat {
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for ConsoleChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatInterface for ConsoleChat {
    async fn next_message(&self) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(b"> ").await;
        let _ = stdout.flush().await;

        let line = match self.lines.lock().await.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read from stdin: {}", e);
                return None;
            }
        };

        let text = line.trim();
        if is_exit_word(text) {
            return None;
        }
        Some(text.to_string())
    }

    async fn deliver(&self, message: &str) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(format!("{}\n\n", message).as_bytes()).await;
        let _ = stdout.flush().await;
    }
}

struct SimulationState {
    turns_left: usize,
    history: Vec<Message>,
}

/// A model playing the user.
///
/// From the simulated user's point of view the assistant's replies are the
/// incoming turns, so delivered messages are stored as user messages and the
/// generated user text as assistant messages.
pub struct LlmChat {
    transport: Arc<dyn Transport>,
    system_prompt: String,
    end_token: String,
    state: Mutex<SimulationState>,
    on_generated: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl LlmChat {
    pub fn new(
        transport: Arc<dyn Transport>,
        instructions: &str,
        max_turns: usize,
        end_token: impl Into<String>,
    ) -> Self {
        let end_token = end_token.into();
        let system_prompt = format!(
            "{}\n\n\
             You are simulating the USER in a chat with an assistant.\n\
             Rules:\n\
             - Output ONLY the user's next message as plain text.\n\
             - If the conversation should end, output exactly: {}\n",
            instructions.trim(),
            end_token
        );
        Self {
            transport,
            system_prompt,
            end_token,
            state: Mutex::new(SimulationState {
                turns_left: max_turns,
                history: Vec::new(),
            }),
            on_generated: None,
        }
    }

    /// Called with every generated user message
    pub fn on_generated(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_generated = Some(Box::new(callback));
        self
    }
}

#[async_trait]
impl ChatInterface for LlmChat {
    async fn next_message(&self) -> Option<String> {
        let history = {
            let mut state = self.state.lock();
            if state.turns_left == 0 {
                return None;
            }
            state.turns_left -= 1;
            state.history.clone()
        };

        let mut context = Context::with_system(&self.system_prompt);
        context.messages = history;
        if context.messages.is_empty() {
            context.push(Message::user("(The assistant is waiting for you to start.)"));
        }

        let completion = match self
            .transport
            .complete(&context, &CompletionOptions::default(), CancellationToken::new())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Simulated user failed to respond: {}", e);
                return None;
            }
        };

        let text = completion.message.text().trim().to_string();
        if text.is_empty() || text == self.end_token || is_exit_word(&text) {
            return None;
        }

        self.state.lock().history.push(Message::assistant(&text));
        if let Some(callback) = &self.on_generated {
            callback(&text);
        }
        Some(text)
    }

    async fn deliver(&self, message: &str) {
        if !message.trim().is_empty() {
            self.state.lock().history.push(Message::user(message));
        }
    }
}

//! Core chat session management.
//!
//! A [`ChatSession`] owns the conversation and runs one turn at a time:
//! expand file references, send the conversation, assemble the reply, and
//! render it.

use futures::StreamExt;

use crate::chat::config::ChatConfig;
use crate::chat::repl::LoopState;
use crate::client::{CompletionClient, Reply, ResponseMode};
use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::expand::InputExpander;
use crate::highlight::Highlighter;
use crate::interrupt::Interrupt;
use crate::progress::ProgressIndicator;
use crate::render::{RenderStatus, Renderer, ResponseRenderer};
use crate::segment::segment;
use crate::types::ChatRequest;

/// How one turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The input was blank; nothing was sent.
    Skipped,
    /// The reply was appended and rendered.
    Answered(RenderStatus),
    /// The request failed; the error has been reported.
    Failed(Error),
    /// The endpoint refused the request for rate limiting.  Not yet reported.
    RateLimited(Error),
    /// The user interrupted the request.
    Interrupted,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: String,
    /// The number of messages in the conversation, system message included.
    pub message_count: usize,
    /// Completed user/assistant exchanges.
    pub turns: usize,
    /// Requests sent to the endpoint.
    pub requests: u64,
    /// Requests that failed.
    pub failures: u64,
    /// Whether replies are streamed.
    pub streaming: bool,
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession<C: CompletionClient> {
    client: C,
    config: ChatConfig,
    conversation: Conversation,
    expander: InputExpander,
    responder: ResponseRenderer,
    interrupt: Interrupt,
    state: LoopState,
    request_count: u64,
    failure_count: u64,
}

impl<C: CompletionClient> ChatSession<C> {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: C, config: ChatConfig) -> Self {
        let responder = ResponseRenderer::new(Highlighter::with_color(config.use_color))
            .with_label(config.label.clone())
            .with_typing_delay(config.typing_delay);
        Self {
            client,
            conversation: Conversation::new(config.system_prompt.clone()),
            expander: InputExpander::from_current_dir(),
            responder,
            interrupt: Interrupt::new(),
            state: LoopState::AwaitingInput,
            request_count: 0,
            failure_count: 0,
            config,
        }
    }

    /// Uses `interrupt` instead of a private signal.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Resolves file references with `expander`.
    pub fn with_expander(mut self, expander: InputExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// The phase of the current or last turn.
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Changes the model for subsequent requests.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// Switches streaming for subsequent requests.
    pub fn set_stream(&mut self, stream: bool) {
        self.config.stream = stream;
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.config.model.clone(),
            message_count: self.conversation.len(),
            turns: self.conversation.turns(),
            requests: self.request_count,
            failures: self.failure_count,
            streaming: self.config.stream,
        }
    }

    /// Runs one turn for the raw user input.
    ///
    /// The user message stays in the conversation whatever happens; an
    /// assistant message is appended only when the request succeeds.
    pub async fn run_turn(&mut self, raw: &str, out: &mut dyn Renderer) -> TurnOutcome {
        if raw.trim().is_empty() {
            return TurnOutcome::Skipped;
        }

        self.enter(LoopState::Expanding);
        let expansion = self.expander.expand(raw);
        for warning in &expansion.warnings {
            out.print_warning(&warning.to_string());
        }
        if !expansion.files.is_empty() {
            tracing::info!(files = expansion.files.len(), "inlined file references");
        }
        self.conversation.push_user(expansion.text);

        self.enter(LoopState::Requesting);
        self.request_count += 1;
        let mode = ResponseMode::from_flag(self.config.stream);
        let request = ChatRequest::new(&self.config.model, self.conversation.messages());
        let progress = ProgressIndicator::start_if(self.config.progress_enabled());
        let result = tokio::select! {
            biased;
            _ = self.interrupt.triggered() => None,
            result = fetch(&self.client, &request, mode, &progress) => Some(result),
        };
        progress.finish().await;

        let text = match result {
            None => {
                tracing::info!("request interrupted");
                out.print_interrupted();
                self.enter(LoopState::AwaitingInput);
                return TurnOutcome::Interrupted;
            }
            Some(Err(err)) => {
                self.failure_count += 1;
                self.enter(LoopState::AwaitingInput);
                if err.is_rate_limit() {
                    tracing::info!(error = %err, "rate limited");
                    return TurnOutcome::RateLimited(err);
                }
                tracing::info!(error = %err, "request failed");
                out.print_error(&format!("An error occurred: {err}"));
                return TurnOutcome::Failed(err);
            }
            Some(Ok(text)) => text,
        };

        self.conversation.push_assistant(text.as_str());

        self.enter(LoopState::Rendering);
        let segmentation = segment(&text);
        let status = self.responder.render(&segmentation.segments, out).await;
        self.enter(LoopState::AwaitingInput);
        TurnOutcome::Answered(status)
    }

    fn enter(&mut self, state: LoopState) {
        tracing::debug!(from = ?self.state, to = ?state, "state transition");
        self.state = state;
    }
}

/// Sends `request` and assembles the reply.  The progress indicator stops at
/// the first streamed fragment.
async fn fetch<C: CompletionClient>(
    client: &C,
    request: &ChatRequest<'_>,
    mode: ResponseMode,
    progress: &ProgressIndicator,
) -> Result<String> {
    match client.send(request, mode).await? {
        Reply::Complete(text) => Ok(text),
        Reply::Streaming(mut fragments) => {
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                progress.cancel();
                text.push_str(&fragment?);
            }
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::client::FragmentStream;
    use crate::types::{Message, MessageRole};

    /// Replies with canned answers and records every request.
    #[derive(Default)]
    struct Canned {
        replies: Mutex<Vec<Result<String>>>,
        requests: Mutex<Vec<(Vec<Message>, bool)>>,
    }

    impl Canned {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                requests: Mutex::default(),
            }
        }

        fn next(&self, request: &ChatRequest<'_>) -> Result<String> {
            self.requests
                .lock()
                .unwrap()
                .push((request.messages.to_vec(), request.stream));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    #[async_trait]
    impl CompletionClient for Canned {
        async fn complete(&self, request: &ChatRequest<'_>) -> Result<String> {
            self.next(request)
        }

        async fn stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream> {
            let text = self.next(request)?;
            let fragments: Vec<Result<String>> =
                text.chars().map(|c| Ok(c.to_string())).collect();
            Ok(Box::pin(stream::iter(fragments)))
        }
    }

    #[derive(Default)]
    struct Sink {
        output: String,
        errors: Vec<String>,
        warnings: Vec<String>,
        interrupted: bool,
    }

    impl Renderer for Sink {
        fn print_label(&mut self, label: &str) {
            self.output.push_str(label);
        }
        fn print_prose_char(&mut self, ch: char) {
            self.output.push(ch);
        }
        fn print_code_block(&mut self, block: &str) {
            self.output.push_str(block);
        }
        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }
        fn print_warning(&mut self, warning: &str) {
            self.warnings.push(warning.to_string());
        }
        fn print_info(&mut self, _info: &str) {}
        fn finish_response(&mut self) {}
        fn print_interrupted(&mut self) {
            self.interrupted = true;
        }
    }

    fn config() -> ChatConfig {
        ChatConfig::new()
            .without_color()
            .with_typing_delay(Duration::ZERO)
            .with_progress(false)
            .with_history_path(None)
    }

    #[tokio::test]
    async fn successful_turn_appends_reply() {
        let client = Canned::new(vec![Ok("Hello!\n```py\nprint(1)\n```".to_string())]);
        let mut session = ChatSession::new(client, config());
        let mut out = Sink::default();

        let outcome = session.run_turn("hi", &mut out).await;
        assert!(matches!(outcome, TurnOutcome::Answered(RenderStatus::Completed)));
        let roles: Vec<MessageRole> = session
            .conversation()
            .messages()
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(out.output, "ChatGPT: Hello!\nprint(1)");
        assert_eq!(session.state(), LoopState::AwaitingInput);
        assert_eq!(session.stats().turns, 1);
    }

    #[tokio::test]
    async fn blocking_mode_sends_stream_false() {
        let client = Canned::new(vec![Ok("ok".to_string())]);
        let mut session = ChatSession::new(client, config().with_stream(false));
        let mut out = Sink::default();
        session.run_turn("hi", &mut out).await;
        let requests = session.client.requests.lock().unwrap();
        assert!(!requests[0].1);
    }

    #[tokio::test]
    async fn full_history_is_sent_each_turn() {
        let client = Canned::new(vec![Ok("one".to_string()), Ok("two".to_string())]);
        let mut session = ChatSession::new(client, config());
        let mut out = Sink::default();
        session.run_turn("first", &mut out).await;
        session.run_turn("second", &mut out).await;

        let requests = session.client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0.len(), 2);
        assert_eq!(requests[1].0.len(), 4);
        assert_eq!(requests[1].0[2], Message::assistant("one"));
        assert!(requests[1].1);
    }

    #[tokio::test]
    async fn blank_input_sends_nothing() {
        let client = Canned::new(vec![]);
        let mut session = ChatSession::new(client, config());
        let mut out = Sink::default();
        assert!(matches!(
            session.run_turn("   \n", &mut out).await,
            TurnOutcome::Skipped
        ));
        assert!(session.client.requests.lock().unwrap().is_empty());
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn failure_keeps_user_message_only() {
        let client = Canned::new(vec![Err(Error::internal_server("boom"))]);
        let mut session = ChatSession::new(client, config());
        let mut out = Sink::default();

        let outcome = session.run_turn("hi", &mut out).await;
        assert!(matches!(outcome, TurnOutcome::Failed(_)));
        assert_eq!(session.conversation().len(), 2);
        assert!(session.conversation().awaiting_reply());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].starts_with("An error occurred: "));
        assert_eq!(session.stats().failures, 1);
    }

    #[tokio::test]
    async fn rate_limit_is_left_to_the_caller() {
        let client = Canned::new(vec![Err(Error::rate_limit("slow down", Some(20)))]);
        let mut session = ChatSession::new(client, config());
        let mut out = Sink::default();

        let outcome = session.run_turn("hi", &mut out).await;
        assert!(matches!(outcome, TurnOutcome::RateLimited(ref e) if e.is_rate_limit()));
        assert!(out.errors.is_empty());
        assert_eq!(session.conversation().len(), 2);
    }

    #[tokio::test]
    async fn interrupt_discards_the_request() {
        let client = Canned::new(vec![Ok("never shown".to_string())]);
        let mut session = ChatSession::new(client, config());
        session.interrupt().trigger();
        let mut out = Sink::default();

        let outcome = session.run_turn("hi", &mut out).await;
        assert!(matches!(outcome, TurnOutcome::Interrupted));
        assert!(out.interrupted);
        assert_eq!(session.conversation().len(), 2);
        assert!(!out.output.contains("never shown"));
    }

    #[tokio::test]
    async fn file_references_are_expanded_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();
        let client = Canned::new(vec![Ok("noted".to_string())]);
        let mut session =
            ChatSession::new(client, config()).with_expander(InputExpander::new(dir.path()));
        let mut out = Sink::default();

        session.run_turn("summarize notes.txt", &mut out).await;
        let user = &session.conversation().messages()[1];
        assert!(user.content.contains("[File notes.txt]\nremember the milk"));
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn model_and_stream_switches_apply_to_next_request() {
        let client = Canned::new(vec![Ok("a".to_string())]);
        let mut session = ChatSession::new(client, config());
        session.set_model("gpt-4o");
        session.set_stream(false);
        let stats = session.stats();
        assert_eq!(stats.model, "gpt-4o");
        assert!(!stats.streaming);
        assert_eq!(session.model(), "gpt-4o");
    }
}

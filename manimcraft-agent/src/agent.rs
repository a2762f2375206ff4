//! Agent implementation - orchestrates the oracle <-> renderer loop

use crate::docs::{self, DocStore};
use crate::extract::extract_code;
use crate::renderer::{RenderedVideo, Renderer};
use manimcraft_error::{Error, ErrorKind, Result};
use manimcraft_llm::{
    complete_with_retry, ChatMessage, CompletionRequest, ImageAttachment, LlmProvider,
    RetryPolicy, ToolCall, ToolChoice, UsageTracker,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model override; the provider's default when `None`
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Generate/extract/render cycles before giving up
    pub max_attempts: usize,
    /// Oracle turns ending in tool calls allowed within one generation
    pub max_tool_rounds: usize,
    /// How many tool results per job are marked for prompt caching
    pub cacheable_tool_results: usize,
    /// Wall-clock bound on one generation, tool calls included
    pub generation_timeout: Duration,
    /// Where each attempt's code is written
    pub code_file: PathBuf,
    /// Where the finished video is moved
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 19999,
            temperature: 1.0,
            max_attempts: 5,
            max_tool_rounds: 25,
            cacheable_tool_results: 4,
            generation_timeout: Duration::from_secs(900),
            code_file: PathBuf::from("outputs.py"),
            output_dir: PathBuf::from("output"),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts repair cycles within one job: one step per failed attempt that is
/// sent back to the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptCounter(usize);

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed attempt, returning the new count
    pub fn advance(&mut self) -> usize {
        self.0 += 1;
        self.0
    }

    pub fn count(&self) -> usize {
        self.0
    }
}

/// Result of a successful job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Final location of the rendered video
    pub video: PathBuf,
    /// The code that produced it
    pub code_file: PathBuf,
    /// Attempts used, the successful one included
    pub attempts: usize,
}

const FORMAT_REMINDER: &str = "Your reply did not contain the program. Reply with the complete \
    Manim program, defining the scene class FullTutorial, inside a single ```python fenced code block.";

const TOOL_LIMIT_REMINDER: &str = "You have used all documentation lookups available for this \
    attempt. Do not call any more tools. Reply now with the complete program inside a single \
    ```python fenced code block.";

/// The agent orchestrator.
///
/// Owns the conversation for one job at a time. `run` starts a fresh job;
/// `generate` is one pass of the documentation tool loop.
pub struct Agent<P, R> {
    provider: P,
    renderer: R,
    docs: DocStore,
    system_prompt: String,
    config: AgentConfig,
    conversation: Vec<ChatMessage>,
    attempts: AttemptCounter,
    cached_results: usize,
    usage: UsageTracker,
}

impl<P: LlmProvider, R: Renderer> Agent<P, R> {
    pub fn new(
        provider: P,
        renderer: R,
        docs: DocStore,
        system_prompt: String,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            renderer,
            docs,
            system_prompt,
            config,
            conversation: Vec::new(),
            attempts: AttemptCounter::new(),
            cached_results: 0,
            usage: UsageTracker::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Every turn of the current job, in order
    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn attempts(&self) -> AttemptCounter {
        self.attempts
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run one job to completion: generate, extract, render, repair.
    ///
    /// `task` becomes the first user turn, with `images` attached to it.
    pub async fn run(&mut self, task: &str, images: Vec<ImageAttachment>) -> Result<JobOutcome> {
        self.conversation.clear();
        self.attempts = AttemptCounter::new();
        self.cached_results = 0;
        self.usage = UsageTracker::new();

        let max_attempts = self.config.max_attempts.max(1);
        info!(max_attempts, images = images.len(), "starting job");
        self.conversation.push(ChatMessage::user(task).with_images(images));

        loop {
            let attempt = self.attempts.count() + 1;
            info!(attempt, "generating code");
            let answer = self.generate().await?;

            let failure = match extract_code(&answer) {
                None => Error::code_block_missing(),
                Some(code) => {
                    self.write_code(&code).await?;
                    match self.renderer.render(&self.config.code_file).await {
                        Ok(rendered) => {
                            let video = self.deliver(&rendered).await?;
                            info!(attempt, video = %video.display(), "render succeeded");
                            return Ok(JobOutcome {
                                video,
                                code_file: self.config.code_file.clone(),
                                attempts: attempt,
                            });
                        }
                        Err(e) if e.kind().is_repairable() => e,
                        Err(e) => return Err(e),
                    }
                }
            };

            warn!(attempt, kind = %failure.kind(), "attempt failed");
            if attempt >= max_attempts {
                return Err(Error::attempts_exhausted(attempt)
                    .with_operation("Agent::run")
                    .with_context("last_error", failure.message().to_string()));
            }
            self.conversation.push(ChatMessage::user(feedback(&failure)));
            self.attempts.advance();
        }
    }

    /// Ask the oracle for a final answer, serving documentation lookups
    /// until it stops calling tools. The answer is appended to the
    /// conversation and returned.
    pub async fn generate(&mut self) -> Result<String> {
        let limit = self.config.generation_timeout;
        match tokio::time::timeout(limit, self.tool_loop()).await {
            Ok(answer) => answer,
            Err(_) => Err(Error::timeout("generation", limit.as_secs()).with_operation("Agent::generate")),
        }
    }

    async fn tool_loop(&mut self) -> Result<String> {
        let mut rounds = 0;
        loop {
            let exhausted = rounds >= self.config.max_tool_rounds;
            if exhausted {
                debug!(rounds, "tool round limit reached");
                self.conversation.push(ChatMessage::user(TOOL_LIMIT_REMINDER));
            }

            let choice = if exhausted { ToolChoice::None } else { ToolChoice::Auto };
            let request = self.request(choice);
            debug!(turns = request.messages.len(), "sending oracle request");

            // Transient failures have already been retried here.
            let response = complete_with_retry(&self.provider, &request, &self.config.retry)
                .await
                .map_err(|e| e.into_error("Agent::generate").persist())?;
            self.usage.track(&response.model, &response.usage);

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default();
                if !answer.trim().is_empty() {
                    self.conversation.push(ChatMessage::assistant(answer.clone()));
                }
                return Ok(answer);
            }

            if exhausted {
                return Err(Error::new(
                    ErrorKind::ToolLimitExceeded,
                    format!("model kept calling tools after {} rounds", rounds),
                )
                .with_operation("Agent::generate"));
            }

            rounds += 1;
            let mut text = response.content;
            for call in response.tool_calls {
                self.conversation.push(ChatMessage::assistant_tool_call(text.take(), call.clone()));
                let result = self.serve(&call);
                self.push_tool_result(call.id, result);
            }
        }
    }

    /// Answer one tool call from the documentation store
    pub fn serve(&self, call: &ToolCall) -> String {
        info!(tool = %call.name, arguments = %call.arguments, "tool call");
        self.docs.serve(call)
    }

    fn push_tool_result(&mut self, id: String, result: String) {
        let mut turn = ChatMessage::tool_result(id, result);
        if self.cached_results < self.config.cacheable_tool_results {
            self.cached_results += 1;
            turn = turn.cacheable();
        }
        self.conversation.push(turn);
    }

    fn request(&self, choice: ToolChoice) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.conversation.iter().cloned());

        let mut request = CompletionRequest::new(messages)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_tools(vec![docs::tool_definition()])
            .with_tool_choice(choice);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        request
    }

    async fn write_code(&self, code: &str) -> Result<()> {
        let path = &self.config.code_file;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, code).await.map_err(|e| {
            Error::from(e)
                .with_operation("Agent::write_code")
                .with_context("path", path.display().to_string())
        })?;
        debug!(path = %path.display(), bytes = code.len(), "wrote generated code");
        Ok(())
    }

    /// Move the rendered video into the output directory
    async fn deliver(&self, rendered: &RenderedVideo) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let target = self
            .config
            .output_dir
            .join(format!("tutorial_{}.mp4", chrono::Utc::now().timestamp()));
        move_file(&rendered.path, &target).await?;
        Ok(target)
    }
}

/// The user turn appended after a failed attempt
fn feedback(failure: &Error) -> String {
    match failure.kind() {
        ErrorKind::CodeBlockMissing => FORMAT_REMINDER.to_string(),
        _ => format!("Code gave the following error:\n{}", failure.message()),
    }
}

/// Rename, falling back to copy + remove when crossing filesystems
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await.map_err(|e| {
        Error::from(e)
            .with_operation("Agent::deliver")
            .with_context("from", from.display().to_string())
            .with_context("to", to.display().to_string())
    })?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ENTRY_POINT;

    #[test]
    fn test_attempt_counter() {
        let mut counter = AttemptCounter::new();
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_feedback_text() {
        let err = Error::render_failed("Traceback (most recent call last):\nNameError: Circl");
        assert_eq!(
            feedback(&err),
            "Code gave the following error:\nTraceback (most recent call last):\nNameError: Circl"
        );

        let err = Error::entry_point_missing(ENTRY_POINT);
        assert_eq!(
            feedback(&err),
            "Code gave the following error:\nThe provided code did not define a class 'FullTutorial'."
        );

        assert_eq!(feedback(&Error::code_block_missing()), FORMAT_REMINDER);
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_tokens, 19999);
        assert_eq!(config.cacheable_tool_results, 4);
        assert_eq!(config.code_file, PathBuf::from("outputs.py"));
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let from = dir.path().join("FullTutorial.mp4");
        let to = dir.path().join("tutorial_1.mp4");
        std::fs::write(&from, b"mp4").unwrap();

        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"mp4");
    }
}

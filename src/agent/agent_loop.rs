//! The decide/act cycle shared by conversations, subagents and heartbeats.
//!
//! One turn: ask the decision-maker for the next action, run the requested
//! tools one at a time in the order given, feed the results back, repeat
//! until a final answer or until the step or wall-clock budget runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::{CallerId, ExecutionDefaults};
use crate::error::ErrorKind;
use crate::llm::{ChatMessage, NextAction, Reasoning, ReasoningContext};
use crate::tools::{ToolDispatcher, ToolResult};
use crate::workspace::Workspace;

/// Limits for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBudget {
    /// Decision-maker calls allowed.
    pub max_steps: usize,
    /// Wall-clock limit for the whole turn.
    pub max_duration: Duration,
}

impl LoopBudget {
    pub fn new(max_steps: usize, max_duration: Duration) -> Self {
        Self {
            max_steps,
            max_duration,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The decision-maker produced a final answer.
    Answer(String),
    /// The budget ran out first. `partial` holds the last text the
    /// decision-maker produced, if any.
    BudgetExceeded { partial: String, reason: String },
    /// The decision-maker itself failed.
    Failed(String),
}

impl TurnOutcome {
    /// Text to show whoever is waiting on the turn.
    pub fn display_text(&self) -> String {
        match self {
            TurnOutcome::Answer(text) => text.clone(),
            TurnOutcome::BudgetExceeded { partial, reason } if partial.is_empty() => {
                format!("I stopped before finishing: {}.", reason)
            }
            TurnOutcome::BudgetExceeded { partial, reason } => {
                format!("{}\n\n(stopped before finishing: {})", partial, reason)
            }
            TurnOutcome::Failed(reason) => {
                format!("Sorry, I ran into a problem: {}", reason)
            }
        }
    }

    /// Fold into the tool-result envelope, for callers that report results
    /// the same way tools do.
    pub fn into_tool_result(self) -> ToolResult {
        match self {
            TurnOutcome::Answer(text) => ToolResult::success(text),
            outcome @ TurnOutcome::BudgetExceeded { .. } => {
                ToolResult::failure(ErrorKind::BudgetExceeded, outcome.display_text())
            }
            TurnOutcome::Failed(reason) => ToolResult::failure(ErrorKind::InternalError, reason),
        }
    }
}

/// A finished turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// Messages produced during the turn (user input first), ready to be
    /// appended to the conversation history.
    pub messages: Vec<ChatMessage>,
    /// Decision-maker calls made.
    pub steps: usize,
}

/// Runs turns against a shared dispatcher.
pub struct AgentLoop {
    reasoning: Arc<Reasoning>,
    dispatcher: ToolDispatcher,
    defaults: ExecutionDefaults,
    workspace: Option<Workspace>,
}

impl AgentLoop {
    pub fn new(reasoning: Arc<Reasoning>, dispatcher: ToolDispatcher, defaults: ExecutionDefaults) -> Self {
        Self {
            reasoning,
            dispatcher,
            defaults,
            workspace: None,
        }
    }

    /// Compose the system prompt from this workspace on every turn.
    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    async fn system_prompt(&self) -> Option<String> {
        let workspace = self.workspace.as_ref()?;
        match workspace.system_prompt().await {
            Ok(prompt) => Some(prompt),
            Err(e) => {
                tracing::warn!("Failed to build system prompt: {}", e);
                None
            }
        }
    }

    /// Run one turn for `caller`, starting from `history` plus `input`.
    pub async fn run_turn(
        &self,
        caller: CallerId,
        history: &[ChatMessage],
        input: &str,
        budget: LoopBudget,
    ) -> TurnResult {
        let started = Instant::now();
        let mut messages = vec![ChatMessage::user(input)];
        let mut partial = String::new();
        let tools = self.dispatcher.registry().tool_definitions();
        let system_prompt = self.system_prompt().await;

        let over_time = |reason: &mut Option<String>| {
            if started.elapsed() >= budget.max_duration {
                *reason = Some(format!(
                    "time limit of {}s reached",
                    budget.max_duration.as_secs()
                ));
                true
            } else {
                false
            }
        };

        let mut steps = 0;
        let mut exhausted: Option<String> = None;

        while exhausted.is_none() {
            if steps >= budget.max_steps {
                exhausted = Some(format!("step limit of {} reached", budget.max_steps));
                break;
            }
            if over_time(&mut exhausted) {
                break;
            }
            steps += 1;

            let mut context = ReasoningContext::new()
                .with_messages(history.iter().chain(messages.iter()).cloned().collect())
                .with_tools(tools.clone());
            context.system_prompt = system_prompt.clone();

            let remaining = budget.max_duration.saturating_sub(started.elapsed());
            let action = match tokio::time::timeout(remaining, self.reasoning.next_action(&context)).await {
                Ok(Ok(action)) => action,
                Ok(Err(e)) => {
                    tracing::error!(caller = %caller, "Decision-maker failed: {}", e);
                    return TurnResult {
                        outcome: TurnOutcome::Failed(e.to_string()),
                        messages,
                        steps,
                    };
                }
                Err(_) => {
                    over_time(&mut exhausted);
                    break;
                }
            };

            let (content, calls) = match action {
                NextAction::Answer(text) => {
                    messages.push(ChatMessage::assistant(text.clone()));
                    tracing::debug!(caller = %caller, steps = steps, "Turn finished");
                    return TurnResult {
                        outcome: TurnOutcome::Answer(text),
                        messages,
                        steps,
                    };
                }
                NextAction::Tools { content, calls } => (content, calls),
            };

            if !content.trim().is_empty() {
                partial = content.clone();
            }
            messages.push(ChatMessage::assistant_with_tool_calls(content, calls.clone()));

            for call in &calls {
                // Every requested call gets a result, even once the budget is gone.
                let result = if exhausted.is_some() || over_time(&mut exhausted) {
                    ToolResult::failure(
                        ErrorKind::BudgetExceeded,
                        "not run: the turn ran out of time",
                    )
                } else {
                    let remaining = budget.max_duration.saturating_sub(started.elapsed());
                    let mut ctx = self.defaults.context_for(caller.clone());
                    ctx.timeout = ctx.timeout.min(remaining);
                    self.dispatcher.dispatch(call, ctx).await
                };

                if let ToolResult::Failure { kind, ref message } = result {
                    tracing::debug!(caller = %caller, tool = %call.name, kind = %kind, "Tool call failed: {}", message);
                }
                messages.push(ChatMessage::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    result.to_message(),
                ));
            }
        }

        let reason = exhausted.unwrap_or_else(|| "budget exhausted".to_string());
        tracing::warn!(caller = %caller, steps = steps, "Turn stopped: {}", reason);
        TurnResult {
            outcome: TurnOutcome::BudgetExceeded { partial, reason },
            messages,
            steps,
        }
    }
}

use backfill_agent::CompletionOptions;
use backfill_core::reasoning::{Reasoner, ReasoningRequest};
use backfill_core::{BackfillError, Result};
use std::time::Duration;
use tokio::runtime::Handle;

/// Reasoner backed by the `claude` CLI.
///
/// The batch loop is synchronous; each completion is driven to the end on
/// the CLI's runtime through `handle`. Must not be called from inside that
/// runtime's worker threads.
pub struct ClaudeReasoner {
    handle: Handle,
    options: CompletionOptions,
    timeout: Duration,
}

impl ClaudeReasoner {
    pub fn new(handle: Handle, options: CompletionOptions, timeout: Duration) -> Self {
        Self {
            handle,
            options,
            timeout,
        }
    }
}

impl Reasoner for ClaudeReasoner {
    fn name(&self) -> &str {
        "claude"
    }

    fn complete(&self, request: &ReasoningRequest) -> Result<String> {
        let mut opts = self.options.clone();
        if !request.system.is_empty() {
            opts.system_prompt = Some(request.system.clone());
        }

        let completion = self
            .handle
            .block_on(backfill_agent::complete(
                request.prompt.clone(),
                opts,
                self.timeout,
            ))
            .map_err(|e| BackfillError::PlannerUnavailable(format!("claude: {e}")))?;

        tracing::debug!(
            session_id = %completion.session_id,
            duration_ms = completion.duration_ms,
            "completion finished"
        );
        Ok(completion.text)
    }
}

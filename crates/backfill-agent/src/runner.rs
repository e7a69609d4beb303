use std::time::Duration;

use futures::StreamExt;

use crate::stream::MessageStream;
use crate::{query, AgentError, CompletionOptions, Message, Result};

// ─── Completion ───────────────────────────────────────────────────────────

/// The reply of a finished single-turn completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub session_id: String,
    pub text: String,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub total_cost_usd: f64,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Send `prompt` and wait at most `timeout` for the reply.
///
/// On timeout the stream is dropped, which kills the subprocess.
pub async fn complete(
    prompt: impl Into<String>,
    opts: CompletionOptions,
    timeout: Duration,
) -> Result<Completion> {
    collect_within(query(prompt, opts), timeout).await
}

// ─── Internal ─────────────────────────────────────────────────────────────

pub(crate) async fn collect_within(stream: MessageStream, timeout: Duration) -> Result<Completion> {
    match tokio::time::timeout(timeout, collect(stream)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "completion timed out");
            Err(AgentError::Timeout(timeout))
        }
    }
}

/// Drain `stream` to its terminal result.
///
/// The result text wins; when it is empty the assistant text blocks seen
/// along the way are used instead.
pub(crate) async fn collect(mut stream: MessageStream) -> Result<Completion> {
    let mut assistant_text = String::new();

    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Assistant(a) => assistant_text.push_str(&a.text()),
            Message::Result(r) => {
                if !r.is_success() {
                    return Err(AgentError::Failed { subtype: r.subtype });
                }
                let text = r
                    .result
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(assistant_text);
                return Ok(Completion {
                    session_id: r.session_id,
                    text,
                    num_turns: r.num_turns,
                    duration_ms: r.duration_ms,
                    total_cost_usd: r.total_cost_usd,
                });
            }
            Message::System(_) => {}
        }
    }

    Err(AgentError::Process(
        "stream ended without a result message".into(),
    ))
}

// ─── Tests ────────────────────────────────────────────────────────────────

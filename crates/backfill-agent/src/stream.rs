use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::AgentProcess;
use crate::types::{CompletionOptions, Message};
use crate::Result;

// ─── MessageStream ────────────────────────────────────────────────────────

/// Messages from one `claude` subprocess, forwarded by a background task
/// until the terminal `result` message or process exit. Dropping the stream
/// kills the child.
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl MessageStream {
    pub(crate) fn new(prompt: String, opts: CompletionOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let process = match AgentProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            pump(process, tx).await;
        });

        Self { rx }
    }

    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

/// Forward messages from `process` into `tx`. A closed receiver kills the
/// process without waiting for more output.
pub(crate) async fn pump(mut process: AgentProcess, tx: mpsc::Sender<Result<Message>>) {
    let mut got_result = false;
    loop {
        let next = tokio::select! {
            next = process.next_message() => next,
            _ = tx.closed() => {
                process.kill().await;
                return;
            }
        };
        match next {
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
            Ok(None) => break,
            Ok(Some(msg)) => {
                let terminal = matches!(msg, Message::Result(_));
                got_result |= terminal;
                if tx.send(Ok(msg)).await.is_err() || terminal {
                    break;
                }
            }
        }
    }

    if !got_result {
        if let Some(exit_err) = process.wait_exit_error().await {
            let _ = tx.send(Err(exit_err)).await;
        }
    }

    process.kill().await;
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    /// Stream whose process is `sh -c "cat <file>; exit <code>"`.
    pub(crate) fn mock_stream_with_exit(lines: &[&str], code: i32) -> MessageStream {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        let (_, path) = f.keep().unwrap();

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(format!("cat '{}'; exit {code}", path.display()));
            let process = AgentProcess::spawn_command(cmd).unwrap();
            pump(process, tx).await;
            let _ = std::fs::remove_file(&path);
        });
        MessageStream::from_channel(rx)
    }

    pub(crate) fn mock_stream(lines: &[&str]) -> MessageStream {
        mock_stream_with_exit(lines, 0)
    }

    pub(crate) const INIT_LINE: &str =
        r#"{"type":"system","subtype":"init","session_id":"s1","model":"m","tools":[],"cwd":"/tmp"}"#;
    pub(crate) const ASSISTANT_LINE: &str = r#"{"type":"assistant","session_id":"s1","parent_tool_use_id":null,"message":{"id":"msg_1","role":"assistant","model":"m","content":[{"type":"text","text":"[{\"action\": \"none\", \"input\": null}]"}],"stop_reason":"end_turn","usage":{"input_tokens":1,"output_tokens":1}}}"#;
    pub(crate) const RESULT_LINE: &str = r#"{"type":"result","subtype":"success","session_id":"s1","result":"[{\"action\": \"none\", \"input\": null}]","duration_ms":1,"duration_api_ms":1,"is_error":false,"num_turns":1,"stop_reason":"end_turn","total_cost_usd":0.0,"usage":{"input_tokens":1,"output_tokens":1}}"#;

    #[tokio::test]
    async fn stream_yields_all_messages() {
        let messages: Vec<_> = mock_stream(&[INIT_LINE, ASSISTANT_LINE, RESULT_LINE])
            .collect()
            .await;
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.is_ok()));
    }

    #[tokio::test]
    async fn stream_stops_at_result() {
        let messages: Vec<_> = mock_stream(&[INIT_LINE, RESULT_LINE, INIT_LINE])
            .collect()
            .await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages.last().unwrap().as_ref().unwrap(),
            Message::Result(_)
        ));
    }

    #[tokio::test]
    async fn stream_skips_blank_lines_and_unknown_types() {
        let messages: Vec<_> = mock_stream(&[
            INIT_LINE,
            "",
            r#"{"type":"rate_limit_event","session_id":"s1"}"#,
            RESULT_LINE,
        ])
        .collect()
        .await;
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn stream_reports_garbage_as_parse_error() {
        let messages: Vec<_> = mock_stream(&["this is not json"]).collect().await;
        assert!(matches!(
            messages.first(),
            Some(Err(crate::AgentError::Parse { .. }))
        ));
    }

    #[tokio::test]
    async fn nonzero_exit_without_result_is_an_error() {
        let messages: Vec<_> = mock_stream_with_exit(&[INIT_LINE], 2).collect().await;
        assert_eq!(messages.len(), 2);
        let err = messages.last().unwrap().as_ref().unwrap_err();
        assert!(err.to_string().contains("exited with code 2"));
    }
}

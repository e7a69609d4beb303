use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::types::{CompletionOptions, Message};
use crate::{AgentError, Result};

// ─── AgentProcess ─────────────────────────────────────────────────────────

/// A running `claude` subprocess in stream-json mode.
///
/// The child is killed when this value is dropped, so abandoning a stream
/// (for example on timeout) never leaves a process behind.
pub(crate) struct AgentProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    stderr_buf: Arc<Mutex<String>>,
}

impl AgentProcess {
    /// Spawn `claude`, send the prompt as a single user message and close
    /// stdin.
    pub(crate) async fn spawn(prompt: &str, opts: &CompletionOptions) -> Result<Self> {
        let mut cmd = build_command(opts);
        cmd.env_remove("CLAUDECODE");

        let mut process = Self::from_command(cmd)?;

        let user_msg = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}]
            }
        });
        process.send_message(&user_msg).await?;
        process.close_stdin();

        Ok(process)
    }

    /// Spawn an arbitrary command in place of `claude`.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(AgentError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process("stdout not captured".into()))?;

        let stdin = child.stdin.take();

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stdin,
            stderr_buf,
        })
    }

    async fn send_message(&mut self, msg: &serde_json::Value) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AgentError::Process("stdin already closed".into()))?;

        let mut buf = serde_json::to_vec(msg)
            .map_err(|e| AgentError::Process(format!("failed to serialize prompt: {e}")))?;
        buf.push(b'\n');

        stdin.write_all(&buf).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Next message from stdout, or `Ok(None)` at EOF. Blank lines and
    /// messages of unknown type are skipped.
    pub(crate) async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(trimmed) {
                Ok(msg) => return Ok(Some(msg)),
                Err(_) if is_unknown_message_type(trimmed) => {
                    tracing::trace!(line = trimmed, "skipping unrecognised message");
                    continue;
                }
                Err(source) => {
                    return Err(AgentError::Parse {
                        line: trimmed.to_owned(),
                        source,
                    })
                }
            }
        }
    }

    /// Wait for exit; a non-zero status becomes an error carrying stderr.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<AgentError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(AgentError::Io(e)),
        };
        if status.success() {
            return None;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();
        let head = match status.code() {
            Some(code) => format!("claude exited with code {code}"),
            None => "claude terminated by signal".to_string(),
        };
        Some(AgentError::Process(if stderr.is_empty() {
            head
        } else {
            format!("{head}\nstderr: {stderr}")
        }))
    }

    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Valid JSON whose `type` field names a message we do not model.
fn is_unknown_message_type(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned))
        .is_some_and(|t| !matches!(t.as_str(), "system" | "assistant" | "result"))
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(opts: &CompletionOptions) -> Command {
    let exe = opts.executable.as_deref().unwrap_or("claude");
    let mut cmd = Command::new(exe);

    cmd.arg("--print")
        .arg("--output-format")
        .arg("stream-json")
        .arg("--verbose")
        .arg("--input-format")
        .arg("stream-json")
        .arg("--max-turns")
        .arg("1");

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }

    if let Some(sp) = &opts.system_prompt {
        cmd.arg("--system-prompt").arg(sp);
    }

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_detection() {
        assert!(is_unknown_message_type(r#"{"type":"rate_limit_event"}"#));
        assert!(!is_unknown_message_type(r#"{"type":"result"}"#));
        assert!(!is_unknown_message_type("not json"));
        assert!(!is_unknown_message_type(r#"{"no_type":1}"#));
    }

    #[test]
    fn command_carries_model_and_system_prompt() {
        let cmd = build_command(&CompletionOptions {
            model: Some("claude-sonnet-4-5".into()),
            system_prompt: Some("be terse".into()),
            executable: Some("/opt/claude".into()),
        });
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/opt/claude");
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["--model", "claude-sonnet-4-5"]));
        assert!(args.windows(2).any(|w| w == ["--system-prompt", "be terse"]));
        assert!(args.windows(2).any(|w| w == ["--max-turns", "1"]));
    }
}

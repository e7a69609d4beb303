use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A central-id fetch was skipped because the record still had no id.
    MissingId,
    /// A lookup failed or timed out; the dependent field stays unset.
    LookupUnavailable,
    /// The record was dropped from the output under the `skip` policy.
    Skipped,
    /// The record failed and was kept unchanged under the `collect` policy.
    Error,
    /// The batch stopped before this record.
    Cancelled,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::MissingId => "missing_id",
            DiagnosticKind::LookupUnavailable => "lookup_unavailable",
            DiagnosticKind::Skipped => "skipped",
            DiagnosticKind::Error => "error",
            DiagnosticKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible note about one record. Every skipped step produces one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Position of the record in the input batch.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        index: usize,
        owner: Option<&str>,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            owner: owner.map(String::from),
            kind,
            message: message.into(),
        }
    }

    /// Emit this diagnostic as a structured `warn` event.
    pub fn log(&self) {
        tracing::warn!(
            index = self.index,
            owner = self.owner.as_deref().unwrap_or("<unknown>"),
            reason = %self.kind,
            "{}",
            self.message
        );
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(
                f,
                "[{}] #{} {}: {}",
                self.kind, self.index, owner, self.message
            ),
            None => write!(f, "[{}] #{}: {}", self.kind, self.index, self.message),
        }
    }
}

//! Lookup providers: the capability that turns an owner into an account id
//! and an account id into a central account id.
//!
//! Providers are injected into the resolver as trait objects. A provider
//! that cannot answer returns [`LookupUnavailable`]; the resolver contains
//! that failure and leaves the dependent field unset.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::exec::run_with_timeout;

/// A lookup failed, timed out, or has no answer for the given input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{lookup} lookup unavailable for '{input}': {reason}")]
pub struct LookupUnavailable {
    pub lookup: &'static str,
    pub input: String,
    pub reason: String,
}

impl LookupUnavailable {
    pub fn new(lookup: &'static str, input: &str, reason: impl Into<String>) -> Self {
        Self {
            lookup,
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type LookupResult = std::result::Result<String, LookupUnavailable>;

pub const ID_LOOKUP: &str = "account_id";
pub const CENTRAL_ID_LOOKUP: &str = "central_id";

pub trait LookupProvider {
    fn resolve_id(&self, owner: &str) -> LookupResult;

    fn resolve_central_id(&self, id: &str) -> LookupResult;
}

impl<L: LookupProvider + ?Sized> LookupProvider for Box<L> {
    fn resolve_id(&self, owner: &str) -> LookupResult {
        (**self).resolve_id(owner)
    }

    fn resolve_central_id(&self, id: &str) -> LookupResult {
        (**self).resolve_central_id(id)
    }
}

// ---------------------------------------------------------------------------
// SuffixLookup
// ---------------------------------------------------------------------------

pub const DEFAULT_ID_SUFFIX: &str = "-999";
pub const DEFAULT_CENTRAL_SUFFIX: &str = "-central-account";

/// Deterministic demo provider: appends a fixed suffix to its input.
/// Total over every input string.
#[derive(Debug, Clone)]
pub struct SuffixLookup {
    pub id_suffix: String,
    pub central_suffix: String,
}

impl SuffixLookup {
    pub fn new(id_suffix: impl Into<String>, central_suffix: impl Into<String>) -> Self {
        Self {
            id_suffix: id_suffix.into(),
            central_suffix: central_suffix.into(),
        }
    }
}

impl Default for SuffixLookup {
    fn default() -> Self {
        Self::new(DEFAULT_ID_SUFFIX, DEFAULT_CENTRAL_SUFFIX)
    }
}

impl LookupProvider for SuffixLookup {
    fn resolve_id(&self, owner: &str) -> LookupResult {
        Ok(format!("{owner}{}", self.id_suffix))
    }

    fn resolve_central_id(&self, id: &str) -> LookupResult {
        Ok(format!("{id}{}", self.central_suffix))
    }
}

// ---------------------------------------------------------------------------
// TableLookup
// ---------------------------------------------------------------------------

/// In-memory provider backed by two maps. A key that is not in the table is
/// reported as unavailable.
#[derive(Debug, Clone, Default)]
pub struct TableLookup {
    ids: HashMap<String, String>,
    central_ids: HashMap<String, String>,
}

impl TableLookup {
    pub fn new(ids: HashMap<String, String>, central_ids: HashMap<String, String>) -> Self {
        Self { ids, central_ids }
    }

    pub fn with_id(mut self, owner: impl Into<String>, id: impl Into<String>) -> Self {
        self.ids.insert(owner.into(), id.into());
        self
    }

    pub fn with_central_id(mut self, id: impl Into<String>, central: impl Into<String>) -> Self {
        self.central_ids.insert(id.into(), central.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.central_ids.is_empty()
    }
}

impl LookupProvider for TableLookup {
    fn resolve_id(&self, owner: &str) -> LookupResult {
        self.ids
            .get(owner)
            .cloned()
            .ok_or_else(|| LookupUnavailable::new(ID_LOOKUP, owner, "no entry"))
    }

    fn resolve_central_id(&self, id: &str) -> LookupResult {
        self.central_ids
            .get(id)
            .cloned()
            .ok_or_else(|| LookupUnavailable::new(CENTRAL_ID_LOOKUP, id, "no entry"))
    }
}

// ---------------------------------------------------------------------------
// CommandLookup
// ---------------------------------------------------------------------------

/// Provider that shells out to an external program.
///
/// Invoked as `<program> [args...] id <owner>` or
/// `<program> [args...] central-id <id>`. The first non-empty stdout line is
/// the answer. Spawn failure, non-zero exit, empty output, or exceeding the
/// timeout all map to [`LookupUnavailable`]; a timed-out child is killed.
#[derive(Debug, Clone)]
pub struct CommandLookup {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandLookup {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn run(&self, lookup: &'static str, mode: &str, input: &str) -> LookupResult {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(mode).arg(input);

        let stdout = run_with_timeout(cmd, None, self.timeout)
            .map_err(|e| LookupUnavailable::new(lookup, input, e.to_string()))?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from)
            .ok_or_else(|| LookupUnavailable::new(lookup, input, "empty output"))
    }
}

impl LookupProvider for CommandLookup {
    fn resolve_id(&self, owner: &str) -> LookupResult {
        self.run(ID_LOOKUP, "id", owner)
    }

    fn resolve_central_id(&self, id: &str) -> LookupResult {
        self.run(CENTRAL_ID_LOOKUP, "central-id", id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

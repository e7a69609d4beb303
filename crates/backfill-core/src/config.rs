use crate::error::{BackfillError, Result};
use crate::lookup::{
    CommandLookup, LookupProvider, SuffixLookup, TableLookup, DEFAULT_CENTRAL_SUFFIX,
    DEFAULT_ID_SUFFIX,
};
use crate::paths;
use crate::types::{ErrorPolicy, PlannerKind, PlanningPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlannerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub kind: PlannerKind,
    #[serde(default)]
    pub policy: PlanningPolicy,
}

// ---------------------------------------------------------------------------
// LookupConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    #[default]
    Suffix,
    Table,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default)]
    pub kind: LookupKind,
    #[serde(default = "default_id_suffix")]
    pub id_suffix: String,
    #[serde(default = "default_central_suffix")]
    pub central_suffix: String,
    /// Program for `kind: command`; invoked with `id <owner>` or
    /// `central-id <id>` appended to `args`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub ids: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub central_ids: HashMap<String, String>,
}

fn default_id_suffix() -> String {
    DEFAULT_ID_SUFFIX.to_string()
}

fn default_central_suffix() -> String {
    DEFAULT_CENTRAL_SUFFIX.to_string()
}

fn default_lookup_timeout() -> u64 {
    10
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            kind: LookupKind::default(),
            id_suffix: default_id_suffix(),
            central_suffix: default_central_suffix(),
            command: String::new(),
            args: Vec::new(),
            timeout_seconds: default_lookup_timeout(),
            ids: HashMap::new(),
            central_ids: HashMap::new(),
        }
    }
}

impl LookupConfig {
    pub fn build(&self) -> Result<Box<dyn LookupProvider>> {
        match self.kind {
            LookupKind::Suffix => Ok(Box::new(SuffixLookup::new(
                self.id_suffix.clone(),
                self.central_suffix.clone(),
            ))),
            LookupKind::Table => Ok(Box::new(TableLookup::new(
                self.ids.clone(),
                self.central_ids.clone(),
            ))),
            LookupKind::Command => {
                if self.command.trim().is_empty() {
                    return Err(BackfillError::InvalidConfig(
                        "lookup.kind is 'command' but lookup.command is empty".to_string(),
                    ));
                }
                Ok(Box::new(CommandLookup::new(
                    self.command.clone(),
                    self.args.clone(),
                    Duration::from_secs(self.timeout_seconds),
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReasonerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerKind {
    /// The `claude` CLI in stream-json mode.
    #[default]
    Claude,
    /// Any program that reads a prompt on stdin and prints a reply.
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerConfig {
    #[serde(default)]
    pub kind: ReasonerKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Path to the program. Defaults to `claude` on PATH for `kind: claude`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default = "default_reasoner_timeout")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_reasoner_timeout() -> u64 {
    60
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            kind: ReasonerKind::default(),
            model: default_model(),
            executable: None,
            args: Vec::new(),
            timeout_seconds: default_reasoner_timeout(),
        }
    }
}

impl ReasonerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The program that will be spawned, if one can be named.
    pub fn program(&self) -> Option<&str> {
        match (self.kind, self.executable.as_deref()) {
            (_, Some(exe)) if !exe.trim().is_empty() => Some(exe),
            (ReasonerKind::Claude, _) => Some("claude"),
            (ReasonerKind::Command, _) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

fn default_output_path() -> String {
    paths::DEFAULT_OUTPUT.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            report: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            planner: PlannerConfig::default(),
            on_error: ErrorPolicy::default(),
            lookup: LookupConfig::default(),
            reasoner: ReasonerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(BackfillError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(BackfillError::ConfigNotFound(path)) => {
                tracing::debug!(%path, "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.version != default_version() {
            warnings.push(ConfigWarning::warning(format!(
                "unsupported config version {} (expected {})",
                self.version,
                default_version()
            )));
        }

        match self.lookup.kind {
            LookupKind::Command => {
                let command = self.lookup.command.trim();
                if command.is_empty() {
                    warnings.push(ConfigWarning::error(
                        "lookup.kind is 'command' but lookup.command is empty",
                    ));
                } else if which::which(command).is_err() {
                    warnings.push(ConfigWarning::warning(format!(
                        "lookup.command '{command}' was not found on PATH"
                    )));
                }
                if self.lookup.timeout_seconds == 0 {
                    warnings.push(ConfigWarning::error(
                        "lookup.timeout_seconds is 0; every lookup would time out",
                    ));
                }
            }
            LookupKind::Table => {
                if self.lookup.ids.is_empty() && self.lookup.central_ids.is_empty() {
                    warnings.push(ConfigWarning::warning(
                        "lookup.kind is 'table' but both lookup tables are empty",
                    ));
                }
            }
            LookupKind::Suffix => {}
        }

        if self.planner.kind.needs_reasoner() {
            if self.reasoner.timeout_seconds == 0 {
                warnings.push(ConfigWarning::error(format!(
                    "planner '{}' needs a reasoner but reasoner.timeout_seconds is 0",
                    self.planner.kind
                )));
            }
            match self.reasoner.program() {
                None => warnings.push(ConfigWarning::error(
                    "reasoner.kind is 'command' but reasoner.executable is not set",
                )),
                Some(program) if which::which(program).is_err() => {
                    warnings.push(ConfigWarning::warning(format!(
                        "reasoner executable '{program}' was not found on PATH"
                    )))
                }
                Some(_) => {}
            }
        }

        if self.planner.kind == PlannerKind::React && self.planner.policy == PlanningPolicy::Cascade
        {
            warnings.push(ConfigWarning::warning(
                "the react planner takes one step per pass; planner.policy 'cascade' is ignored",
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.planner.policy, PlanningPolicy::SingleStep);
        assert_eq!(parsed.on_error, ErrorPolicy::Collect);
        assert_eq!(parsed.output.path, "filled_data.json");
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_yaml_overrides_fields() {
        let yaml = "planner:\n  kind: json\n  policy: cascade\non_error: abort\nlookup:\n  kind: table\n  ids:\n    Jane Smith: ACC_1\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.planner.kind, PlannerKind::Json);
        assert_eq!(cfg.planner.policy, PlanningPolicy::Cascade);
        assert_eq!(cfg.on_error, ErrorPolicy::Abort);
        assert_eq!(cfg.lookup.ids.get("Jane Smith").map(String::as_str), Some("ACC_1"));
        assert_eq!(cfg.lookup.id_suffix, "-999");
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = serde_yaml::from_str::<Config>("planner:\n  policy: eager\n").unwrap_err();
        assert!(err.to_string().contains("eager"));
    }

    #[test]
    fn load_missing_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(BackfillError::ConfigNotFound(_))
        ));
        assert_eq!(Config::load_or_default(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.on_error = ErrorPolicy::Skip;
        cfg.output.report = Some("report.json".into());
        cfg.save(dir.path()).unwrap();
        assert!(paths::config_path(dir.path()).exists());
        assert_eq!(Config::load(dir.path()).unwrap(), cfg);
    }

    #[test]
    fn validate_default_is_clean() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_command_lookup() {
        let mut cfg = Config::default();
        cfg.lookup.kind = LookupKind::Command;
        cfg.lookup.timeout_seconds = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("lookup.command is empty")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("timeout_seconds is 0")));

        cfg.lookup.command = "definitely-not-a-real-backfill-binary".into();
        cfg.lookup.timeout_seconds = 5;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(warnings[0].message.contains("not found on PATH"));
    }

    #[test]
    fn validate_empty_tables() {
        let mut cfg = Config::default();
        cfg.lookup.kind = LookupKind::Table;
        assert_eq!(cfg.validate().len(), 1);
        cfg.lookup.ids.insert("Jane Smith".into(), "ACC_1".into());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_reasoning_planner() {
        let mut cfg = Config::default();
        cfg.planner.kind = PlannerKind::React;
        cfg.planner.policy = PlanningPolicy::Cascade;
        cfg.reasoner.kind = ReasonerKind::Command;
        cfg.reasoner.timeout_seconds = 0;
        let messages: Vec<String> = cfg.validate().into_iter().map(|w| w.message).collect();
        assert!(messages.iter().any(|m| m.contains("reasoner.timeout_seconds is 0")));
        assert!(messages.iter().any(|m| m.contains("executable is not set")));
        assert!(messages.iter().any(|m| m.contains("'cascade' is ignored")));
    }

    #[test]
    fn build_command_lookup_without_command_fails() {
        let cfg = LookupConfig {
            kind: LookupKind::Command,
            ..LookupConfig::default()
        };
        assert!(matches!(cfg.build(), Err(BackfillError::InvalidConfig(_))));
    }

    #[test]
    fn build_table_lookup_uses_tables() {
        let mut cfg = LookupConfig {
            kind: LookupKind::Table,
            ..LookupConfig::default()
        };
        cfg.ids.insert("Jane Smith".into(), "ACC_1".into());
        let lookup = cfg.build().unwrap();
        assert_eq!(lookup.resolve_id("Jane Smith").unwrap(), "ACC_1");
        assert!(lookup.resolve_central_id("ACC_1").is_err());
    }
}

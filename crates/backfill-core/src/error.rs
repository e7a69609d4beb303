use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("planning failed: {0}")]
    Planning(String),

    #[error("planner unavailable: {0}")]
    PlannerUnavailable(String),

    #[error("batch aborted at record {index}: {source}")]
    Aborted {
        index: usize,
        #[source]
        source: Box<BackfillError>,
    },

    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown planning policy '{0}': expected single_step or cascade")]
    UnknownPolicy(String),

    #[error("unknown planner '{0}': expected rules, json or react")]
    UnknownPlanner(String),

    #[error("unknown error policy '{0}': expected skip, collect or abort")]
    UnknownErrorPolicy(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BackfillError {
    /// Errors the batch runner routes through the `on_error` policy rather
    /// than propagating immediately.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            BackfillError::InvalidRecord(_)
                | BackfillError::Planning(_)
                | BackfillError::PlannerUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BackfillError>;

pub mod batch;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod exec;
pub mod io;
pub mod lookup;
pub mod paths;
pub mod planner;
pub mod react;
pub mod reasoning;
pub mod record;
pub mod resolver;
pub mod rules;
pub mod types;

pub use error::{BackfillError, Result};

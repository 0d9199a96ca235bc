//! Query execution configuration.

use serde::{Deserialize, Serialize};

/// Configuration for query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Include parameter values in command logs.
    pub log_sensitive_data: bool,
    /// The backend hosts several live readers on one connection, so starting
    /// a query never forces open sibling cursors to buffer.
    pub multiple_active_result_sets: bool,
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable logging of parameter values.
    pub fn log_sensitive_data(mut self, enabled: bool) -> Self {
        self.log_sensitive_data = enabled;
        self
    }

    /// Enable or disable multiple active result sets.
    pub fn multiple_active_result_sets(mut self, enabled: bool) -> Self {
        self.multiple_active_result_sets = enabled;
        self
    }
}

//! Engine configuration.
//!
//! Everything here is read once, when assistants and forms are built. SQL text
//! frozen at that point never changes afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration shared by assistants, filters and forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// SQL expression the store evaluates to "now", used for CreatedAt/ModifiedAt.
    pub now_expression: String,
    /// Rows returned by a filter that does not ask for a limit.
    pub default_max_rows: usize,
    /// Upper bound on the limit a client may ask for. 0 means no bound.
    pub max_rows_limit: usize,
    /// Log every statement at debug level.
    pub log_statements: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            now_expression: "CURRENT_TIMESTAMP".to_string(),
            default_max_rows: 500,
            max_rows_limit: 10_000,
            log_statements: true,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON. Missing keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the current-time expression.
    pub fn now_expression(mut self, expr: impl Into<String>) -> Self {
        self.now_expression = expr.into();
        self
    }

    /// Set the default filter row count.
    pub fn default_max_rows(mut self, rows: usize) -> Self {
        self.default_max_rows = rows;
        self
    }

    /// Set the largest row count a client may request.
    pub fn max_rows_limit(mut self, rows: usize) -> Self {
        self.max_rows_limit = rows;
        self
    }

    /// Enable or disable statement logging.
    pub fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.now_expression.trim().is_empty() {
            return Err(Error::Config("nowExpression must not be empty".to_string()));
        }
        if self.max_rows_limit != 0 && self.default_max_rows > self.max_rows_limit {
            return Err(Error::Config(format!(
                "defaultMaxRows ({}) exceeds maxRowsLimit ({})",
                self.default_max_rows, self.max_rows_limit
            )));
        }
        Ok(())
    }

    /// Row limit for a filter that asked for `requested` rows (0 = default).
    pub fn effective_max_rows(&self, requested: usize) -> usize {
        let rows = if requested == 0 {
            self.default_max_rows
        } else {
            requested
        };
        if self.max_rows_limit == 0 {
            rows
        } else {
            rows.min(self.max_rows_limit)
        }
    }
}

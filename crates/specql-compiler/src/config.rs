//! Compiler configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostic::CompilerError;

/// Configuration for the SpecQL action compiler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Directory containing entity YAML files.
    pub domain_dir: PathBuf,

    /// Directory to write generated SQL.
    pub out_dir: PathBuf,

    /// Composite type every compiled function returns.
    pub result_type: String,

    /// Function invoked by `notify` steps.
    pub notify_function: String,

    /// SQLSTATE raised by validation guards.
    pub error_sqlstate: String,

    /// Maintain `created_by` / `updated_at` / `updated_by` columns.
    pub audit_columns: bool,

    /// Delete steps mark rows instead of removing them.
    pub soft_delete: bool,

    /// Additional functions allowed inside expressions.
    pub extra_functions: Vec<String>,

    /// Accepted notification channels.
    pub channels: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            domain_dir: PathBuf::from("entities"),
            out_dir: PathBuf::from("generated/sql"),
            result_type: "app.mutation_result".to_string(),
            notify_function: "app.emit_notification".to_string(),
            error_sqlstate: "P0001".to_string(),
            audit_columns: true,
            soft_delete: false,
            extra_functions: Vec::new(),
            channels: ["email", "sms", "push", "webhook", "slack", "in_app"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl CompilerConfig {
    /// Loads a `specql.yaml` file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CompilerError::io(path, e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, CompilerError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| CompilerError::Config {
            message: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Rejects values that would be spliced into SQL unquoted.
    fn check(&self) -> Result<(), CompilerError> {
        for (key, value) in [
            ("result_type", &self.result_type),
            ("notify_function", &self.notify_function),
        ] {
            let valid = value
                .split('.')
                .all(crate::codegen::sql_types::is_identifier);
            if !valid {
                return Err(CompilerError::Config {
                    message: format!("{} '{}' is not a qualified identifier", key, value),
                });
            }
        }

        if self.error_sqlstate.len() != 5
            || !self.error_sqlstate.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CompilerError::Config {
                message: format!("error_sqlstate '{}' is not a SQLSTATE code", self.error_sqlstate),
            });
        }

        if let Some(name) = self
            .extra_functions
            .iter()
            .find(|f| !crate::codegen::sql_types::is_identifier(f))
        {
            return Err(CompilerError::Config {
                message: format!("extra function '{}' is not an identifier", name),
            });
        }

        Ok(())
    }

    pub fn is_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }
}

//! YAML frontend.
//!
//! One file per entity:
//!
//! ```yaml
//! entity: Contact
//! schema: crm
//! fields:
//!   email: email
//!   company: ref(Company)
//! actions:
//!   - name: qualify_lead
//!     steps:
//!       - validate: status = 'lead'
//!         error: not_a_lead
//!       - update: Contact SET status = 'qualified'
//! ```

mod entity;
mod steps;
mod value;

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::Frontend;
use crate::diagnostic::CompilerError;
use crate::ir::{DomainIR, EntityDefinition};

/// File names in a domain directory that hold configuration, not entities.
const CONFIG_FILES: &[&str] = &["specql.yaml", "specql.yml"];

/// YAML frontend implementation.
#[derive(Debug, Default)]
pub struct YamlFrontend;

impl YamlFrontend {
    pub fn new() -> Self {
        Self
    }
}

impl Frontend for YamlFrontend {
    fn format(&self) -> &str {
        "yaml"
    }

    fn extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }

    fn parse_directory(&mut self, dir: &Path) -> Result<DomainIR, CompilerError> {
        if !dir.is_dir() {
            return Err(CompilerError::io(dir, "domain directory does not exist"));
        }

        let mut domain = DomainIR::new();
        let mut names = HashSet::new();

        // Sorted so that output does not depend on directory order.
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_domain_file = path
                .extension()
                .is_some_and(|ext| self.extensions().contains(&ext.to_string_lossy().as_ref()));
            let is_config = path
                .file_name()
                .is_some_and(|name| CONFIG_FILES.contains(&name.to_string_lossy().as_ref()));
            if !is_domain_file || is_config {
                continue;
            }

            let definition = parse_file(path)?;
            if !names.insert(definition.entity.name.clone()) {
                return Err(parse_error(
                    path,
                    format!("entity '{}' is defined more than once", definition.entity.name),
                ));
            }
            debug!(
                entity = %definition.entity.name,
                actions = definition.actions.len(),
                path = %path.display(),
                "loaded entity"
            );
            domain.entities.push(definition);
        }

        Ok(domain)
    }
}

/// Parses one entity file.
pub fn parse_file(path: &Path) -> Result<EntityDefinition, CompilerError> {
    let source = std::fs::read_to_string(path).map_err(|e| CompilerError::io(path, e.to_string()))?;
    parse_str(&source, path)
}

/// Parses entity YAML; `path` is only used for error reporting.
pub fn parse_str(source: &str, path: &Path) -> Result<EntityDefinition, CompilerError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(source).map_err(|e| parse_error(path, e.to_string()))?;
    entity::definition(&doc).map_err(|message| parse_error(path, message))
}

fn parse_error(path: &Path, message: impl Into<String>) -> CompilerError {
    CompilerError::Parse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

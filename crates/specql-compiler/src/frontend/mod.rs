//! Frontends turning domain files into IR.
//!
//! A frontend owns all text parsing of entity and action definitions. The
//! validator and code generators only ever see the deserialized IR.

pub mod yaml;

use std::path::Path;

use crate::diagnostic::CompilerError;
use crate::ir::DomainIR;

pub use yaml::YamlFrontend;

/// Trait for domain-file frontends.
pub trait Frontend {
    /// Returns the format name (e.g., "yaml").
    fn format(&self) -> &str;

    /// Returns file extensions this frontend handles (e.g., ["yaml", "yml"]).
    fn extensions(&self) -> &[&str];

    /// Parses all domain files in the given directory and returns IR.
    fn parse_directory(&mut self, dir: &Path) -> Result<DomainIR, CompilerError>;
}

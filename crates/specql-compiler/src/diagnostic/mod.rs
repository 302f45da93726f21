//! Diagnostic types for error reporting.

mod error;
mod location;
mod warning;

pub use error::{CompilerError, ErrorKind};
pub use location::Location;
pub use warning::{Warning, WarningKind};

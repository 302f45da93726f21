//! PL/pgSQL code generation from the action IR.
//!
//! An action compiles to one stored function:
//! - parameters and declarations derived from the entity and step kinds
//! - the Trinity lookup and hydration of referenced fields
//! - one statement block per step
//! - the success response and a symbolic-error exception handler
//!
//! Statements are built as a [`plpgsql::Stmt`] tree and rendered to text last.

pub mod function;
pub mod params;
pub mod plpgsql;
pub mod response;
pub mod sql_types;
pub mod steps;
pub mod trinity;
pub mod types;

pub use function::{CompiledFunction, Declaration, ExceptionHandler, Param};
pub use params::{ActionShape, ParameterGenerator};
pub use response::ResponseGenerator;
pub use steps::{References, StepCompiler};
pub use types::mutation_result_type;

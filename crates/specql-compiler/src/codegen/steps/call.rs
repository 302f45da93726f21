//! `call`: invoke another stored function with named arguments.

use super::{required, References, StepCompiler};
use crate::codegen::plpgsql::Stmt;
use crate::codegen::sql_types::is_identifier;
use crate::diagnostic::{CompilerError, Location};
use crate::expression::Scope;
use crate::ir::CallStep;

pub(super) fn compile(
    compiler: &StepCompiler<'_>,
    step: &CallStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let name = required(&step.function_name, location, "call", "a function_name")?;
    let function = qualify(name, &compiler.entity.schema)
        .ok_or_else(|| CompilerError::invalid(location, "function_name", format!("'{}' is not a function name", name)))?;

    let mut args = Vec::with_capacity(step.arguments.len());
    for (arg, value) in &step.arguments {
        if !is_identifier(arg) {
            return Err(CompilerError::invalid(
                location,
                "arguments",
                format!("'{}' is not an argument name", arg),
            ));
        }
        let compiled = compiler.value(value, location, scope, refs)?;
        args.push(format!("{} => {}", arg, compiled.sql));
    }

    Ok(vec![Stmt::sql(format!("PERFORM {}({});", function, args.join(", ")))])
}

/// `fn` → `<schema>.fn`; `other.fn` stays as is.
fn qualify(name: &str, schema: &str) -> Option<String> {
    match name.split_once('.') {
        Some((s, f)) if is_identifier(s) && is_identifier(f) => Some(name.to_string()),
        None if is_identifier(name) => Some(format!("{}.{}", schema, name)),
        _ => None,
    }
}

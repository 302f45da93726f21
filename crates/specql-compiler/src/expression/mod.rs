//! Expression compiler.
//!
//! Compiles the restricted expression language used in `validate`, `if`,
//! `where_clause` and step values into a PL/pgSQL fragment:
//!
//! ```text
//! text ──▶ Lexer ──▶ security scan ──▶ Parser (allow-list) ──▶ Renderer ──▶ SQL
//! ```
//!
//! The compiler is pure: the same input always yields the same output.

mod ast;
mod error;
mod lexer;
mod parser;
mod render;
mod security;

use std::collections::BTreeSet;

pub use error::{ExpressionError, ExpressionResult};
pub use parser::MAX_DEPTH;
pub use security::DEFAULT_FUNCTIONS;

use crate::codegen::sql_types::{is_identifier, sql_literal};
use crate::config::CompilerConfig;
use crate::ir::Entity;

/// A compiled expression and the names it referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    pub sql: String,
    /// Entity fields referenced as variables, in first-use order.
    pub fields: Vec<String>,
    /// Entity fields referenced through `input.<field>`.
    pub inputs: Vec<String>,
}

/// How bare field names resolve.
#[derive(Debug, Clone, Copy)]
pub enum Resolve<'a> {
    /// `email` → `v_email` on the action's own entity.
    Variables,
    /// `email` → `email` as a column of the given (target) entity.
    Columns(&'a Entity),
}

/// Names visible to an expression besides the entity's fields.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    pub resolve: Resolve<'a>,
    loop_vars: Vec<String>,
}

impl Default for Scope<'_> {
    fn default() -> Self {
        Self {
            resolve: Resolve::Variables,
            loop_vars: Vec::new(),
        }
    }
}

impl<'a> Scope<'a> {
    /// The same loop variables, resolving bare names as columns of `target`.
    pub fn columns_of<'b>(&self, target: &'b Entity) -> Scope<'b> {
        Scope {
            resolve: Resolve::Columns(target),
            loop_vars: self.loop_vars.clone(),
        }
    }

    pub fn with_loop_var(&self, name: &str) -> Scope<'a> {
        let mut loop_vars = self.loop_vars.clone();
        loop_vars.push(name.to_string());
        Scope {
            resolve: self.resolve,
            loop_vars,
        }
    }

    pub fn is_loop_var(&self, name: &str) -> bool {
        self.loop_vars.iter().any(|v| v == name)
    }
}

/// Compiles expressions against an entity.
#[derive(Debug, Clone)]
pub struct ExpressionCompiler {
    functions: BTreeSet<String>,
}

impl Default for ExpressionCompiler {
    fn default() -> Self {
        Self::new(&CompilerConfig::default())
    }
}

impl ExpressionCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        let functions = DEFAULT_FUNCTIONS
            .iter()
            .map(|f| f.to_string())
            .chain(config.extra_functions.iter().map(|f| f.to_ascii_uppercase()))
            .collect();
        Self { functions }
    }

    /// Compiles `expression` with bare names resolving to the entity's variables.
    pub fn compile(&self, expression: &str, entity: &Entity) -> ExpressionResult<CompiledExpression> {
        self.compile_in_scope(expression, entity, &Scope::default())
    }

    pub fn compile_in_scope(
        &self,
        expression: &str,
        entity: &Entity,
        scope: &Scope<'_>,
    ) -> ExpressionResult<CompiledExpression> {
        let tokens = lexer::Lexer::new(expression).tokenize()?;
        security::scan_tokens(&tokens)?;
        let expr = parser::Parser::new(expression, tokens, &self.functions).parse()?;

        let mut renderer = render::Renderer::new(entity, scope);
        let sql = renderer.render(&expr)?;
        Ok(CompiledExpression {
            sql,
            fields: renderer.fields,
            inputs: renderer.inputs,
        })
    }

    /// Checks a raw `SELECT` used as a loop source.
    ///
    /// Returns the query without enclosing parentheses. The same injection
    /// rules as for sub-queries apply.
    pub fn compile_query(&self, text: &str) -> ExpressionResult<String> {
        let mut query = text.trim();
        loop {
            let tokens = lexer::Lexer::new(query).tokenize()?;
            security::scan_tokens(&tokens)?;
            if wrapped_in_parens(&tokens) {
                query = query[1..query.len() - 1].trim();
                continue;
            }
            if tokens.first().map(|t| &t.kind) != Some(&lexer::TokenKind::Select) {
                return Err(ExpressionError::syntax("expected a SELECT query", 0));
            }
            security::scan_subquery(&tokens, &self.functions)?;
            return Ok(query.to_string());
        }
    }

    /// Compiles a step value: a single bare word that resolves to nothing is
    /// taken as a text literal (`qualified` → `'qualified'`).
    pub fn compile_value(
        &self,
        value: &str,
        entity: &Entity,
        scope: &Scope<'_>,
    ) -> ExpressionResult<CompiledExpression> {
        let trimmed = value.trim();
        match self.compile_in_scope(trimmed, entity, scope) {
            Err(ExpressionError::UnknownField { .. }) if is_identifier(trimmed) => {
                Ok(CompiledExpression {
                    sql: sql_literal(trimmed),
                    fields: Vec::new(),
                    inputs: Vec::new(),
                })
            }
            other => other,
        }
    }
}

/// Whether the first `(` closes at the last token.
fn wrapped_in_parens(tokens: &[lexer::Token]) -> bool {
    if tokens.first().map(|t| &t.kind) != Some(&lexer::TokenKind::LParen) {
        return false;
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            lexer::TokenKind::LParen => depth += 1,
            lexer::TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    // Only the trailing Eof may follow.
                    return i + 2 == tokens.len();
                }
            }
            _ => {}
        }
    }
    false
}

//! Step compilers.
//!
//! [`StepCompiler::compile_action`] dispatches on the closed [`Step`] enum.
//! `if` and `foreach` open a block whose nested steps compile with a derived
//! [`Scope`]; blocks are tracked on a work stack, not by recursion.

mod call;
mod conditional;
mod foreach;
mod notify;
mod refresh;
mod validate;
mod write;

use tracing::trace;

pub use refresh::refresh_own;

use super::params::ActionShape;
use super::plpgsql::Stmt;
use crate::config::CompilerConfig;
use crate::diagnostic::{CompilerError, Location};
use crate::expression::{CompiledExpression, ExpressionCompiler, Scope};
use crate::ir::{Entity, Step, StepPath};

/// Names collected while compiling steps, used for declarations and hydration.
#[derive(Debug, Default)]
pub struct References {
    /// Entity fields read as `v_` variables, in first-use order.
    pub fields: Vec<String>,
}

impl References {
    fn record(&mut self, compiled: &CompiledExpression) {
        for field in &compiled.fields {
            self.record_field(field);
        }
    }

    fn record_field(&mut self, field: &str) {
        if !self.fields.iter().any(|f| f == field) {
            self.fields.push(field.to_string());
        }
    }
}

/// Compiles the steps of one action.
pub struct StepCompiler<'a> {
    pub(crate) entity: &'a Entity,
    pub(crate) known: &'a [Entity],
    pub(crate) config: &'a CompilerConfig,
    pub(crate) expressions: &'a ExpressionCompiler,
    pub(crate) shape: &'a ActionShape,
    location: Location,
}

impl<'a> StepCompiler<'a> {
    pub fn new(
        entity: &'a Entity,
        known: &'a [Entity],
        config: &'a CompilerConfig,
        expressions: &'a ExpressionCompiler,
        shape: &'a ActionShape,
        location: Location,
    ) -> Self {
        Self {
            entity,
            known,
            config,
            expressions,
            shape,
            location,
        }
    }

    /// Compiles the action's top-level steps, each headed by a kind comment.
    pub fn compile_action(
        &self,
        steps: &[Step],
        refs: &mut References,
    ) -> Result<Vec<Stmt>, CompilerError> {
        let mut out = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                out.push(Stmt::Blank);
            }
            out.push(Stmt::comment(step.kind()));
            out.extend(self.compile_tree(step, StepPath::root(i), refs)?);
        }
        Ok(out)
    }

    /// Compiles one step and everything nested below it.
    ///
    /// Open blocks live on an explicit stack, so nesting depth is bounded by
    /// memory rather than the call stack.
    fn compile_tree(
        &self,
        root: &Step,
        path: StepPath,
        refs: &mut References,
    ) -> Result<Vec<Stmt>, CompilerError> {
        let mut stack = match self.enter(root, path, &Scope::default(), refs)? {
            Entered::Leaf(stmts) => return Ok(stmts),
            Entered::Block(frame) => vec![frame],
        };

        let mut out = Vec::new();
        while let Some(mut frame) = stack.pop() {
            let steps = frame.steps;
            if let Some(step) = steps.get(frame.next) {
                let path = frame.path_of(frame.next);
                frame.next += 1;
                match self.enter(step, path, &frame.scope, refs)? {
                    Entered::Leaf(stmts) => {
                        frame.out.extend(stmts);
                        stack.push(frame);
                    }
                    Entered::Block(inner) => {
                        stack.push(frame);
                        stack.push(inner);
                    }
                }
                continue;
            }

            let stmt = match frame.close {
                Close::Then {
                    condition,
                    else_steps,
                } => {
                    let close = Close::Else {
                        condition,
                        then_block: frame.out,
                    };
                    stack.push(Frame::new(else_steps, frame.owner, frame.scope, close));
                    continue;
                }
                Close::Else {
                    condition,
                    then_block,
                } => Stmt::If {
                    condition,
                    then_block,
                    else_block: frame.out,
                },
                Close::Loop { var, query } => Stmt::ForQuery {
                    var,
                    query,
                    body: frame.out,
                },
            };
            match stack.last_mut() {
                Some(parent) => parent.out.push(stmt),
                None => out.push(stmt),
            }
        }
        Ok(out)
    }

    /// Compiles a leaf step, or checks a block step's header and opens it.
    fn enter<'s>(
        &self,
        step: &'s Step,
        path: StepPath,
        scope: &Scope<'a>,
        refs: &mut References,
    ) -> Result<Entered<'s, 'a>, CompilerError> {
        trace!(step = step.kind(), path = %path, "compiling step");
        let location = self.location.at(path.clone());

        let leaf = match step {
            Step::Validate(s) => validate::compile(self, s, &location, scope, refs),
            Step::Insert(s) => write::compile_insert(self, s, &location, scope, refs),
            Step::Update(s) => write::compile_update(self, s, &location, scope, refs),
            Step::Delete(s) => write::compile_delete(self, s, &location, scope, refs),
            Step::Call(s) => call::compile(self, s, &location, scope, refs),
            Step::Notify(s) => notify::compile(self, s, &location, scope, refs),
            Step::RefreshTableView(s) => refresh::compile(self, s, &location, refs),
            Step::If(s) => {
                let condition = conditional::open(self, s, &location, scope, refs)?;
                let close = Close::Then {
                    condition,
                    else_steps: &s.else_steps[..],
                };
                return Ok(Entered::Block(Frame::new(&s.then_steps, path, scope.clone(), close)));
            }
            Step::Foreach(s) => {
                let (var, query) = foreach::open(self, s, &location)?;
                let inner = scope.with_loop_var(&var);
                let close = Close::Loop { var, query };
                return Ok(Entered::Block(Frame::new(&s.then_steps, path, inner, close)));
            }
            Step::Unrecognized { kind } => Err(CompilerError::UnknownStepKind {
                location,
                kind: kind.clone(),
            }),
        };
        leaf.map(Entered::Leaf)
    }

    /// Compiles a boolean expression in `scope`.
    pub(crate) fn condition(
        &self,
        expression: &str,
        location: &Location,
        scope: &Scope<'_>,
        refs: &mut References,
    ) -> Result<String, CompilerError> {
        let compiled = self
            .expressions
            .compile_in_scope(expression, self.entity, scope)
            .map_err(|e| CompilerError::from_expression(e, location))?;
        refs.record(&compiled);
        Ok(compiled.sql)
    }

    /// Compiles a step value (literal fallback for bare words).
    pub(crate) fn value(
        &self,
        value: &str,
        location: &Location,
        scope: &Scope<'_>,
        refs: &mut References,
    ) -> Result<CompiledExpression, CompilerError> {
        let compiled = self
            .expressions
            .compile_value(value, self.entity, scope)
            .map_err(|e| CompilerError::from_expression(e, location))?;
        refs.record(&compiled);
        Ok(compiled)
    }

    /// Resolves a step's target entity by name.
    pub(crate) fn target(
        &self,
        name: Option<&str>,
        location: &Location,
    ) -> Result<&'a Entity, CompilerError> {
        let name = match name {
            None => return Ok(self.entity),
            Some(name) if name == self.entity.name => return Ok(self.entity),
            Some(name) => name,
        };
        self.known
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CompilerError::UnknownEntity {
                location: location.clone(),
                entity: name.to_string(),
            })
    }

    pub(crate) fn is_own(&self, target: &Entity) -> bool {
        target.name == self.entity.name
    }
}

enum Entered<'s, 'a> {
    Leaf(Vec<Stmt>),
    Block(Frame<'s, 'a>),
}

/// A block whose nested steps are still being compiled.
struct Frame<'s, 'a> {
    steps: &'s [Step],
    next: usize,
    /// Path of the `if` or `foreach` step that opened the block.
    owner: StepPath,
    scope: Scope<'a>,
    out: Vec<Stmt>,
    close: Close<'s>,
}

impl<'s, 'a> Frame<'s, 'a> {
    fn new(steps: &'s [Step], owner: StepPath, scope: Scope<'a>, close: Close<'s>) -> Self {
        Self {
            steps,
            next: 0,
            owner,
            scope,
            out: Vec::new(),
            close,
        }
    }

    fn path_of(&self, index: usize) -> StepPath {
        match self.close {
            Close::Else { .. } => self.owner.else_step(index),
            _ => self.owner.then_step(index),
        }
    }
}

/// What a finished block becomes.
enum Close<'s> {
    /// Then branch done; the else branch follows.
    Then {
        condition: String,
        else_steps: &'s [Step],
    },
    Else {
        condition: String,
        then_block: Vec<Stmt>,
    },
    Loop {
        var: String,
        query: String,
    },
}

/// A required string attribute, treating blank values as absent.
pub(crate) fn required<'s>(
    value: &'s Option<String>,
    location: &Location,
    step_kind: &str,
    attribute: &str,
) -> Result<&'s str, CompilerError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CompilerError::missing(location, step_kind, attribute))
}

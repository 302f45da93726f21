//! Renders a parsed expression to PL/pgSQL, resolving names on the way.

use super::ast::{Expr, UnaryOp};
use super::error::{ExpressionError, ExpressionResult};
use super::{Resolve, Scope};
use crate::codegen::sql_types::sql_literal;
use crate::ir::Entity;

/// Names usable in any expression without resolution.
const BUILTINS: &[&str] = &["v_pk", "v_created_pk", "p_caller_id"];
const SQL_VALUES: &[&str] = &["CURRENT_DATE", "CURRENT_TIMESTAMP", "CURRENT_TIME", "NOW"];

pub struct Renderer<'a> {
    entity: &'a Entity,
    scope: &'a Scope<'a>,
    pub fields: Vec<String>,
    pub inputs: Vec<String>,
}

impl<'a> Renderer<'a> {
    pub fn new(entity: &'a Entity, scope: &'a Scope<'a>) -> Self {
        Self {
            entity,
            scope,
            fields: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn render(&mut self, expr: &Expr) -> ExpressionResult<String> {
        let sql = match expr {
            Expr::Ident(path) => self.resolve(path)?,
            Expr::Number(n) => n.clone(),
            Expr::Str(s) => sql_literal(s),
            Expr::Bool(true) => "TRUE".to_string(),
            Expr::Bool(false) => "FALSE".to_string(),
            Expr::Null => "NULL".to_string(),
            Expr::Unary { op: UnaryOp::Not, expr } => format!("NOT {}", self.render(expr)?),
            Expr::Unary { op: UnaryOp::Neg, expr } => {
                let inner = self.render(expr)?;
                // "--" would open a line comment.
                if inner.starts_with('-') {
                    format!("-({})", inner)
                } else {
                    format!("-{}", inner)
                }
            }
            Expr::Binary { op, left, right } => format!(
                "{} {} {}",
                self.render(left)?,
                op.as_sql(),
                self.render(right)?
            ),
            Expr::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                self.render(expr)?,
                if *negated { "NOT " } else { "" }
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let left = self.render(expr)?;
                let items = self.render_list(list)?;
                format!("{} {}IN ({})", left, not(*negated), items)
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => format!("{} {}IN ({})", self.render(expr)?, not(*negated), query),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => format!(
                "{} {}BETWEEN {} AND {}",
                self.render(expr)?,
                not(*negated),
                self.render(low)?,
                self.render(high)?
            ),
            Expr::Exists(query) => format!("EXISTS ({})", query),
            Expr::Subquery(query) => format!("({})", query),
            Expr::Call { name, args } => format!("{}({})", name, self.render_list(args)?),
            Expr::Extract { field, source } => {
                format!("EXTRACT({} FROM {})", field, self.render(source)?)
            }
            Expr::Position { needle, haystack } => format!(
                "POSITION({} IN {})",
                self.render(needle)?,
                self.render(haystack)?
            ),
            Expr::Substring {
                source,
                from,
                count,
            } => {
                let mut sql = format!(
                    "SUBSTRING({} FROM {}",
                    self.render(source)?,
                    self.render(from)?
                );
                if let Some(count) = count {
                    sql.push_str(&format!(" FOR {}", self.render(count)?));
                }
                sql.push(')');
                sql
            }
            Expr::Cast { expr, type_name } => format!("{}::{}", self.render(expr)?, type_name),
            Expr::Group(inner) => format!("({})", self.render(inner)?),
            Expr::EmptyGroup => "()".to_string(),
        };
        Ok(sql)
    }

    fn render_list(&mut self, items: &[Expr]) -> ExpressionResult<String> {
        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            rendered.push(self.render(item)?);
        }
        Ok(rendered.join(", "))
    }

    fn resolve(&mut self, path: &[String]) -> ExpressionResult<String> {
        match path {
            [name] => self.resolve_name(name),
            [head, ..] if self.scope.is_loop_var(head) => Ok(path.join(".")),
            [head, field] if head.eq_ignore_ascii_case("input") => self.resolve_input(field),
            [head, ..] if head.eq_ignore_ascii_case("input") => Err(ExpressionError::NotImplemented {
                feature: format!("nested input path '{}'", path.join(".")),
            }),
            _ => Err(self.unknown(&path.join("."))),
        }
    }

    fn resolve_name(&mut self, name: &str) -> ExpressionResult<String> {
        if self.scope.is_loop_var(name) {
            return Ok(name.to_string());
        }
        if BUILTINS.contains(&name) {
            return Ok(name.to_string());
        }
        if let Some(value) = SQL_VALUES.iter().find(|v| v.eq_ignore_ascii_case(name)) {
            return Ok(value.to_string());
        }

        match self.scope.resolve {
            Resolve::Variables => {
                let field = self
                    .entity
                    .field(name)
                    .filter(|f| !f.is_reverse_relation())
                    .ok_or_else(|| self.unknown(name))?;
                if !self.fields.contains(&field.name) {
                    self.fields.push(field.name.clone());
                }
                Ok(field.variable())
            }
            Resolve::Columns(target) => {
                if name == "id" || name == target.pk_column() {
                    return Ok(name.to_string());
                }
                target
                    .field(name)
                    .filter(|f| !f.is_reverse_relation())
                    .map(|f| f.column())
                    .ok_or_else(|| ExpressionError::UnknownField {
                        entity: target.name.clone(),
                        field: name.to_string(),
                    })
            }
        }
    }

    fn resolve_input(&mut self, name: &str) -> ExpressionResult<String> {
        let field = self
            .entity
            .field(name)
            .filter(|f| !f.is_reverse_relation())
            .ok_or_else(|| self.unknown(&format!("input.{}", name)))?;
        if !self.inputs.contains(&field.name) {
            self.inputs.push(field.name.clone());
        }
        Ok(field.param())
    }

    fn unknown(&self, field: &str) -> ExpressionError {
        ExpressionError::UnknownField {
            entity: self.entity.name.clone(),
            field: field.to_string(),
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

//! Compiled stored-function model and its text form.

use super::plpgsql::{self, Stmt};

/// A formal parameter of the generated function.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub sql_type: String,
    /// `None` for required parameters.
    pub default: Option<String>,
}

impl Param {
    pub fn required(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            default: Some("NULL".to_string()),
        }
    }

    fn render(&self) -> String {
        match &self.default {
            Some(default) => format!("{} {} DEFAULT {}", self.name, self.sql_type, default),
            None => format!("{} {}", self.name, self.sql_type),
        }
    }
}

/// A local variable of the generated function.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub sql_type: String,
}

impl Declaration {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// `EXCEPTION WHEN SQLSTATE '<code>' THEN ...`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub sqlstate: String,
    pub body: Vec<Stmt>,
}

/// The compiler's output for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    /// Schema-qualified name, e.g. `crm.qualify_lead`.
    pub name: String,
    pub signature: Vec<Param>,
    pub declarations: Vec<Declaration>,
    pub body: Vec<Stmt>,
    pub exception_handler: Option<ExceptionHandler>,
    pub return_type: String,
    /// Comment lines emitted above the definition.
    pub header: Vec<String>,
}

impl CompiledFunction {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.signature.iter().find(|p| p.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declarations.iter().any(|d| d.name == name)
    }

    /// Renders the full `CREATE OR REPLACE FUNCTION` statement.
    pub fn render(&self) -> String {
        let body = plpgsql::render(&self.body, 1);
        let handler = self.exception_handler.as_ref().map(|h| {
            format!(
                "EXCEPTION\n    WHEN SQLSTATE '{}' THEN\n{}",
                h.sqlstate,
                plpgsql::render(&h.body, 2)
            )
        });
        let quote = dollar_quote(&[body.as_str(), handler.as_deref().unwrap_or("")]);

        let mut out = String::new();
        for line in &self.header {
            out.push_str(&format!("-- {}\n", line));
        }

        out.push_str(&format!("CREATE OR REPLACE FUNCTION {}(", self.name));
        if self.signature.is_empty() {
            out.push_str(")\n");
        } else {
            let params: Vec<String> = self
                .signature
                .iter()
                .map(|p| format!("    {}", p.render()))
                .collect();
            out.push('\n');
            out.push_str(&params.join(",\n"));
            out.push_str("\n)\n");
        }

        out.push_str(&format!("RETURNS {}\n", self.return_type));
        out.push_str("LANGUAGE plpgsql\n");
        out.push_str(&format!("AS {}\n", quote));

        if !self.declarations.is_empty() {
            out.push_str("DECLARE\n");
            for decl in &self.declarations {
                out.push_str(&format!("    {} {};\n", decl.name, decl.sql_type));
            }
        }

        out.push_str("BEGIN\n");
        out.push_str(&body);
        if let Some(handler) = handler {
            out.push_str(&handler);
        }
        out.push_str("END;\n");
        out.push_str(&format!("{};\n", quote));
        out
    }
}

/// Picks a dollar-quote tag that does not occur in the body.
fn dollar_quote(parts: &[&str]) -> String {
    let mut tag = "$$".to_string();
    let mut n = 0;
    while parts.iter().any(|p| p.contains(&tag)) {
        n += 1;
        tag = format!("$fn{}$", n);
    }
    tag
}

//! PL/pgSQL statement tree.
//!
//! Step compilers build [`Stmt`] trees; text is produced only by [`render`],
//! which owns indentation and closing keywords. Rendering uses an explicit
//! work stack, so nesting depth is bounded by memory rather than the call stack.

const INDENT: &str = "    ";

/// One statement (or structured block) of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A complete statement; embedded newlines are indented as a unit.
    Sql(String),
    /// `-- text`
    Comment(String),
    Blank,
    If {
        condition: String,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    /// `FOR var IN query LOOP ... END LOOP;`
    ForQuery {
        var: String,
        query: String,
        body: Vec<Stmt>,
    },
    /// Re-read of the action's row after it was updated, naming the written
    /// fields. Replaced by [`crate::codegen::trinity::fill_reloads`] once
    /// every referenced field is known; renders as nothing.
    ReloadRow(Vec<String>),
}

impl Stmt {
    pub fn sql(text: impl Into<String>) -> Self {
        Stmt::Sql(text.into())
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Stmt::Comment(text.into())
    }

    /// `v_x := value;`
    pub fn assign(target: &str, value: &str) -> Self {
        Stmt::Sql(format!("{} := {};", target, value))
    }

    /// `RAISE EXCEPTION USING MESSAGE = 'code', ERRCODE = 'sqlstate';`
    pub fn raise(code: &str, sqlstate: &str) -> Self {
        Stmt::Sql(format!(
            "RAISE EXCEPTION USING MESSAGE = {}, ERRCODE = '{}';",
            crate::codegen::sql_types::sql_literal(code),
            sqlstate
        ))
    }

    /// Deepest block nesting below this statement (a plain statement is 0).
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((stmt, level)) = stack.pop() {
            max = max.max(level);
            match stmt {
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    stack.extend(then_block.iter().chain(else_block).map(|s| (s, level + 1)));
                }
                Stmt::ForQuery { body, .. } => {
                    stack.extend(body.iter().map(|s| (s, level + 1)));
                }
                _ => {}
            }
        }
        max
    }
}

enum Work<'a> {
    Stmt(&'a Stmt, usize),
    Line(String, usize),
}

/// Renders statements at the given indentation level.
pub fn render(stmts: &[Stmt], level: usize) -> String {
    let mut out = String::new();
    let mut stack: Vec<Work<'_>> = stmts.iter().rev().map(|s| Work::Stmt(s, level)).collect();

    while let Some(work) = stack.pop() {
        match work {
            Work::Line(text, level) => push_line(&mut out, &text, level),
            Work::Stmt(stmt, level) => match stmt {
                Stmt::Sql(text) => {
                    for line in text.lines() {
                        push_line(&mut out, line, level);
                    }
                }
                Stmt::Comment(text) => push_line(&mut out, &format!("-- {}", text), level),
                Stmt::Blank => out.push('\n'),
                Stmt::ReloadRow(_) => {}
                Stmt::If {
                    condition,
                    then_block,
                    else_block,
                } => {
                    push_line(&mut out, &format!("IF {} THEN", condition), level);
                    stack.push(Work::Line("END IF;".to_string(), level));
                    if !else_block.is_empty() {
                        stack.extend(else_block.iter().rev().map(|s| Work::Stmt(s, level + 1)));
                        stack.push(Work::Line("ELSE".to_string(), level));
                    }
                    stack.extend(then_block.iter().rev().map(|s| Work::Stmt(s, level + 1)));
                }
                Stmt::ForQuery { var, query, body } => {
                    push_line(&mut out, &format!("FOR {} IN {} LOOP", var, query), level);
                    stack.push(Work::Line("END LOOP;".to_string(), level));
                    stack.extend(body.iter().rev().map(|s| Work::Stmt(s, level + 1)));
                }
            },
        }
    }

    out
}

fn push_line(out: &mut String, line: &str, level: usize) {
    if !line.is_empty() {
        for _ in 0..level {
            out.push_str(INDENT);
        }
        out.push_str(line);
    }
    out.push('\n');
}

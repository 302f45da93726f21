//! `notify`: hand a message to the notification function.

use super::{required, References, StepCompiler};
use crate::codegen::plpgsql::Stmt;
use crate::codegen::sql_types::sql_literal;
use crate::diagnostic::{CompilerError, Location};
use crate::expression::Scope;
use crate::ir::NotifyStep;

pub(super) fn compile(
    compiler: &StepCompiler<'_>,
    step: &NotifyStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let recipient = required(&step.recipient, location, "notify", "a recipient")?;
    let channel = required(&step.channel, location, "notify", "a channel")?;
    if !compiler.config.is_channel(channel) {
        return Err(CompilerError::InvalidChannel {
            location: location.clone(),
            channel: channel.to_string(),
            allowed: compiler.config.channels.clone(),
        });
    }

    let recipient = compiler.value(recipient, location, scope, refs)?;
    // Messages are prose, never expressions.
    let message = step
        .message
        .as_deref()
        .map(sql_literal)
        .unwrap_or_else(|| "NULL".to_string());
    let object_id = compiler.shape.key_variable().unwrap_or("NULL");

    Ok(vec![Stmt::sql(format!(
        "PERFORM {}(\n    p_recipient => {},\n    p_channel => {},\n    p_message => {},\n    p_object_id => {}\n);",
        compiler.config.notify_function,
        recipient.sql,
        sql_literal(channel),
        message,
        object_id
    ))])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::compile;
    use crate::diagnostic::{CompilerError, ErrorKind};
    use crate::ir::{NotifyStep, Step};

    fn notify(recipient: Option<&str>, channel: Option<&str>, message: Option<&str>) -> Step {
        Step::Notify(NotifyStep {
            recipient: recipient.map(str::to_string),
            channel: channel.map(str::to_string),
            message: message.map(str::to_string),
        })
    }

    #[test]
    fn test_notify_call() {
        let sql = compile(vec![
            Step::update("Contact", &[("status", "qualified")]),
            notify(Some("email"), Some("email"), Some("You're qualified!")),
        ])
        .unwrap();
        assert!(sql.contains("PERFORM app.emit_notification("));
        assert!(sql.contains("p_recipient => v_email,"));
        assert!(sql.contains("p_channel => 'email',"));
        assert!(sql.contains("p_message => 'You''re qualified!',"));
        assert!(sql.contains("p_object_id => v_pk"));
    }

    #[test]
    fn test_literal_recipient_without_key() {
        let sql = compile(vec![notify(Some("sales_team"), Some("slack"), None)]).unwrap();
        assert!(sql.contains("p_recipient => 'sales_team',"));
        assert!(sql.contains("p_message => NULL,"));
        assert!(sql.contains("p_object_id => NULL"));
    }

    #[test]
    fn test_required_attributes() {
        let err = compile(vec![notify(None, Some("email"), None)]).unwrap_err();
        assert!(err.to_string().contains("must have a recipient"));

        let err = compile(vec![notify(Some("owner"), None, None)]).unwrap_err();
        assert!(err.to_string().contains("must have a channel"));
    }

    #[test]
    fn test_invalid_channel() {
        let err = compile(vec![notify(Some("owner"), Some("fax"), None)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidChannel);
        assert!(matches!(err, CompilerError::InvalidChannel { ref allowed, .. } if allowed.contains(&"email".to_string())));
    }
}

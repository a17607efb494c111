//! Stored procedure command

use crate::service::db::core::types::{DbParameter, DbValue, IsolationLevel};
use std::time::Duration;

/// A stored-procedure invocation prepared on an open connection.
#[derive(Debug, Clone)]
pub struct DbCommand {
    text: String,
    parameters: Vec<DbParameter>,
    timeout: Duration,
    transaction: Option<IsolationLevel>,
    outputs: Vec<(String, DbValue)>,
}

impl DbCommand {
    pub(crate) fn new(timeout: Duration, transaction: Option<IsolationLevel>) -> Self {
        Self {
            text: String::new(),
            parameters: Vec::new(),
            timeout,
            transaction,
            outputs: Vec::new(),
        }
    }

    /// Procedure name
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Isolation level of the transaction the command runs in, if any.
    pub fn transaction(&self) -> Option<IsolationLevel> {
        self.transaction
    }

    pub fn output_value(&self, name: &str) -> Option<&DbValue> {
        self.outputs
            .iter()
            .find(|(param, _)| same_parameter(param, name))
            .map(|(_, value)| value)
    }

    pub(crate) fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    pub(crate) fn push_parameter(&mut self, parameter: DbParameter) {
        self.parameters.push(parameter);
    }

    pub(crate) fn clear(&mut self) {
        self.parameters.clear();
        self.outputs.clear();
        self.text.clear();
    }

    pub(crate) fn set_transaction(&mut self, transaction: Option<IsolationLevel>) {
        self.transaction = transaction;
    }

    pub(crate) fn set_outputs(&mut self, outputs: Vec<(String, DbValue)>) {
        self.outputs = outputs;
    }
}

/// Parameter names compare without the `@` prefix.
fn same_parameter(a: &str, b: &str) -> bool {
    a.trim_start_matches('@') == b.trim_start_matches('@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::db::core::types::DbType;

    #[test]
    fn clear_resets_text_and_parameters() {
        let mut command = DbCommand::new(Duration::from_secs(30), None);
        command.set_text("GetDataFromDatabase");
        command.push_parameter(DbParameter::input("@sTableName", "Orders", DbType::VarChar));
        command.set_outputs(vec![("@nTotal".into(), DbValue::Int(3))]);

        assert_eq!(command.output_value("nTotal"), Some(&DbValue::Int(3)));

        command.clear();
        assert!(command.text().is_empty());
        assert!(command.parameters().is_empty());
        assert!(command.output_value("@nTotal").is_none());
    }
}

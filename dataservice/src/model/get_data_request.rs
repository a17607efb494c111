//! Row retrieval request model
//!
//! Input limits are checked here, before any connection is opened.

use crate::tool::error::AppError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_]*$").expect("valid name pattern");
    static ref ORDER_BY_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_, ]*$").expect("valid order-by pattern");
    static ref FILTER_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_=!><\s]*$").expect("valid filter pattern");
}

/// Row retrieval request as received from the boundary layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDataRequest {
    pub table_name: String,
    pub column_list: Vec<String>,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub order_by: String,
    #[serde(default)]
    pub data_table_name: Option<String>,
}

impl GetDataRequest {
    pub fn new(table_name: &str, column_list: &[&str], filter: &str, order_by: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            column_list: column_list.iter().map(|c| c.to_string()).collect(),
            filter: filter.to_string(),
            order_by: order_by.to_string(),
            data_table_name: None,
        }
    }

    pub fn with_data_table_name(mut self, name: &str) -> Self {
        self.data_table_name = Some(name.to_string());
        self
    }

    /// Syntactic checks applied before the request reaches the data service.
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.table_name.is_empty() {
            return Err(AppError::InvalidInput("Table name must be supplied.".to_string()));
        }
        if !NAME_PATTERN.is_match(&self.table_name) {
            return Err(AppError::InvalidInput(
                "Table name contains invalid characters".to_string(),
            ));
        }

        if self.column_list.is_empty() {
            return Err(AppError::InvalidInput("Column list must be supplied.".to_string()));
        }
        if self.column_list.iter().any(|c| !NAME_PATTERN.is_match(c)) {
            return Err(AppError::InvalidInput(
                "Column name contains invalid characters".to_string(),
            ));
        }

        if !ORDER_BY_PATTERN.is_match(&self.order_by) {
            return Err(AppError::InvalidInput(
                "Order by contains invalid characters".to_string(),
            ));
        }

        if !FILTER_PATTERN.is_match(&self.filter) {
            return Err(AppError::InvalidInput(
                "Filter criteria contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(request: &GetDataRequest) -> String {
        request.validate().unwrap_err().to_string()
    }

    #[test]
    fn deserializes_boundary_field_names() {
        let body = r#"{
            "TableName": "Orders",
            "ColumnList": ["Id", "Name"],
            "Filter": "Id>5",
            "OrderBy": "Name"
        }"#;

        let request: GetDataRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request, GetDataRequest::new("Orders", &["Id", "Name"], "Id>5", "Name"));
        assert!(request.data_table_name.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn missing_filter_and_order_by_default_to_empty() {
        let body = r#"{ "TableName": "Orders", "ColumnList": ["Id"], "DataTableName": "Foo" }"#;

        let request: GetDataRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.filter, "");
        assert_eq!(request.order_by, "");
        assert_eq!(request.data_table_name.as_deref(), Some("Foo"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        let request = GetDataRequest::new("", &["Id"], "", "");
        assert_eq!(message(&request), "Table name must be supplied.");

        let request = GetDataRequest::new("Orders;--", &["Id"], "", "");
        assert_eq!(message(&request), "Table name contains invalid characters");

        let request = GetDataRequest::new("Orders", &[], "", "");
        assert_eq!(message(&request), "Column list must be supplied.");

        let request = GetDataRequest::new("Orders", &["Id", "Name'"], "", "");
        assert_eq!(message(&request), "Column name contains invalid characters");
    }

    #[test]
    fn rejects_invalid_filter_and_order_by() {
        let request = GetDataRequest::new("Orders", &["Id"], "", "Name; DROP");
        assert_eq!(message(&request), "Order by contains invalid characters");

        let request = GetDataRequest::new("Orders", &["Id"], "Id = '5'", "");
        assert_eq!(message(&request), "Filter criteria contains invalid characters");

        let request = GetDataRequest::new("Orders", &["Id"], "Id >= 5\tAND Qty != 0", "Name, Id");
        assert!(request.validate().is_ok());
    }
}

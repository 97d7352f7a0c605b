use crate::mapping::TableMapping;
use polyorm_core::{error::DriverError, value::Value};

///
/// SqlParam
///
/// Bind parameter passed to the driver. Array parameters carry whole value
/// lists for array columns and `IN UNNEST` clauses.
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Scalar(Value),
    Array(Vec<Value>),
}

impl From<Value> for SqlParam {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

///
/// SqlCell
///
/// One column of a result row. Array columns and child-table aggregations
/// carry multiple values.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqlCell {
    pub column: String,
    pub values: Vec<Value>,
    pub multi_valued: bool,
}

impl SqlCell {
    #[must_use]
    pub fn scalar(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            values: vec![value.into()],
            multi_valued: false,
        }
    }

    #[must_use]
    pub fn array(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            values,
            multi_valued: true,
        }
    }
}

///
/// SqlRow
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlRow {
    pub cells: Vec<SqlCell>,
}

impl SqlRow {
    #[must_use]
    pub fn cell(&self, column: &str) -> Option<&SqlCell> {
        self.cells
            .iter()
            .find(|c| c.column.eq_ignore_ascii_case(column))
    }

    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        self.cell(column)
            .and_then(|c| c.values.first())
            .and_then(Value::as_text)
    }

    #[must_use]
    pub fn int(&self, column: &str) -> Option<i64> {
        self.cell(column).and_then(|c| match c.values.first() {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        })
    }
}

///
/// RelationalDriver
///
/// Native SQL client boundary. Implementations own sessions, transactions,
/// timeouts, and retries; catalog introspection feeds the table-mapping
/// cache.
///

pub trait RelationalDriver: Send + Sync {
    fn query(&self, sql: &str, params: &[(String, SqlParam)]) -> Result<Vec<SqlRow>, DriverError>;

    /// Run a DML statement, returning the affected row count.
    fn execute(&self, sql: &str, params: &[(String, SqlParam)]) -> Result<usize, DriverError>;

    /// Catalog introspection: the physical layout of a table, or `None`
    /// when the table does not exist.
    fn table_mapping(&self, table: &str) -> Result<Option<TableMapping>, DriverError>;
}

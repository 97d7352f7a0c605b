use polyorm_core::error::DriverError;
use serde_json::{Map, Value as JsonValue};

///
/// ConsistencyLevel
///
/// Read consistency requested for a query. Passed through to the native
/// store as an opaque tunable.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConsistencyLevel {
    #[default]
    Default,
    /// The query must observe all prior mutations.
    Strong,
}

///
/// SubDocMutation
///
/// Field-level mutation applied to a stored document without replacing it.
///

#[derive(Clone, Debug, PartialEq)]
pub enum SubDocMutation {
    Upsert { path: String, value: JsonValue },
    Remove { path: String },
}

///
/// DocumentDriver
///
/// Native document-store client boundary. Implementations own connection
/// pooling, timeouts, and retries; nothing above this trait retries.
///

pub trait DocumentDriver: Send + Sync {
    /// Point fetch by native key.
    fn get(&self, key: &str) -> Result<Option<JsonValue>, DriverError>;

    /// Run a query statement, one JSON object per result row.
    fn query(
        &self,
        statement: &str,
        params: &Map<String, JsonValue>,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<JsonValue>, DriverError>;

    /// Run a mutating statement, returning the number of affected documents.
    fn execute(
        &self,
        statement: &str,
        params: &Map<String, JsonValue>,
    ) -> Result<usize, DriverError>;

    fn upsert(&self, key: &str, body: JsonValue) -> Result<(), DriverError>;

    fn mutate(&self, key: &str, mutations: &[SubDocMutation]) -> Result<(), DriverError>;

    /// Remove one document. `Ok(false)` when the key did not exist.
    fn remove(&self, key: &str) -> Result<bool, DriverError>;

    /// Remove every document whose key starts with the prefix, returning
    /// the removed count.
    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, DriverError>;
}

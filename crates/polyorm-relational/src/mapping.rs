use polyorm_core::error::{DriverError, OperationError, SearchError};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

///
/// ColumnKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Scalar,
    /// Native array column, queried through UNNEST.
    Array,
}

///
/// TableMapping
///
/// Physical layout of one entity table: its scalar and array columns plus
/// the child tables holding multi-valued attributes that were split out.
/// Column lookup is case-insensitive.
///

#[derive(Clone, Debug)]
pub struct TableMapping {
    table_name: String,
    columns: HashMap<String, ColumnKind>,
    child_tables: HashMap<String, String>,
}

impl TableMapping {
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: HashMap::new(),
            child_tables: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_column(mut self, name: &str, kind: ColumnKind) -> Self {
        self.columns.insert(name.to_lowercase(), kind);
        self
    }

    /// Declare a child table for an attribute. The child table carries the
    /// parent `doc_id` plus one column named after the attribute.
    #[must_use]
    pub fn with_child_table(mut self, attribute: &str, table: impl Into<String>) -> Self {
        self.child_tables.insert(attribute.to_lowercase(), table.into());
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<ColumnKind> {
        self.columns.get(&name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn child_table(&self, attribute: &str) -> Option<&str> {
        self.child_tables
            .get(&attribute.to_lowercase())
            .map(String::as_str)
    }

    /// Resolve an attribute to its physical location, or the compile-time
    /// unknown-column error.
    pub fn resolve(&self, attribute: &str) -> Result<AttributeLocation<'_>, SearchError> {
        if let Some(kind) = self.column(attribute) {
            return Ok(AttributeLocation::Column(kind));
        }
        if let Some(table) = self.child_table(attribute) {
            return Ok(AttributeLocation::ChildTable(table));
        }

        Err(SearchError::UnknownColumn {
            attribute: attribute.to_string(),
            table: self.table_name.clone(),
        })
    }
}

///
/// AttributeLocation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeLocation<'a> {
    Column(ColumnKind),
    ChildTable(&'a str),
}

///
/// MappingSource
///
/// Where table layouts come from, typically driver-side catalog
/// introspection.
///

pub trait MappingSource: Send + Sync {
    fn load(&self, object_class: &str) -> Result<Option<TableMapping>, DriverError>;
}

///
/// TableMappingRegistry
///
/// Publish-once cache over a `MappingSource`. A mapping observed under an
/// object class never changes for the lifetime of the registry.
///

pub struct TableMappingRegistry {
    source: Arc<dyn MappingSource>,
    cache: RwLock<HashMap<String, Arc<TableMapping>>>,
}

impl TableMappingRegistry {
    pub fn new(source: Arc<dyn MappingSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn mapping(&self, object_class: &str) -> Result<Arc<TableMapping>, OperationError> {
        if let Some(mapping) = self
            .cache
            .read()
            .expect("mapping cache poisoned")
            .get(object_class)
        {
            return Ok(mapping.clone());
        }

        let loaded = self
            .source
            .load(object_class)?
            .ok_or_else(|| OperationError::NotFound(format!("table for '{object_class}'")))?;

        // first publication wins if two threads loaded concurrently
        let mut cache = self.cache.write().expect("mapping cache poisoned");
        Ok(cache
            .entry(object_class.to_string())
            .or_insert_with(|| Arc::new(loaded))
            .clone())
    }
}

///
/// TESTS
///

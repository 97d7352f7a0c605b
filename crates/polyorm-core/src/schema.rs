use crate::{OBJECT_CLASS, model::Sort};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

///
/// MultiValued
///
/// Tri-state multi-valuedness of an attribute. `Unknown` compiles
/// conservatively as a scalar comparison.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MultiValued {
    True,
    False,
    #[default]
    Unknown,
}

///
/// AttributeMetadata
///
/// Static per-attribute metadata, declared at startup. Replaces runtime
/// reflection over entity classes.
///

#[derive(Clone, Debug)]
pub struct AttributeMetadata {
    pub native_name: String,
    pub multi_valued: MultiValued,
    /// Reads through this attribute must observe prior writes.
    pub requires_consistency: bool,
}

impl AttributeMetadata {
    #[must_use]
    pub fn new(native_name: impl Into<String>, multi_valued: MultiValued) -> Self {
        Self {
            native_name: native_name.into(),
            multi_valued,
            requires_consistency: false,
        }
    }

    #[must_use]
    pub const fn with_consistency(mut self) -> Self {
        self.requires_consistency = true;
        self
    }
}

///
/// EntitySchema
///
/// Attribute metadata for one entity type, keyed by lower-cased attribute
/// name. The type discriminator is always resolved as single-valued,
/// regardless of how it was declared.
///

#[derive(Clone, Debug, Default)]
pub struct EntitySchema {
    attributes: HashMap<String, AttributeMetadata>,
    object_classes: Vec<String>,
    default_sort: Option<Sort>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(object_classes: Vec<String>) -> Self {
        Self {
            attributes: HashMap::new(),
            object_classes,
            default_sort: None,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, meta: AttributeMetadata) -> Self {
        self.attributes.insert(meta.native_name.to_lowercase(), meta);
        self
    }

    #[must_use]
    pub fn with_default_sort(mut self, sort: Sort) -> Self {
        self.default_sort = Some(sort);
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeMetadata> {
        self.attributes.get(&name.to_lowercase())
    }

    /// Multi-valuedness from metadata alone. The discriminator attribute is
    /// single-valued by definition; attributes with no metadata are
    /// `Unknown`.
    #[must_use]
    pub fn multi_valued(&self, name: &str) -> MultiValued {
        if name.eq_ignore_ascii_case(OBJECT_CLASS) {
            return MultiValued::False;
        }

        self.attribute(name)
            .map_or(MultiValued::Unknown, |meta| meta.multi_valued)
    }

    #[must_use]
    pub fn requires_consistency(&self, name: &str) -> bool {
        self.attribute(name)
            .is_some_and(|meta| meta.requires_consistency)
    }

    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    #[must_use]
    pub const fn default_sort(&self) -> Option<&Sort> {
        self.default_sort.as_ref()
    }
}

///
/// SchemaRegistry
///
/// Publish-once schema cache shared between managers. A schema registered
/// under a name never changes afterwards.
///

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    inner: RwLock<HashMap<String, Arc<EntitySchema>>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema unless one is already published under this name.
    /// Returns the schema that ends up registered.
    pub fn register(&self, name: impl Into<String>, schema: EntitySchema) -> Arc<EntitySchema> {
        let name = name.into();
        let mut map = self.inner.write().expect("schema registry poisoned");

        map.entry(name).or_insert_with(|| Arc::new(schema)).clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<EntitySchema>> {
        self.inner
            .read()
            .expect("schema registry poisoned")
            .get(name)
            .cloned()
    }
}

///
/// TESTS
///

use crate::{
    compiler::{DocumentCompiler, DocumentExpression},
    operation::DocumentOperationService,
};
use polyorm_core::{
    OBJECT_CLASS, UID,
    batch::BatchOperation,
    error::{OperationError, SearchError},
    filter::Filter,
    key::ParsedKey,
    manager::{Backend, SearchRequest},
    model::{AttributeData, AttributeModification, EntryRecord, PagedResult},
    schema::EntitySchema,
};

///
/// DocumentBackend
///
/// Scopes searches by composing the discriminator equality onto the caller
/// filter. Discriminator replacement on merge is permitted since the
/// document layout has no per-type tables.
///

pub struct DocumentBackend {
    service: DocumentOperationService,
}

impl DocumentBackend {
    #[must_use]
    pub const fn new(service: DocumentOperationService) -> Self {
        Self { service }
    }
}

impl Backend for DocumentBackend {
    type Expr = DocumentExpression;

    fn compile(
        &self,
        _base: &ParsedKey,
        object_classes: &[String],
        filter: Option<&Filter>,
        schema: &EntitySchema,
    ) -> Result<DocumentExpression, OperationError> {
        let scope = object_classes
            .first()
            .map(|oc| Filter::equality(OBJECT_CLASS, oc.as_str()));

        let combined = match (scope, filter) {
            (Some(scope), Some(filter)) => Filter::and(vec![scope, filter.clone()]),
            (Some(scope), None) => scope,
            (None, Some(filter)) => filter.clone(),
            (None, None) => return Err(SearchError::EmptyFilter.into()),
        };

        Ok(DocumentCompiler::new(schema).compile(&combined)?)
    }

    fn lookup(
        &self,
        key: &ParsedKey,
        _object_classes: &[String],
        attributes: Option<&[String]>,
    ) -> Result<Option<EntryRecord>, OperationError> {
        self.service.lookup(key, attributes)
    }

    fn search(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        request: &SearchRequest,
        handler: Option<&mut dyn BatchOperation<EntryRecord>>,
    ) -> Result<PagedResult<EntryRecord>, OperationError> {
        self.service.search(base, expr, request, handler)
    }

    fn insert(
        &self,
        key: &ParsedKey,
        _object_classes: &[String],
        attributes: &[AttributeData],
    ) -> Result<(), OperationError> {
        self.service.insert(key, attributes)
    }

    fn update(
        &self,
        key: &ParsedKey,
        _object_classes: &[String],
        modifications: &[AttributeModification],
    ) -> Result<(), OperationError> {
        self.service.update(key, modifications)
    }

    fn delete(
        &self,
        key: &ParsedKey,
        _object_classes: &[String],
    ) -> Result<bool, OperationError> {
        self.service.delete(key)
    }

    fn delete_subtree(
        &self,
        key: &ParsedKey,
        _object_classes: &[String],
    ) -> Result<usize, OperationError> {
        self.service.delete_subtree(key)
    }

    fn delete_by_filter(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        limit: Option<usize>,
    ) -> Result<usize, OperationError> {
        self.service.delete_by_filter(base, expr, limit)
    }

    fn allows_discriminator_replacement(&self) -> bool {
        true
    }

    fn requires_object_class_for_export(&self) -> bool {
        false
    }

    fn bind_identifier_filter(&self, identifier: &str) -> Filter {
        // stored identifiers are not normalized, so lower-case at query time
        Filter::equality_of(Filter::lowercase(UID), identifier)
    }
}

///
/// TESTS
///

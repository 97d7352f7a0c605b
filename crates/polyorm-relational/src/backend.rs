use crate::{
    compiler::{SqlCompiler, SqlExpression},
    operation::RelationalOperationService,
};
use polyorm_core::{
    OBJECT_CLASS, UID,
    batch::BatchOperation,
    compile::ParamTable,
    error::{OperationError, SearchError},
    filter::{Filter, FilterKind},
    key::ParsedKey,
    manager::{Backend, SearchRequest},
    model::{AttributeData, AttributeModification, EntryRecord, PagedResult},
    schema::EntitySchema,
};

///
/// RelationalBackend
///
/// The first object class selects the storage table, so discriminator
/// clauses are stripped from the filter before compilation and
/// discriminator replacement on merge is rejected outright.
///

pub struct RelationalBackend {
    service: RelationalOperationService,
}

impl RelationalBackend {
    #[must_use]
    pub const fn new(service: RelationalOperationService) -> Self {
        Self { service }
    }

    fn table_for(
        &self,
        object_classes: &[String],
    ) -> Result<std::sync::Arc<crate::mapping::TableMapping>, OperationError> {
        let object_class = object_classes
            .first()
            .ok_or(SearchError::MissingObjectClass)?;

        self.service.mapping(object_class)
    }
}

/// Drop discriminator equality clauses; the table selector already scopes
/// the type. `None` when nothing else remains.
fn exclude_discriminator(filter: &Filter) -> Option<Filter> {
    match &filter.kind {
        FilterKind::Equality { .. }
            if filter
                .attribute_name()
                .is_some_and(|a| a.eq_ignore_ascii_case(OBJECT_CLASS)) =>
        {
            None
        }
        FilterKind::And(children) => {
            let mut kept: Vec<Filter> = children.iter().filter_map(exclude_discriminator).collect();
            match kept.len() {
                0 => None,
                1 => kept.pop(),
                _ => Some(Filter::and(kept)),
            }
        }
        _ => Some(filter.clone()),
    }
}

impl Backend for RelationalBackend {
    type Expr = SqlExpression;

    fn compile(
        &self,
        _base: &ParsedKey,
        object_classes: &[String],
        filter: Option<&Filter>,
        schema: &EntitySchema,
    ) -> Result<SqlExpression, OperationError> {
        let mapping = self.table_for(object_classes)?;

        match filter.and_then(exclude_discriminator) {
            Some(filter) => Ok(SqlCompiler::new(schema, &mapping).compile(&filter)?),
            // the table selector is the whole predicate
            None => Ok(SqlExpression {
                table: mapping.table_name().to_string(),
                fragment: "TRUE".to_string(),
                params: ParamTable::new(),
                joins: Vec::new(),
                requires_consistency: false,
            }),
        }
    }

    fn lookup(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        attributes: Option<&[String]>,
    ) -> Result<Option<EntryRecord>, OperationError> {
        let mapping = self.table_for(object_classes)?;
        self.service.lookup(&mapping, key, attributes)
    }

    fn search(
        &self,
        base: &ParsedKey,
        expr: &SqlExpression,
        request: &SearchRequest,
        handler: Option<&mut dyn BatchOperation<EntryRecord>>,
    ) -> Result<PagedResult<EntryRecord>, OperationError> {
        let mapping = self.service.mapping(&expr.table)?;
        self.service.search(&mapping, base, expr, request, handler)
    }

    fn insert(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        attributes: &[AttributeData],
    ) -> Result<(), OperationError> {
        let mapping = self.table_for(object_classes)?;
        self.service.insert(&mapping, key, attributes)
    }

    fn update(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        modifications: &[AttributeModification],
    ) -> Result<(), OperationError> {
        let mapping = self.table_for(object_classes)?;
        self.service.update(&mapping, key, modifications)
    }

    fn delete(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
    ) -> Result<bool, OperationError> {
        let mapping = self.table_for(object_classes)?;
        self.service.delete(&mapping, key)
    }

    fn delete_subtree(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
    ) -> Result<usize, OperationError> {
        let mapping = self.table_for(object_classes)?;
        self.service.delete_subtree(&mapping, key)
    }

    fn delete_by_filter(
        &self,
        base: &ParsedKey,
        expr: &SqlExpression,
        limit: Option<usize>,
    ) -> Result<usize, OperationError> {
        let mapping = self.service.mapping(&expr.table)?;
        self.service.delete_by_filter(&mapping, base, expr, limit)
    }

    fn allows_discriminator_replacement(&self) -> bool {
        false
    }

    fn requires_object_class_for_export(&self) -> bool {
        true
    }

    fn bind_identifier_filter(&self, identifier: &str) -> Filter {
        // stored identifiers are pre-normalized; the raw column keeps the
        // comparison index-friendly
        Filter::equality(UID, identifier)
    }
}

///
/// TESTS
///

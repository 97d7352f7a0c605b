use crate::{
    OBJECT_CLASS, USER_PASSWORD, auth,
    batch::{self, BatchOperation},
    error::{
        AuthenticationError, EntryDeleteError, EntryPersistenceError, OperationError,
        PersistenceError, UnsupportedOperationError,
    },
    filter::Filter,
    key::ParsedKey,
    mapper::EntityMapping,
    model::{
        AttributeData, AttributeModification, EntryRecord, PagedResult, SearchReturnKind,
        SearchScope, Sort,
    },
    observer::{DeleteNotifier, DeleteNotifierRegistry},
    schema::EntitySchema,
};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Default page size for chunked searches.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

///
/// SearchRequest
///
/// Everything a backend search needs beyond the compiled expression.
/// `count == 0` means unlimited.
///

#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub scope: SearchScope,
    pub return_attributes: Option<Vec<String>>,
    pub sort: Option<Sort>,
    pub start: usize,
    pub count: usize,
    pub chunk_size: usize,
    pub return_kind: SearchReturnKind,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            scope: SearchScope::Sub,
            return_attributes: None,
            sort: None,
            start: 0,
            count: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            return_kind: SearchReturnKind::Search,
        }
    }
}

impl SearchRequest {
    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn with_return_attributes(mut self, attributes: &[&str]) -> Self {
        self.return_attributes = Some(attributes.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub const fn scoped(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub const fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn paged(mut self, start: usize, count: usize) -> Self {
        self.start = start;
        self.count = count;
        self
    }

    #[must_use]
    pub const fn returning(mut self, kind: SearchReturnKind) -> Self {
        self.return_kind = kind;
        self
    }
}

///
/// Backend
///
/// The full backend surface the entry manager is written against. One
/// implementation per native store; the manager adds orchestration,
/// notification, and credential handling on top.
///

pub trait Backend: Send + Sync {
    /// Compiled native expression. Rendered into persistence errors for
    /// diagnosability.
    type Expr: fmt::Debug + fmt::Display;

    /// Compile a filter scoped to the given object classes. How the
    /// discriminator is applied (composed into the filter or carried as a
    /// table selector) is the backend's business.
    fn compile(
        &self,
        base: &ParsedKey,
        object_classes: &[String],
        filter: Option<&Filter>,
        schema: &EntitySchema,
    ) -> Result<Self::Expr, OperationError>;

    fn lookup(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        attributes: Option<&[String]>,
    ) -> Result<Option<EntryRecord>, OperationError>;

    fn search(
        &self,
        base: &ParsedKey,
        expr: &Self::Expr,
        request: &SearchRequest,
        handler: Option<&mut dyn BatchOperation<EntryRecord>>,
    ) -> Result<PagedResult<EntryRecord>, OperationError>;

    fn insert(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        attributes: &[AttributeData],
    ) -> Result<(), OperationError>;

    fn update(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
        modifications: &[AttributeModification],
    ) -> Result<(), OperationError>;

    /// Delete one entry. `Ok(false)` when the entry did not exist.
    fn delete(&self, key: &ParsedKey, object_classes: &[String]) -> Result<bool, OperationError>;

    /// Delete the entry and everything under its key prefix, returning the
    /// number of removed entries.
    fn delete_subtree(
        &self,
        key: &ParsedKey,
        object_classes: &[String],
    ) -> Result<usize, OperationError>;

    fn delete_by_filter(
        &self,
        base: &ParsedKey,
        expr: &Self::Expr,
        limit: Option<usize>,
    ) -> Result<usize, OperationError>;

    /// Neither native store models branches; scope degrades to "everything
    /// under the base key".
    fn has_branches_support(&self) -> bool {
        false
    }

    /// Whether `merge` may replace the type discriminator.
    fn allows_discriminator_replacement(&self) -> bool;

    /// Whether `export` demands object classes on the entity schema.
    fn requires_object_class_for_export(&self) -> bool;

    /// Equality filter matching the bind identifier. The value is already
    /// lower-cased; backends decide whether to normalize the stored side.
    fn bind_identifier_filter(&self, identifier: &str) -> Filter;
}

///
/// EntryManager
///
/// Uniform entry API written once over `Backend`. Holds the shared backend
/// and the delete-notification registry; safe to share across threads.
///

pub struct EntryManager<B: Backend> {
    backend: Arc<B>,
    notifiers: DeleteNotifierRegistry,
}

impl<B: Backend> EntryManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            notifiers: DeleteNotifierRegistry::new(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // --- Observers ---

    pub fn subscribe(&self, notifier: Arc<dyn DeleteNotifier>) {
        self.notifiers.subscribe(notifier);
    }

    pub fn unsubscribe(&self, notifier: &Arc<dyn DeleteNotifier>) {
        self.notifiers.unsubscribe(notifier);
    }

    // --- Read operations ---

    /// Fetch one entry by its DN.
    pub fn find_by_key<M: EntityMapping>(
        &self,
        mapping: &M,
        dn: &str,
        return_attributes: Option<&[String]>,
    ) -> Result<M::Entity, PersistenceError> {
        let key = ParsedKey::from_dn(dn)?;
        let record = self
            .backend
            .lookup(&key, mapping.schema().object_classes(), return_attributes)
            .map_err(|err| lookup_error(dn, err))?
            .ok_or_else(|| PersistenceError::EntryNotFound { key: dn.to_string() })?;

        Ok(mapping.from_attributes(&record)?)
    }

    pub fn find_by_filter<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<M::Entity>, PersistenceError> {
        let records = self.search_records(mapping, base_dn, filter, &SearchRequest::default())?;

        Ok(batch::materialize_in_chunks(records.entries, |record| {
            mapping.from_attributes(&record)
        })?)
    }

    /// Streaming variant: each raw chunk goes through the batch handler.
    pub fn find_by_filter_batched<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
        request: &SearchRequest,
        handler: &mut dyn BatchOperation<EntryRecord>,
    ) -> Result<(), PersistenceError> {
        let (key, expr) = self.compile(mapping, base_dn, filter)?;
        self.backend
            .search(&key, &expr, request, Some(handler))
            .map_err(|err| search_error(base_dn, &expr, err))?;

        Ok(())
    }

    pub fn find_paged<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
        request: SearchRequest,
    ) -> Result<PagedResult<M::Entity>, PersistenceError> {
        let request = request.returning(SearchReturnKind::SearchCount);
        let mut paged = self.search_records(mapping, base_dn, filter, &request)?;
        let records = std::mem::take(&mut paged.entries);

        let entries = batch::materialize_in_chunks(records, |record| {
            mapping.from_attributes(&record)
        })?;

        Ok(paged.map_entries(entries))
    }

    pub fn count<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
    ) -> Result<usize, PersistenceError> {
        let request = SearchRequest::default().returning(SearchReturnKind::Count);
        let paged = self.search_records(mapping, base_dn, filter, &request)?;

        Ok(paged.total_entries_count)
    }

    /// Existence check, capped at one fetched record.
    pub fn contains<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
    ) -> Result<bool, PersistenceError> {
        let request = SearchRequest::default().paged(0, 1).chunked(1);
        let paged = self.search_records(mapping, base_dn, filter, &request)?;

        Ok(!paged.entries.is_empty())
    }

    // --- Authentication ---

    /// Resolve the entry by its lower-cased bind identifier and verify the
    /// candidate credential. Zero or multiple matches are a plain `false`.
    /// The candidate never reaches logs or errors.
    pub fn authenticate<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        identifier: &str,
        credential: &str,
    ) -> Result<bool, PersistenceError> {
        let filter = self
            .backend
            .bind_identifier_filter(&identifier.to_lowercase());

        let request = SearchRequest::default()
            .paged(0, 2)
            .chunked(2)
            .with_return_attributes(&[USER_PASSWORD]);

        let paged = self
            .search_records(mapping, base_dn, Some(&filter), &request)
            .map_err(|err| {
                PersistenceError::Authentication(
                    AuthenticationError::new(base_dn).with_source(err),
                )
            })?;

        if paged.entries.len() != 1 {
            debug!(matches = paged.entries.len(), "bind identifier is not unique");
            return Ok(false);
        }

        let Some(stored) = paged.entries[0].text_value(USER_PASSWORD) else {
            return Ok(false);
        };

        Ok(auth::verify_credential(stored, credential))
    }

    // --- Write operations ---

    /// Create or overwrite an entry. The discriminator is written with
    /// single-value semantics and credential attributes are transformed to
    /// storage form; multi-valued attributes keep their full value lists.
    pub fn persist<M: EntityMapping>(
        &self,
        mapping: &M,
        entity: &M::Entity,
    ) -> Result<(), PersistenceError> {
        let dn = mapping.dn(entity);
        let key = ParsedKey::from_dn(&dn)?;
        let attributes = prepare_attributes(mapping.to_attributes(entity)?);

        self.backend
            .insert(&key, mapping.schema().object_classes(), &attributes)
            .map_err(|err| write_error(&dn, "persist failed", err))
    }

    /// Diff the entity against its stored state and apply field-level
    /// modifications. Discriminator replacement is checked against the
    /// backend capability before any write is issued.
    pub fn merge<M: EntityMapping>(
        &self,
        mapping: &M,
        entity: &M::Entity,
    ) -> Result<(), PersistenceError> {
        let dn = mapping.dn(entity);
        let key = ParsedKey::from_dn(&dn)?;

        let existing = self
            .backend
            .lookup(&key, mapping.schema().object_classes(), None)
            .map_err(|err| lookup_error(&dn, err))?
            .ok_or_else(|| PersistenceError::EntryNotFound { key: dn.clone() })?;

        let attributes = prepare_attributes(mapping.to_attributes(entity)?);
        let modifications = diff_attributes(&existing.attributes, &attributes);

        let replaces_discriminator = modifications
            .iter()
            .any(|m| m.attribute_name().eq_ignore_ascii_case(OBJECT_CLASS));
        if replaces_discriminator && !self.backend.allows_discriminator_replacement() {
            return Err(UnsupportedOperationError::DiscriminatorReplacement.into());
        }

        if modifications.is_empty() {
            return Ok(());
        }

        self.backend
            .update(&key, mapping.schema().object_classes(), &modifications)
            .map_err(|err| write_error(&dn, "merge failed", err))
    }

    /// Remove one entry. Pre-hooks complete before the physical delete;
    /// post-hooks fire only after a successful delete.
    pub fn remove<M: EntityMapping>(
        &self,
        mapping: &M,
        dn: &str,
    ) -> Result<(), PersistenceError> {
        let key = ParsedKey::from_dn(dn)?;
        let object_classes = mapping.schema().object_classes();

        self.notifiers.notify_before(dn, object_classes);

        let deleted = self
            .backend
            .delete(&key, object_classes)
            .map_err(|err| delete_error(dn, object_classes, err))?;
        if !deleted {
            return Err(PersistenceError::EntryNotFound { key: dn.to_string() });
        }

        self.notifiers.notify_after(dn, object_classes);

        Ok(())
    }

    /// Remove the entry and its whole subtree.
    pub fn remove_recursive<M: EntityMapping>(
        &self,
        mapping: &M,
        dn: &str,
    ) -> Result<usize, PersistenceError> {
        let key = ParsedKey::from_dn(dn)?;
        let object_classes = mapping.schema().object_classes();

        self.notifiers.notify_before(dn, object_classes);

        let removed = self
            .backend
            .delete_subtree(&key, object_classes)
            .map_err(|err| delete_error(dn, object_classes, err))?;

        self.notifiers.notify_after(dn, object_classes);

        Ok(removed)
    }

    /// Remove entries matching a filter, up to `limit`. Per-entry delete
    /// hooks do not fire on the bulk path.
    pub fn remove_by_filter<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<usize, PersistenceError> {
        let (key, expr) = self.compile(mapping, base_dn, Some(filter))?;

        self.backend
            .delete_by_filter(&key, &expr, limit)
            .map_err(|err| delete_error(base_dn, mapping.schema().object_classes(), err))
    }

    /// Raw record export of one entry.
    pub fn export<M: EntityMapping>(
        &self,
        mapping: &M,
        dn: &str,
    ) -> Result<EntryRecord, PersistenceError> {
        if self.backend.requires_object_class_for_export()
            && mapping.schema().object_classes().is_empty()
        {
            return Err(crate::error::MappingError::MissingObjectClasses.into());
        }

        let key = ParsedKey::from_dn(dn)?;
        self.backend
            .lookup(&key, mapping.schema().object_classes(), None)
            .map_err(|err| lookup_error(dn, err))?
            .ok_or_else(|| PersistenceError::EntryNotFound { key: dn.to_string() })
    }

    // --- Internals ---

    fn compile<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
    ) -> Result<(ParsedKey, B::Expr), PersistenceError> {
        let key = ParsedKey::from_dn(base_dn)?;
        let schema = mapping.schema();
        let expr = self
            .backend
            .compile(&key, schema.object_classes(), filter, schema)
            .map_err(|err| match err {
                OperationError::Search(err) => PersistenceError::Search(err),
                other => EntryPersistenceError::new(base_dn, "filter compilation failed")
                    .with_source(other)
                    .into(),
            })?;
        debug!(base = base_dn, expr = %expr, "compiled search expression");

        Ok((key, expr))
    }

    fn search_records<M: EntityMapping>(
        &self,
        mapping: &M,
        base_dn: &str,
        filter: Option<&Filter>,
        request: &SearchRequest,
    ) -> Result<PagedResult<EntryRecord>, PersistenceError> {
        let (key, expr) = self.compile(mapping, base_dn, filter)?;

        let mut request = request.clone();
        if request.sort.is_none() {
            request.sort = mapping.schema().default_sort().cloned();
        }

        self.backend
            .search(&key, &expr, &request, None)
            .map_err(|err| search_error(base_dn, &expr, err))
    }
}

/// Normalize attributes before any write: the discriminator becomes
/// single-valued and credentials take storage form.
fn prepare_attributes(mut attributes: Vec<AttributeData>) -> Vec<AttributeData> {
    for attr in &mut attributes {
        if attr.name_eq(OBJECT_CLASS) {
            attr.multi_valued = Some(false);
        } else if attr.name_eq(USER_PASSWORD) {
            for value in &mut attr.values {
                if let Some(plain) = value.as_text() {
                    *value = auth::create_storage_password(plain).into();
                }
            }
        }
    }

    attributes
}

/// Field-level diff between stored and desired attribute state.
fn diff_attributes(
    existing: &[AttributeData],
    desired: &[AttributeData],
) -> Vec<AttributeModification> {
    let mut modifications = Vec::new();

    for attr in desired {
        if attr.name_eq(crate::DN) {
            continue;
        }
        match existing.iter().find(|e| e.name_eq(&attr.name)) {
            None => modifications.push(AttributeModification::add(attr.clone())),
            Some(old) if old.values != attr.values => {
                modifications.push(AttributeModification::replace(old.clone(), attr.clone()));
            }
            Some(_) => {}
        }
    }

    for old in existing {
        if old.name_eq(crate::DN) {
            continue;
        }
        if !desired.iter().any(|a| a.name_eq(&old.name)) {
            modifications.push(AttributeModification::remove(old.clone()));
        }
    }

    modifications
}

fn lookup_error(dn: &str, err: OperationError) -> PersistenceError {
    match err {
        OperationError::NotFound(_) => PersistenceError::EntryNotFound { key: dn.to_string() },
        OperationError::Search(err) => err.into(),
        other => EntryPersistenceError::new(dn, "lookup failed")
            .with_source(other)
            .into(),
    }
}

fn search_error(dn: &str, expr: &impl fmt::Display, err: OperationError) -> PersistenceError {
    match err {
        OperationError::Search(err) => err.into(),
        other => EntryPersistenceError::new(dn, "search failed")
            .with_expression(expr.to_string())
            .with_source(other)
            .into(),
    }
}

fn write_error(dn: &str, message: &str, err: OperationError) -> PersistenceError {
    match err {
        OperationError::NotFound(_) => PersistenceError::EntryNotFound { key: dn.to_string() },
        OperationError::Unsupported(reason) => UnsupportedOperationError::Other(reason).into(),
        OperationError::Search(err) => err.into(),
        other => EntryPersistenceError::new(dn, message).with_source(other).into(),
    }
}

fn delete_error(dn: &str, object_classes: &[String], err: OperationError) -> PersistenceError {
    match err {
        OperationError::NotFound(_) => PersistenceError::EntryNotFound { key: dn.to_string() },
        other => EntryDeleteError::new(dn, object_classes)
            .with_source(other)
            .into(),
    }
}

///
/// TESTS
///

use crate::{
    compiler::SqlExpression,
    driver::{RelationalDriver, SqlParam, SqlRow},
    mapping::{AttributeLocation, ColumnKind, MappingSource, TableMapping, TableMappingRegistry},
};
use polyorm_core::{
    DN, DOC_ID,
    batch::BatchOperation,
    error::{DriverError, OperationError},
    key::ParsedKey,
    manager::SearchRequest,
    model::{
        AttributeData, AttributeModification, EntryRecord, ModificationKind, PagedResult,
        SearchReturnKind, SearchScope,
    },
    value::Value,
};
use std::sync::Arc;
use tracing::debug;

/// Bind-parameter name reserved for subtree scoping.
const KEY_PARAM: &str = "doc_key";

///
/// IntrospectionMappingSource
///
/// Table layouts read from the driver's catalog, one table per object
/// class.
///

struct IntrospectionMappingSource {
    driver: Arc<dyn RelationalDriver>,
}

impl MappingSource for IntrospectionMappingSource {
    fn load(&self, object_class: &str) -> Result<Option<TableMapping>, DriverError> {
        self.driver.table_mapping(object_class)
    }
}

///
/// RelationalOperationService
///
/// Executes compiled SQL expressions through the driver. Holds the
/// publish-once table-mapping cache.
///

pub struct RelationalOperationService {
    driver: Arc<dyn RelationalDriver>,
    registry: TableMappingRegistry,
}

impl RelationalOperationService {
    pub fn new(driver: Arc<dyn RelationalDriver>) -> Self {
        let registry = TableMappingRegistry::new(Arc::new(IntrospectionMappingSource {
            driver: driver.clone(),
        }));

        Self { driver, registry }
    }

    pub fn mapping(&self, object_class: &str) -> Result<Arc<TableMapping>, OperationError> {
        self.registry.mapping(object_class)
    }

    pub fn lookup(
        &self,
        mapping: &TableMapping,
        key: &ParsedKey,
        attributes: Option<&[String]>,
    ) -> Result<Option<EntryRecord>, OperationError> {
        let sql = format!(
            "SELECT doc.* FROM {} doc WHERE doc.{DOC_ID} = @{DOC_ID}",
            mapping.table_name()
        );
        let params = vec![(DOC_ID.to_string(), SqlParam::Scalar(key.key().into()))];
        let rows = self.driver.query(&sql, &params)?;

        Ok(rows.first().map(|row| record_from_row(row, attributes)))
    }

    /// Chunked search, same paging contract as the document service.
    pub fn search(
        &self,
        mapping: &TableMapping,
        base: &ParsedKey,
        expr: &SqlExpression,
        request: &SearchRequest,
        mut handler: Option<&mut dyn BatchOperation<EntryRecord>>,
    ) -> Result<PagedResult<EntryRecord>, OperationError> {
        if request.return_kind == SearchReturnKind::Count {
            return Ok(PagedResult {
                entries: Vec::new(),
                total_entries_count: self.count_matching(mapping, base, expr, request.scope)?,
                start: request.start,
                entries_count: 0,
            });
        }

        let mut collected = Vec::new();
        let mut fetched = 0;

        loop {
            let limit = if request.count > 0 {
                (request.count - fetched).min(request.chunk_size)
            } else {
                request.chunk_size
            };
            if limit == 0 {
                break;
            }

            let sql = select_statement(mapping, base, expr, request, limit, request.start + fetched);
            debug!(sql = %sql, "executing relational search chunk");

            let rows = self
                .driver
                .query(&sql, &bind_params(base, expr, request.scope))?;
            let size = rows.len();
            fetched += size;

            let chunk: Vec<EntryRecord> = rows
                .iter()
                .map(|row| record_from_row(row, request.return_attributes.as_deref()))
                .collect();

            if let Some(handler) = handler.as_deref_mut() {
                if handler.collect_search_result(size) {
                    collected.extend(chunk.iter().cloned());
                }
                handler.perform_action(chunk);
            } else {
                collected.extend(chunk);
            }

            if size < limit {
                break;
            }
        }

        let total = if request.return_kind == SearchReturnKind::SearchCount {
            self.count_matching(mapping, base, expr, request.scope)?
        } else {
            collected.len()
        };

        Ok(PagedResult {
            entries_count: collected.len(),
            entries: collected,
            total_entries_count: total,
            start: request.start,
        })
    }

    pub fn insert(
        &self,
        mapping: &TableMapping,
        key: &ParsedKey,
        attributes: &[AttributeData],
    ) -> Result<(), OperationError> {
        let mut columns = vec![DOC_ID.to_string(), DN.to_string()];
        let mut params = vec![
            (DOC_ID.to_string(), SqlParam::Scalar(key.key().into())),
            (DN.to_string(), SqlParam::Scalar(key.dn().into())),
        ];
        let mut child_writes = Vec::new();

        for attr in attributes {
            if attr.name_eq(DN) || attr.name_eq(DOC_ID) {
                continue;
            }
            match mapping.resolve(&attr.name)? {
                AttributeLocation::Column(kind) => {
                    columns.push(attr.name.clone());
                    params.push((attr.name.clone(), column_param(kind, attr)));
                }
                AttributeLocation::ChildTable(table) => {
                    child_writes.push((table.to_string(), attr.clone()));
                }
            }
        }

        let placeholders = columns
            .iter()
            .map(|c| format!("@{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR UPDATE INTO {} ({}) VALUES ({placeholders})",
            mapping.table_name(),
            columns.join(", "),
        );
        self.driver.execute(&sql, &params)?;

        for (table, attr) in child_writes {
            self.rewrite_child_rows(&table, key, &attr.name, &attr.values)?;
        }

        Ok(())
    }

    pub fn update(
        &self,
        mapping: &TableMapping,
        key: &ParsedKey,
        modifications: &[AttributeModification],
    ) -> Result<(), OperationError> {
        let mut assignments = Vec::new();
        let mut params = vec![(DOC_ID.to_string(), SqlParam::Scalar(key.key().into()))];

        for modification in modifications {
            let name = modification.attribute_name().to_string();
            match mapping.resolve(&name)? {
                AttributeLocation::Column(kind) => match modification.kind {
                    ModificationKind::Add | ModificationKind::Replace => {
                        let Some(attr) = modification.attribute.as_ref() else {
                            continue;
                        };
                        assignments.push(format!("{name} = @{name}"));
                        params.push((name, column_param(kind, attr)));
                    }
                    ModificationKind::Remove => {
                        assignments.push(format!("{name} = NULL"));
                    }
                },
                AttributeLocation::ChildTable(table) => {
                    let values = modification
                        .attribute
                        .as_ref()
                        .map(|a| a.values.as_slice())
                        .unwrap_or_default();
                    self.rewrite_child_rows(table, key, &name, values)?;
                }
            }
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE {DOC_ID} = @{DOC_ID}",
                mapping.table_name(),
                assignments.join(", "),
            );
            self.driver.execute(&sql, &params)?;
        }

        Ok(())
    }

    pub fn delete(
        &self,
        mapping: &TableMapping,
        key: &ParsedKey,
    ) -> Result<bool, OperationError> {
        let sql = format!(
            "DELETE FROM {} WHERE {DOC_ID} = @{DOC_ID}",
            mapping.table_name()
        );
        let params = vec![(DOC_ID.to_string(), SqlParam::Scalar(key.key().into()))];

        Ok(self.driver.execute(&sql, &params)? > 0)
    }

    /// Child-table rows are interleaved with the parent key, so the driver
    /// cascades them with the parent row.
    pub fn delete_subtree(
        &self,
        mapping: &TableMapping,
        key: &ParsedKey,
    ) -> Result<usize, OperationError> {
        let sql = format!(
            "DELETE FROM {} WHERE {DOC_ID} = @{DOC_ID} OR {DOC_ID} LIKE @{KEY_PARAM}",
            mapping.table_name()
        );
        let params = vec![
            (DOC_ID.to_string(), SqlParam::Scalar(key.key().into())),
            (
                KEY_PARAM.to_string(),
                SqlParam::Scalar(format!("{}%", key.subtree_prefix()).into()),
            ),
        ];

        Ok(self.driver.execute(&sql, &params)?)
    }

    /// Two-step bulk delete: select the matching keys up to the limit,
    /// then delete them by key set.
    pub fn delete_by_filter(
        &self,
        mapping: &TableMapping,
        base: &ParsedKey,
        expr: &SqlExpression,
        limit: Option<usize>,
    ) -> Result<usize, OperationError> {
        let mut sql = format!(
            "SELECT doc.{DOC_ID} FROM {} doc{} WHERE {}",
            mapping.table_name(),
            expr.join_clause(),
            where_clause(base, expr, SearchScope::Sub),
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let keys: Vec<Value> = self
            .driver
            .query(&sql, &bind_params(base, expr, SearchScope::Sub))?
            .iter()
            .filter_map(|row| row.text(DOC_ID).map(Value::from))
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let delete = format!(
            "DELETE FROM {} WHERE {DOC_ID} IN UNNEST(@keys)",
            mapping.table_name()
        );
        debug!(count = keys.len(), "executing relational bulk delete");

        Ok(self
            .driver
            .execute(&delete, &[("keys".to_string(), SqlParam::Array(keys))])?)
    }

    fn count_matching(
        &self,
        mapping: &TableMapping,
        base: &ParsedKey,
        expr: &SqlExpression,
        scope: SearchScope,
    ) -> Result<usize, OperationError> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} doc{} WHERE {}",
            mapping.table_name(),
            expr.join_clause(),
            where_clause(base, expr, scope),
        );
        let rows = self.driver.query(&sql, &bind_params(base, expr, scope))?;

        let total = rows
            .first()
            .and_then(|row| row.int("total"))
            .ok_or_else(|| DriverError::new("count query returned no total"))?;

        Ok(usize::try_from(total).unwrap_or(usize::MAX))
    }

    /// Replace the child-table rows of one attribute with the given values.
    fn rewrite_child_rows(
        &self,
        table: &str,
        key: &ParsedKey,
        attribute: &str,
        values: &[Value],
    ) -> Result<(), OperationError> {
        let delete = format!("DELETE FROM {table} WHERE {DOC_ID} = @{DOC_ID}");
        let key_param = (DOC_ID.to_string(), SqlParam::Scalar(key.key().into()));
        self.driver.execute(&delete, &[key_param.clone()])?;

        let insert =
            format!("INSERT INTO {table} ({DOC_ID}, {attribute}) VALUES (@{DOC_ID}, @{attribute})");
        for value in values {
            let params = vec![
                key_param.clone(),
                (attribute.to_string(), SqlParam::Scalar(value.clone())),
            ];
            self.driver.execute(&insert, &params)?;
        }

        Ok(())
    }
}

fn column_param(kind: ColumnKind, attr: &AttributeData) -> SqlParam {
    match kind {
        ColumnKind::Scalar => SqlParam::Scalar(
            attr.values.first().cloned().unwrap_or(Value::Null),
        ),
        ColumnKind::Array => SqlParam::Array(attr.values.clone()),
    }
}

fn select_statement(
    mapping: &TableMapping,
    base: &ParsedKey,
    expr: &SqlExpression,
    request: &SearchRequest,
    limit: usize,
    offset: usize,
) -> String {
    let mut sql = format!(
        "SELECT doc.* FROM {} doc{} WHERE {}",
        mapping.table_name(),
        expr.join_clause(),
        where_clause(base, expr, request.scope),
    );
    if let Some(sort) = &request.sort {
        sql.push_str(&format!(" ORDER BY doc.{} {}", sort.attribute, sort.order));
    }
    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

    sql
}

fn where_clause(base: &ParsedKey, expr: &SqlExpression, scope: SearchScope) -> String {
    let scoping = match scope {
        SearchScope::Base => Some(format!("doc.{DOC_ID} = @{KEY_PARAM}")),
        SearchScope::Sub if !base.is_root() => Some(format!("doc.{DOC_ID} LIKE @{KEY_PARAM}")),
        SearchScope::Sub => None,
    };

    match scoping {
        Some(scoping) => format!("( {} ) AND {scoping}", expr.fragment),
        None => expr.fragment.clone(),
    }
}

fn bind_params(
    base: &ParsedKey,
    expr: &SqlExpression,
    scope: SearchScope,
) -> Vec<(String, SqlParam)> {
    let mut params: Vec<(String, SqlParam)> = expr
        .params
        .iter()
        .map(|(name, value)| (name.to_string(), SqlParam::Scalar(value.clone())))
        .collect();
    // the binding must mirror the scoping predicate: exact key for Base,
    // prefix pattern for Sub
    let key_binding = match scope {
        SearchScope::Base => Some(base.key().to_string()),
        SearchScope::Sub if !base.is_root() => Some(format!("{}%", base.subtree_prefix())),
        SearchScope::Sub => None,
    };
    if let Some(value) = key_binding {
        params.push((KEY_PARAM.to_string(), SqlParam::Scalar(value.into())));
    }

    params
}

fn record_from_row(row: &SqlRow, projection: Option<&[String]>) -> EntryRecord {
    let dn = row.text(DN).unwrap_or_default().to_string();

    let attributes = row
        .cells
        .iter()
        .filter(|cell| !cell.column.eq_ignore_ascii_case(DN))
        .filter(|cell| !cell.column.eq_ignore_ascii_case(DOC_ID))
        .filter(|cell| {
            projection.is_none_or(|wanted| {
                wanted.iter().any(|w| w.eq_ignore_ascii_case(&cell.column))
            })
        })
        .map(|cell| AttributeData {
            name: cell.column.clone(),
            values: cell.values.clone(),
            multi_valued: Some(cell.multi_valued),
        })
        .collect();

    EntryRecord::new(dn, attributes)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::SqlCompiler, driver::SqlCell};
    use polyorm_core::{
        filter::Filter,
        schema::{AttributeMetadata, EntitySchema, MultiValued},
    };
    use std::sync::Mutex;

    ///
    /// FakeDriver
    ///

    #[derive(Default)]
    struct FakeDriver {
        statements: Mutex<Vec<String>>,
        params: Mutex<Vec<Vec<(String, SqlParam)>>>,
        pages: Mutex<Vec<Vec<SqlRow>>>,
    }

    impl FakeDriver {
        fn with_pages(pages: Vec<Vec<SqlRow>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                ..Self::default()
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }

        fn params(&self) -> Vec<Vec<(String, SqlParam)>> {
            self.params.lock().unwrap().clone()
        }
    }

    impl RelationalDriver for FakeDriver {
        fn query(
            &self,
            sql: &str,
            params: &[(String, SqlParam)],
        ) -> Result<Vec<SqlRow>, DriverError> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.params.lock().unwrap().push(params.to_vec());
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }

        fn execute(
            &self,
            sql: &str,
            params: &[(String, SqlParam)],
        ) -> Result<usize, DriverError> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.params.lock().unwrap().push(params.to_vec());
            Ok(1)
        }

        fn table_mapping(&self, table: &str) -> Result<Option<TableMapping>, DriverError> {
            Ok(Some(
                TableMapping::new(table)
                    .with_column("doc_id", ColumnKind::Scalar)
                    .with_column("uid", ColumnKind::Scalar),
            ))
        }
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(vec!["person".into()])
            .with_attribute(AttributeMetadata::new("uid", MultiValued::False))
    }

    fn mapping() -> TableMapping {
        TableMapping::new("person")
            .with_column("doc_id", ColumnKind::Scalar)
            .with_column("uid", ColumnKind::Scalar)
            .with_column("memberOf", ColumnKind::Array)
            .with_child_table("externalId", "person_externalId")
    }

    fn row(n: usize) -> SqlRow {
        SqlRow {
            cells: vec![
                SqlCell::scalar("dn", format!("inum={n},ou=people,o=org")),
                SqlCell::scalar("doc_id", format!("people_{n}")),
                SqlCell::scalar("uid", format!("user{n}")),
            ],
        }
    }

    fn compile(filter: &Filter) -> SqlExpression {
        let schema = schema();
        let mapping = mapping();
        SqlCompiler::new(&schema, &mapping).compile(filter).unwrap()
    }

    #[test]
    fn search_pages_with_limit_and_offset() {
        let pages = vec![
            (0..2).map(row).collect::<Vec<_>>(),
            (2..3).map(row).collect::<Vec<_>>(),
        ];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().chunked(2);

        let paged = service
            .search(&mapping(), &base, &expr, &request, None)
            .unwrap();
        assert_eq!(paged.entries.len(), 3);

        let statements = driver.statements();
        assert!(statements[0].contains("LIMIT 2 OFFSET 0"));
        assert!(statements[1].contains("LIMIT 2 OFFSET 2"));
        assert!(statements[0].contains("doc.doc_id LIKE @doc_key"));
    }

    #[test]
    fn base_scope_binds_the_exact_key() {
        let driver = Arc::new(FakeDriver::default());
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().scoped(SearchScope::Base);

        service
            .search(&mapping(), &base, &expr, &request, None)
            .unwrap();

        assert!(driver.statements()[0].contains("doc.doc_id = @doc_key"));
        let bound = driver.params()[0]
            .iter()
            .find(|(name, _)| name == KEY_PARAM)
            .map(|(_, param)| param.clone());
        assert_eq!(bound, Some(SqlParam::Scalar("people_x1".into())));
    }

    #[test]
    fn count_honors_the_requested_scope() {
        let pages = vec![vec![SqlRow {
            cells: vec![SqlCell::scalar("total", 1)],
        }]];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default()
            .scoped(SearchScope::Base)
            .returning(SearchReturnKind::Count);

        service
            .search(&mapping(), &base, &expr, &request, None)
            .unwrap();

        let statement = &driver.statements()[0];
        assert!(statement.contains("doc.doc_id = @doc_key"));
        assert!(!statement.contains("LIKE"));
        let bound = driver.params()[0]
            .iter()
            .find(|(name, _)| name == KEY_PARAM)
            .map(|(_, param)| param.clone());
        assert_eq!(bound, Some(SqlParam::Scalar("people_x1".into())));
    }

    #[test]
    fn search_includes_join_clause() {
        let driver = Arc::new(FakeDriver::default());
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::equality("externalId", "e-1"));
        let request = SearchRequest::default();

        service
            .search(&mapping(), &base, &expr, &request, None)
            .unwrap();

        assert!(driver.statements()[0].contains(
            "JOIN person_externalId externalId ON doc.doc_id = externalId.doc_id"
        ));
    }

    #[test]
    fn delete_by_filter_selects_keys_then_deletes() {
        let pages = vec![vec![
            SqlRow {
                cells: vec![SqlCell::scalar("doc_id", "people_1")],
            },
            SqlRow {
                cells: vec![SqlCell::scalar("doc_id", "people_2")],
            },
        ]];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::equality("uid", "stale"));
        let removed = service
            .delete_by_filter(&mapping(), &base, &expr, Some(5))
            .unwrap();

        assert_eq!(removed, 1);
        let statements = driver.statements();
        assert!(statements[0].starts_with("SELECT doc.doc_id FROM person doc"));
        assert!(statements[0].ends_with("LIMIT 5"));
        assert_eq!(
            statements[1],
            "DELETE FROM person WHERE doc_id IN UNNEST(@keys)"
        );
    }

    #[test]
    fn delete_by_filter_with_no_matches_issues_no_delete() {
        let driver = Arc::new(FakeDriver::default());
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::equality("uid", "stale"));
        let removed = service
            .delete_by_filter(&mapping(), &base, &expr, None)
            .unwrap();

        assert_eq!(removed, 0);
        assert_eq!(driver.statements().len(), 1);
    }

    #[test]
    fn insert_splits_columns_and_child_tables() {
        let driver = Arc::new(FakeDriver::default());
        let service = RelationalOperationService::new(driver.clone());

        let key = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let attrs = vec![
            AttributeData::single("uid", "admin"),
            AttributeData::multi("memberOf", vec!["a".into(), "b".into()]),
            AttributeData::multi("externalId", vec!["e1".into(), "e2".into()]),
        ];
        service.insert(&mapping(), &key, &attrs).unwrap();

        let statements = driver.statements();
        assert_eq!(
            statements[0],
            "INSERT OR UPDATE INTO person (doc_id, dn, uid, memberOf) \
             VALUES (@doc_id, @dn, @uid, @memberOf)"
        );
        assert_eq!(
            statements[1],
            "DELETE FROM person_externalId WHERE doc_id = @doc_id"
        );
        assert_eq!(
            statements[2],
            "INSERT INTO person_externalId (doc_id, externalId) VALUES (@doc_id, @externalId)"
        );
        assert_eq!(statements.len(), 4);
    }

    #[test]
    fn update_sets_removed_columns_to_null() {
        let driver = Arc::new(FakeDriver::default());
        let service = RelationalOperationService::new(driver.clone());

        let key = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let mods = vec![
            AttributeModification::replace(
                AttributeData::single("uid", "old"),
                AttributeData::single("uid", "new"),
            ),
            AttributeModification::remove(AttributeData::multi(
                "memberOf",
                vec!["a".into()],
            )),
        ];
        service.update(&mapping(), &key, &mods).unwrap();

        assert_eq!(
            driver.statements()[0],
            "UPDATE person SET uid = @uid, memberOf = NULL WHERE doc_id = @doc_id"
        );
    }

    #[test]
    fn count_mode_reads_total() {
        let pages = vec![vec![SqlRow {
            cells: vec![SqlCell::scalar("total", 7)],
        }]];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = RelationalOperationService::new(driver.clone());

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().returning(SearchReturnKind::Count);

        let paged = service
            .search(&mapping(), &base, &expr, &request, None)
            .unwrap();
        assert_eq!(paged.total_entries_count, 7);
        assert!(driver.statements()[0].starts_with("SELECT COUNT(*) AS total"));
    }

    #[test]
    fn record_round_trips_through_row() {
        let record = record_from_row(&row(1), None);
        assert_eq!(record.dn, "inum=1,ou=people,o=org");
        assert_eq!(record.text_value("uid"), Some("user1"));
        assert!(record.attribute("doc_id").is_none());
    }
}

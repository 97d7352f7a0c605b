use crate::{
    compiler::DocumentExpression,
    driver::{ConsistencyLevel, DocumentDriver, SubDocMutation},
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
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Bind-parameter name reserved for key scoping.
const KEY_PARAM: &str = "doc_key";

///
/// DocumentOperationService
///
/// Executes compiled document expressions against one container through
/// the driver. Stateless beyond the shared driver handle.
///

pub struct DocumentOperationService {
    driver: Arc<dyn DocumentDriver>,
    container: String,
}

impl DocumentOperationService {
    pub fn new(driver: Arc<dyn DocumentDriver>, container: impl Into<String>) -> Self {
        Self {
            driver,
            container: container.into(),
        }
    }

    pub fn lookup(
        &self,
        key: &ParsedKey,
        attributes: Option<&[String]>,
    ) -> Result<Option<EntryRecord>, OperationError> {
        let Some(body) = self.driver.get(key.key())? else {
            return Ok(None);
        };

        Ok(Some(record_from_body(&body, attributes)))
    }

    /// Chunked search. Pages in `chunk_size` batches, stopping on a short
    /// page or once `count` entries were fetched; an optional batch handler
    /// sees every raw chunk.
    pub fn search(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        request: &SearchRequest,
        mut handler: Option<&mut dyn BatchOperation<EntryRecord>>,
    ) -> Result<PagedResult<EntryRecord>, OperationError> {
        let consistency = consistency_for(expr);

        if request.return_kind == SearchReturnKind::Count {
            return Ok(PagedResult {
                entries: Vec::new(),
                total_entries_count: self
                    .count_matching(base, expr, request.scope, consistency)?,
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

            let statement = self.select_statement(base, expr, request, limit, request.start + fetched);
            debug!(statement = %statement, "executing document search chunk");

            let rows = self
                .driver
                .query(&statement, &bind_params(base, expr, request.scope), consistency)?;
            let size = rows.len();
            fetched += size;

            let chunk: Vec<EntryRecord> = rows
                .iter()
                .map(|row| record_from_body(row, request.return_attributes.as_deref()))
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
            self.count_matching(base, expr, request.scope, consistency)?
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
        key: &ParsedKey,
        attributes: &[AttributeData],
    ) -> Result<(), OperationError> {
        let body = body_from_attributes(key, attributes);
        self.driver.upsert(key.key(), body)?;

        Ok(())
    }

    pub fn update(
        &self,
        key: &ParsedKey,
        modifications: &[AttributeModification],
    ) -> Result<(), OperationError> {
        let mutations: Vec<SubDocMutation> = modifications
            .iter()
            .map(|m| match m.kind {
                ModificationKind::Add | ModificationKind::Replace => SubDocMutation::Upsert {
                    path: m.attribute_name().to_string(),
                    value: m
                        .attribute
                        .as_ref()
                        .map_or(JsonValue::Null, attribute_to_json),
                },
                ModificationKind::Remove => SubDocMutation::Remove {
                    path: m.attribute_name().to_string(),
                },
            })
            .collect();

        self.driver.mutate(key.key(), &mutations)?;

        Ok(())
    }

    pub fn delete(&self, key: &ParsedKey) -> Result<bool, OperationError> {
        Ok(self.driver.remove(key.key())?)
    }

    pub fn delete_subtree(&self, key: &ParsedKey) -> Result<usize, OperationError> {
        let mut removed = usize::from(self.driver.remove(key.key())?);
        removed += self.driver.remove_by_prefix(&key.subtree_prefix())?;

        Ok(removed)
    }

    pub fn delete_by_filter(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        limit: Option<usize>,
    ) -> Result<usize, OperationError> {
        let mut statement = format!(
            "DELETE FROM {} AS doc WHERE {}",
            self.container,
            self.where_clause(base, expr, SearchScope::Sub),
        );
        if let Some(limit) = limit {
            statement.push_str(&format!(" LIMIT {limit}"));
        }
        debug!(statement = %statement, "executing document bulk delete");

        Ok(self
            .driver
            .execute(&statement, &bind_params(base, expr, SearchScope::Sub))?)
    }

    // --- Statement assembly ---

    fn select_statement(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        request: &SearchRequest,
        limit: usize,
        offset: usize,
    ) -> String {
        let mut statement = format!(
            "SELECT doc.* FROM {} AS doc WHERE {}",
            self.container,
            self.where_clause(base, expr, request.scope),
        );
        if let Some(sort) = &request.sort {
            statement.push_str(&format!(" ORDER BY {} {}", sort.attribute, sort.order));
        }
        statement.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

        statement
    }

    fn count_matching(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        scope: SearchScope,
        consistency: ConsistencyLevel,
    ) -> Result<usize, OperationError> {
        let statement = format!(
            "SELECT COUNT(*) AS total FROM {} AS doc WHERE {}",
            self.container,
            self.where_clause(base, expr, scope),
        );
        let rows = self
            .driver
            .query(&statement, &bind_params(base, expr, scope), consistency)?;

        let total = rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| DriverError::new("count query returned no total"))?;

        Ok(usize::try_from(total).unwrap_or(usize::MAX))
    }

    fn where_clause(
        &self,
        base: &ParsedKey,
        expr: &DocumentExpression,
        scope: SearchScope,
    ) -> String {
        let scoping = match scope {
            SearchScope::Base => Some(format!("{DOC_ID} = ${KEY_PARAM}")),
            SearchScope::Sub if !base.is_root() => Some(format!("{DOC_ID} LIKE ${KEY_PARAM}")),
            SearchScope::Sub => None,
        };

        match scoping {
            Some(scoping) => format!("( {} ) AND {scoping}", expr.fragment),
            None => expr.fragment.clone(),
        }
    }
}

fn consistency_for(expr: &DocumentExpression) -> ConsistencyLevel {
    if expr.requires_consistency {
        ConsistencyLevel::Strong
    } else {
        ConsistencyLevel::Default
    }
}

fn bind_params(
    base: &ParsedKey,
    expr: &DocumentExpression,
    scope: SearchScope,
) -> Map<String, JsonValue> {
    let mut params: Map<String, JsonValue> = expr
        .params
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_json()))
        .collect();

    // the binding must mirror the scoping predicate: exact key for Base,
    // prefix pattern for Sub
    let key_binding = match scope {
        SearchScope::Base => Some(base.key().to_string()),
        SearchScope::Sub if !base.is_root() => Some(format!("{}%", base.subtree_prefix())),
        SearchScope::Sub => None,
    };
    if let Some(value) = key_binding {
        params.insert(KEY_PARAM.to_string(), JsonValue::String(value));
    }

    params
}

fn attribute_to_json(attr: &AttributeData) -> JsonValue {
    let multi = attr.multi_valued.unwrap_or(attr.values.len() > 1);
    if multi {
        JsonValue::Array(attr.values.iter().map(Value::to_json).collect())
    } else {
        attr.values.first().map_or(JsonValue::Null, Value::to_json)
    }
}

fn body_from_attributes(key: &ParsedKey, attributes: &[AttributeData]) -> JsonValue {
    let mut body = Map::new();
    body.insert(DN.to_string(), JsonValue::String(key.dn().to_string()));
    body.insert(DOC_ID.to_string(), JsonValue::String(key.key().to_string()));
    for attr in attributes {
        if attr.name_eq(DN) || attr.name_eq(DOC_ID) {
            continue;
        }
        body.insert(attr.name.clone(), attribute_to_json(attr));
    }

    JsonValue::Object(body)
}

fn record_from_body(body: &JsonValue, projection: Option<&[String]>) -> EntryRecord {
    let dn = body
        .get(DN)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();

    let attributes = body
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case(DN))
                .filter(|(name, _)| !name.eq_ignore_ascii_case(DOC_ID))
                .filter(|(name, _)| {
                    projection.is_none_or(|wanted| {
                        wanted.iter().any(|w| w.eq_ignore_ascii_case(name))
                    })
                })
                .map(|(name, value)| match value {
                    JsonValue::Array(items) => AttributeData::multi(
                        name.clone(),
                        items.iter().map(Value::from_json).collect(),
                    ),
                    other => AttributeData::new(name.clone(), vec![Value::from_json(other)]),
                })
                .collect()
        })
        .unwrap_or_default();

    EntryRecord::new(dn, attributes)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::DocumentCompiler;
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
        params: Mutex<Vec<Map<String, JsonValue>>>,
        pages: Mutex<Vec<Vec<JsonValue>>>,
    }

    impl FakeDriver {
        fn with_pages(pages: Vec<Vec<JsonValue>>) -> Self {
            Self {
                statements: Mutex::new(Vec::new()),
                params: Mutex::new(Vec::new()),
                pages: Mutex::new(pages),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }

        fn params(&self) -> Vec<Map<String, JsonValue>> {
            self.params.lock().unwrap().clone()
        }
    }

    impl DocumentDriver for FakeDriver {
        fn get(&self, _key: &str) -> Result<Option<JsonValue>, DriverError> {
            Ok(None)
        }

        fn query(
            &self,
            statement: &str,
            params: &Map<String, JsonValue>,
            _consistency: ConsistencyLevel,
        ) -> Result<Vec<JsonValue>, DriverError> {
            self.statements.lock().unwrap().push(statement.to_string());
            self.params.lock().unwrap().push(params.clone());
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }

        fn execute(
            &self,
            statement: &str,
            params: &Map<String, JsonValue>,
        ) -> Result<usize, DriverError> {
            self.statements.lock().unwrap().push(statement.to_string());
            self.params.lock().unwrap().push(params.clone());
            Ok(4)
        }

        fn upsert(&self, _key: &str, _body: JsonValue) -> Result<(), DriverError> {
            Ok(())
        }

        fn mutate(&self, _key: &str, _mutations: &[SubDocMutation]) -> Result<(), DriverError> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> Result<bool, DriverError> {
            Ok(true)
        }

        fn remove_by_prefix(&self, _prefix: &str) -> Result<usize, DriverError> {
            Ok(2)
        }
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(vec!["person".into()])
            .with_attribute(AttributeMetadata::new("uid", MultiValued::False))
    }

    fn body(n: usize) -> JsonValue {
        serde_json::json!({
            "dn": format!("inum={n},ou=people,o=org"),
            "doc_id": format!("people_{n}"),
            "uid": format!("user{n}"),
        })
    }

    fn compile(filter: &Filter) -> DocumentExpression {
        let schema = schema();
        DocumentCompiler::new(&schema).compile(filter).unwrap()
    }

    #[test]
    fn search_pages_until_short_page() {
        let pages = vec![
            (0..3).map(body).collect::<Vec<_>>(),
            (3..5).map(body).collect::<Vec<_>>(),
        ];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().chunked(3);

        let paged = service.search(&base, &expr, &request, None).unwrap();
        assert_eq!(paged.entries.len(), 5);
        assert_eq!(paged.entries_count, 5);

        let statements = driver.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("LIMIT 3 OFFSET 0"));
        assert!(statements[1].contains("LIMIT 3 OFFSET 3"));
        assert!(statements[0].contains("doc_id LIKE $doc_key"));
    }

    #[test]
    fn search_caps_final_page_at_remaining_count() {
        let pages = vec![
            (0..3).map(body).collect::<Vec<_>>(),
            (3..4).map(body).collect::<Vec<_>>(),
        ];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().paged(0, 4).chunked(3);

        let paged = service.search(&base, &expr, &request, None).unwrap();
        assert_eq!(paged.entries.len(), 4);

        let statements = driver.statements();
        assert!(statements[1].contains("LIMIT 1 OFFSET 3"));
    }

    #[test]
    fn base_scope_binds_the_exact_key() {
        let driver = Arc::new(FakeDriver::default());
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().scoped(SearchScope::Base);

        service.search(&base, &expr, &request, None).unwrap();

        assert!(driver.statements()[0].contains("doc_id = $doc_key"));
        assert_eq!(
            driver.params()[0].get("doc_key"),
            Some(&JsonValue::String("people_x1".to_string()))
        );
    }

    #[test]
    fn base_scope_on_the_root_key_still_binds() {
        let driver = Arc::new(FakeDriver::default());
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().scoped(SearchScope::Base);

        service.search(&base, &expr, &request, None).unwrap();

        assert_eq!(
            driver.params()[0].get("doc_key"),
            Some(&JsonValue::String("_".to_string()))
        );
    }

    #[test]
    fn count_honors_the_requested_scope() {
        let driver = Arc::new(FakeDriver::with_pages(vec![vec![
            serde_json::json!({ "total": 1 }),
        ]]));
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default()
            .scoped(SearchScope::Base)
            .returning(SearchReturnKind::Count);

        service.search(&base, &expr, &request, None).unwrap();

        let statement = &driver.statements()[0];
        assert!(statement.contains("doc_id = $doc_key"));
        assert!(!statement.contains("doc_id LIKE"));
        assert_eq!(
            driver.params()[0].get("doc_key"),
            Some(&JsonValue::String("people_x1".to_string()))
        );
    }

    #[test]
    fn count_mode_fetches_no_entries() {
        let driver = Arc::new(FakeDriver::with_pages(vec![vec![
            serde_json::json!({ "total": 42 }),
        ]]));
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().returning(SearchReturnKind::Count);

        let paged = service.search(&base, &expr, &request, None).unwrap();
        assert_eq!(paged.total_entries_count, 42);
        assert!(paged.entries.is_empty());
        assert!(driver.statements()[0].starts_with("SELECT COUNT(*) AS total"));
    }

    #[test]
    fn batch_handler_sees_every_chunk() {
        struct Collector {
            chunks: Vec<usize>,
        }
        impl BatchOperation<EntryRecord> for Collector {
            fn collect_search_result(&mut self, _size: usize) -> bool {
                false
            }
            fn perform_action(&mut self, entries: Vec<EntryRecord>) {
                self.chunks.push(entries.len());
            }
        }

        let pages = vec![
            (0..3).map(body).collect::<Vec<_>>(),
            (3..5).map(body).collect::<Vec<_>>(),
        ];
        let driver = Arc::new(FakeDriver::with_pages(pages));
        let service = DocumentOperationService::new(driver, "data");

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::presence("uid"));
        let request = SearchRequest::default().chunked(3);

        let mut collector = Collector { chunks: Vec::new() };
        let paged = service
            .search(&base, &expr, &request, Some(&mut collector))
            .unwrap();

        assert_eq!(collector.chunks, vec![3, 2]);
        // handler declined collection, so nothing accumulates
        assert!(paged.entries.is_empty());
    }

    #[test]
    fn delete_by_filter_appends_limit() {
        let driver = Arc::new(FakeDriver::default());
        let service = DocumentOperationService::new(driver.clone(), "data");

        let base = ParsedKey::from_dn("ou=people,o=org").unwrap();
        let expr = compile(&Filter::equality("uid", "stale"));
        let removed = service.delete_by_filter(&base, &expr, Some(10)).unwrap();

        assert_eq!(removed, 4);
        let statement = &driver.statements()[0];
        assert!(statement.starts_with("DELETE FROM data AS doc WHERE"));
        assert!(statement.ends_with("LIMIT 10"));
    }

    #[test]
    fn record_round_trips_through_body() {
        let key = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let attrs = vec![
            AttributeData::single("uid", "admin"),
            AttributeData::multi("memberOf", vec!["a".into(), "b".into()]),
        ];
        let body = body_from_attributes(&key, &attrs);

        let record = record_from_body(&body, None);
        assert_eq!(record.dn, "inum=x1,ou=people,o=org");
        assert_eq!(record.text_value("uid"), Some("admin"));
        assert_eq!(record.attribute("memberOf").unwrap().values.len(), 2);
    }

    #[test]
    fn projection_filters_returned_attributes() {
        let key = ParsedKey::from_dn("inum=x1,ou=people,o=org").unwrap();
        let attrs = vec![
            AttributeData::single("uid", "admin"),
            AttributeData::single("mail", "a@b"),
        ];
        let body = body_from_attributes(&key, &attrs);

        let record = record_from_body(&body, Some(&["uid".to_string()]));
        assert!(record.attribute("uid").is_some());
        assert!(record.attribute("mail").is_none());
    }
}

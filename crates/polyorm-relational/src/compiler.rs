use crate::mapping::{AttributeLocation, ColumnKind, TableMapping};
use polyorm_core::{
    DOC_ALIAS, DOC_ID,
    compile::{ParamTable, or_in_rewrite, substring_like_pattern},
    error::SearchError,
    filter::{Filter, FilterKind, Target, raw},
    schema::EntitySchema,
    value::{Value, encode_time},
};
use std::fmt;

///
/// JoinSpec
///
/// One child-table join, keyed by attribute so a twice-referenced
/// attribute joins once.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinSpec {
    pub attribute: String,
    pub child_table: String,
    pub clause: String,
}

///
/// SqlExpression
///
/// Compiled filter in the SQL dialect: the WHERE fragment with `@name`
/// placeholders, bound parameters, accumulated joins, and the consistency
/// flag.
///

#[derive(Debug)]
pub struct SqlExpression {
    /// Table the expression was compiled against.
    pub table: String,
    pub fragment: String,
    pub params: ParamTable<Value>,
    pub joins: Vec<JoinSpec>,
    pub requires_consistency: bool,
}

impl SqlExpression {
    /// Render the join clauses in accumulation order.
    #[must_use]
    pub fn join_clause(&self) -> String {
        self.joins
            .iter()
            .map(|j| format!(" {}", j.clause))
            .collect()
    }
}

impl fmt::Display for SqlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fragment)
    }
}

///
/// SqlCompiler
///
/// Filter to SQL compiler over one table mapping. Every attribute must
/// resolve to a column or child table; native-array columns compile to an
/// existential UNNEST sub-select, child tables to a deduplicated join.
///

pub struct SqlCompiler<'a> {
    schema: &'a EntitySchema,
    mapping: &'a TableMapping,
}

struct CompileState {
    params: ParamTable<Value>,
    joins: Vec<JoinSpec>,
    requires_consistency: bool,
}

impl<'a> SqlCompiler<'a> {
    #[must_use]
    pub const fn new(schema: &'a EntitySchema, mapping: &'a TableMapping) -> Self {
        Self { schema, mapping }
    }

    pub fn compile(&self, filter: &Filter) -> Result<SqlExpression, SearchError> {
        let mut state = CompileState {
            params: ParamTable::new(),
            joins: Vec::new(),
            requires_consistency: false,
        };
        let fragment = self.node(filter, &mut state)?;

        Ok(SqlExpression {
            table: self.mapping.table_name().to_string(),
            fragment,
            params: state.params,
            joins: state.joins,
            requires_consistency: state.requires_consistency,
        })
    }

    fn node(&self, filter: &Filter, state: &mut CompileState) -> Result<String, SearchError> {
        match &filter.kind {
            FilterKind::And(children) => self.join_children(children, "AND", state),

            FilterKind::Or(children) => {
                if let Some(rewrite) = or_in_rewrite(children, self.schema) {
                    // only a scalar column can host the IN-list
                    if self.mapping.resolve(rewrite.attribute)?
                        == AttributeLocation::Column(ColumnKind::Scalar)
                    {
                        self.touch(rewrite.attribute, state);
                        return Ok(format!(
                            "{DOC_ALIAS}.{} IN ({})",
                            rewrite.attribute,
                            rewrite
                                .values
                                .iter()
                                .map(|v| sql_literal(v))
                                .collect::<Vec<_>>()
                                .join(", ")
                        ));
                    }
                }
                self.join_children(children, "OR", state)
            }

            FilterKind::Not(inner) => {
                let inner = self.node(inner, state)?;
                Ok(format!("NOT ( {inner} )"))
            }

            FilterKind::Equality { target, value } => match target {
                Target::Attribute(attribute) => {
                    self.touch(attribute, state);
                    let name = state.params.bind(attribute, value.clone());
                    self.predicate(attribute, state, &format!("= @{name}"))
                }
                Target::Wrapped(inner) => self.lowered_equality(inner, value, state),
            },

            FilterKind::GreaterOrEqual { attribute, value } => {
                self.touch(attribute, state);
                let name = state.params.bind(attribute, value.clone());
                self.predicate(attribute, state, &format!(">= @{name}"))
            }

            FilterKind::LessOrEqual { attribute, value } => {
                self.touch(attribute, state);
                let name = state.params.bind(attribute, value.clone());
                self.predicate(attribute, state, &format!("<= @{name}"))
            }

            FilterKind::Presence { attribute } => {
                self.touch(attribute, state);
                self.predicate(attribute, state, "IS NOT NULL")
            }

            FilterKind::Substring(sub) => {
                self.touch(&sub.attribute, state);
                let pattern = substring_like_pattern(sub);
                let name = state.params.bind(&sub.attribute, Value::Text(pattern));
                self.predicate(&sub.attribute, state, &format!("LIKE @{name}"))
            }

            FilterKind::ApproximateMatch { .. } => Err(SearchError::ApproximateMatchUnsupported),

            FilterKind::Lowercase { attribute } => Err(SearchError::InvalidSubFilter {
                attribute: attribute.clone(),
            }),

            FilterKind::Raw(_) => {
                let resolved = raw::resolve(filter)?;
                self.node(&resolved, state)
            }
        }
    }

    /// Predicate `<column-ref> <operation>`, placed according to where the
    /// attribute physically lives.
    fn predicate(
        &self,
        attribute: &str,
        state: &mut CompileState,
        operation: &str,
    ) -> Result<String, SearchError> {
        match self.mapping.resolve(attribute)? {
            AttributeLocation::Column(ColumnKind::Scalar) => {
                Ok(format!("{DOC_ALIAS}.{attribute} {operation}"))
            }
            AttributeLocation::Column(ColumnKind::Array) => Ok(format!(
                "EXISTS (SELECT 1 FROM UNNEST({DOC_ALIAS}.{attribute}) {attribute}_ \
                 WHERE {attribute}_ {operation})"
            )),
            AttributeLocation::ChildTable(table) => {
                self.add_join(attribute, table, state);
                Ok(format!("{attribute}.{attribute} {operation}"))
            }
        }
    }

    fn lowered_equality(
        &self,
        inner: &Filter,
        value: &Value,
        state: &mut CompileState,
    ) -> Result<String, SearchError> {
        let FilterKind::Lowercase { attribute } = &inner.kind else {
            return Err(SearchError::InvalidSubFilter {
                attribute: inner.attribute_name().unwrap_or_default().to_string(),
            });
        };
        if self.mapping.resolve(attribute)? != AttributeLocation::Column(ColumnKind::Scalar) {
            return Err(SearchError::InvalidSubFilter {
                attribute: attribute.clone(),
            });
        }

        self.touch(attribute, state);
        let name = state.params.bind(attribute, value.clone());

        Ok(format!("LOWER({DOC_ALIAS}.{attribute}) = @{name}"))
    }

    fn join_children(
        &self,
        children: &[Filter],
        op: &str,
        state: &mut CompileState,
    ) -> Result<String, SearchError> {
        if children.is_empty() {
            return Err(SearchError::EmptyFilter);
        }

        let parts = children
            .iter()
            .map(|child| {
                self.node(child, state)
                    .map(|fragment| format!("( {fragment} )"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parts.join(&format!(" {op} ")))
    }

    fn add_join(&self, attribute: &str, table: &str, state: &mut CompileState) {
        let exists = state
            .joins
            .iter()
            .any(|j| j.attribute.eq_ignore_ascii_case(attribute));
        if exists {
            return;
        }

        state.joins.push(JoinSpec {
            attribute: attribute.to_string(),
            child_table: table.to_string(),
            clause: format!(
                "JOIN {table} {attribute} ON {DOC_ALIAS}.{DOC_ID} = {attribute}.{DOC_ID}"
            ),
        });
    }

    fn touch(&self, attribute: &str, state: &mut CompileState) {
        if self.schema.requires_consistency(attribute) {
            state.requires_consistency = true;
        }
    }
}

/// Render a value as an inline SQL literal. Strings are single-quoted with
/// embedded quotes doubled.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Timestamp(ts) => format!("'{}'", encode_time(*ts)),
        Value::Null => "NULL".to_string(),
    }
}

///
/// TESTS
///

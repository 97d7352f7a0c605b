use polyorm_core::{
    compile::{ParamTable, Resolution, or_in_rewrite, resolve_multi_valued, substring_like_pattern},
    error::SearchError,
    filter::{Filter, FilterKind, Target, raw},
    schema::EntitySchema,
    value::Value,
};
use std::fmt;

///
/// DocumentExpression
///
/// Compiled filter in the document dialect: the predicate fragment with
/// `$name` placeholders, the ordered parameter table, and whether the query
/// must read its own writes.
///

#[derive(Debug)]
pub struct DocumentExpression {
    pub fragment: String,
    pub params: ParamTable<Value>,
    pub requires_consistency: bool,
}

impl fmt::Display for DocumentExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fragment)
    }
}

///
/// DocumentCompiler
///
/// Filter to document-dialect compiler. Multi-valued predicates take the
/// quantifier form `ANY x_ IN attr SATISFIES ... END`; attributes with
/// unknown multi-valuedness compile as plain scalar comparisons.
///

pub struct DocumentCompiler<'a> {
    schema: &'a EntitySchema,
}

impl<'a> DocumentCompiler<'a> {
    #[must_use]
    pub const fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    pub fn compile(&self, filter: &Filter) -> Result<DocumentExpression, SearchError> {
        let mut expr = DocumentExpression {
            fragment: String::new(),
            params: ParamTable::new(),
            requires_consistency: false,
        };
        expr.fragment = self.node(filter, &mut expr.params, &mut expr.requires_consistency)?;

        Ok(expr)
    }

    fn node(
        &self,
        filter: &Filter,
        params: &mut ParamTable<Value>,
        consistency: &mut bool,
    ) -> Result<String, SearchError> {
        match &filter.kind {
            FilterKind::And(children) => self.join(children, "AND", params, consistency),

            FilterKind::Or(children) => {
                if let Some(rewrite) = or_in_rewrite(children, self.schema) {
                    self.touch(rewrite.attribute, consistency);
                    return Ok(format!(
                        "{} IN [ {} ]",
                        rewrite.attribute,
                        rewrite
                            .values
                            .iter()
                            .map(|v| v.to_json().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                self.join(children, "OR", params, consistency)
            }

            FilterKind::Not(inner) => {
                let inner = self.node(inner, params, consistency)?;
                Ok(format!("NOT ( {inner} )"))
            }

            FilterKind::Equality { target, value } => {
                self.equality(filter, target, value, params, consistency)
            }

            FilterKind::GreaterOrEqual { attribute, value } => {
                self.comparison(filter, attribute, ">=", value, params, consistency)
            }

            FilterKind::LessOrEqual { attribute, value } => {
                self.comparison(filter, attribute, "<=", value, params, consistency)
            }

            FilterKind::Presence { attribute } => {
                self.touch(attribute, consistency);
                match resolve_multi_valued(filter, attribute, self.schema) {
                    Resolution::Multi => Ok(format!(
                        "ANY {attribute}_ IN {attribute} SATISFIES {attribute}_ IS NOT MISSING END"
                    )),
                    Resolution::Single | Resolution::Unknown => {
                        Ok(format!("{attribute} IS NOT MISSING"))
                    }
                }
            }

            FilterKind::Substring(sub) => {
                self.touch(&sub.attribute, consistency);
                let pattern = substring_like_pattern(sub);
                let name = params.bind(&sub.attribute, Value::Text(pattern));
                match resolve_multi_valued(filter, &sub.attribute, self.schema) {
                    Resolution::Multi => Ok(format!(
                        "ANY {attr}_ IN {attr} SATISFIES {attr}_ LIKE ${name} END",
                        attr = sub.attribute
                    )),
                    Resolution::Single | Resolution::Unknown => {
                        Ok(format!("{} LIKE ${name}", sub.attribute))
                    }
                }
            }

            FilterKind::ApproximateMatch { .. } => Err(SearchError::ApproximateMatchUnsupported),

            FilterKind::Lowercase { attribute } => Err(SearchError::InvalidSubFilter {
                attribute: attribute.clone(),
            }),

            FilterKind::Raw(_) => {
                let resolved = raw::resolve(filter)?;
                self.node(&resolved, params, consistency)
            }
        }
    }

    fn comparison(
        &self,
        filter: &Filter,
        attribute: &str,
        op: &str,
        value: &Value,
        params: &mut ParamTable<Value>,
        consistency: &mut bool,
    ) -> Result<String, SearchError> {
        self.touch(attribute, consistency);
        let name = params.bind(attribute, value.clone());
        match resolve_multi_valued(filter, attribute, self.schema) {
            Resolution::Multi => Ok(format!(
                "ANY {attribute}_ IN {attribute} SATISFIES {attribute}_ {op} ${name} END"
            )),
            Resolution::Single | Resolution::Unknown => Ok(format!("{attribute} {op} ${name}")),
        }
    }

    fn equality(
        &self,
        filter: &Filter,
        target: &Target,
        value: &Value,
        params: &mut ParamTable<Value>,
        consistency: &mut bool,
    ) -> Result<String, SearchError> {
        match target {
            Target::Attribute(attribute) => {
                self.touch(attribute, consistency);
                let name = params.bind(attribute, value.clone());
                match resolve_multi_valued(filter, attribute, self.schema) {
                    Resolution::Multi => Ok(format!(
                        "ANY {attribute}_ IN {attribute} SATISFIES {attribute}_ = ${name} END"
                    )),
                    Resolution::Single | Resolution::Unknown => {
                        Ok(format!("{attribute} = ${name}"))
                    }
                }
            }
            Target::Wrapped(inner) => match &inner.kind {
                FilterKind::Lowercase { attribute } => {
                    self.touch(attribute, consistency);
                    let name = params.bind(attribute, value.clone());
                    Ok(format!("LOWER( {attribute} ) = ${name}"))
                }
                _ => Err(SearchError::InvalidSubFilter {
                    attribute: inner.attribute_name().unwrap_or_default().to_string(),
                }),
            },
        }
    }

    fn join(
        &self,
        children: &[Filter],
        op: &str,
        params: &mut ParamTable<Value>,
        consistency: &mut bool,
    ) -> Result<String, SearchError> {
        if children.is_empty() {
            return Err(SearchError::EmptyFilter);
        }

        let parts = children
            .iter()
            .map(|child| {
                self.node(child, params, consistency)
                    .map(|fragment| format!("( {fragment} )"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parts.join(&format!(" {op} ")))
    }

    fn touch(&self, attribute: &str, consistency: &mut bool) {
        if self.schema.requires_consistency(attribute) {
            *consistency = true;
        }
    }
}

///
/// TESTS
///

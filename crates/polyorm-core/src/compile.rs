//! Backend-neutral compilation helpers shared by the filter compilers:
//! parameter naming, the substring LIKE pattern, multi-valued resolution,
//! and detection of the OR-of-equalities to IN-list rewrite.

use crate::{
    filter::{Filter, FilterKind, Substring, Target},
    schema::{EntitySchema, MultiValued},
    value::Value,
};

///
/// ParamTable
///
/// Ordered bind-parameter table. Names are derived from the attribute and
/// deduplicated with a numeric suffix: `attr`, `attr_0`, `attr_1`, ...
///

#[derive(Clone, Debug, Default)]
pub struct ParamTable<V> {
    entries: Vec<(String, V)>,
}

impl<V> ParamTable<V> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Bind a value, returning the unique parameter name allocated for it.
    pub fn bind(&mut self, base_name: &str, value: V) -> String {
        let name = self.unique_name(base_name);
        self.entries.push((name.clone(), value));
        name
    }

    fn unique_name(&self, base_name: &str) -> String {
        if !self.contains(base_name) {
            return base_name.to_string();
        }
        let mut suffix = 0;
        loop {
            let candidate = format!("{base_name}_{suffix}");
            if !self.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Absorb another table, keeping its binding order.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }
}

///
/// Resolution
///
/// Outcome of multi-valued resolution for one filter node.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    Multi,
    Single,
    /// No override and no metadata. Compiles as a scalar comparison.
    Unknown,
}

/// Resolve multi-valuedness: node override first, schema metadata second,
/// `Unknown` otherwise.
#[must_use]
pub fn resolve_multi_valued(filter: &Filter, attribute: &str, schema: &EntitySchema) -> Resolution {
    match filter.multi_valued {
        Some(true) => Resolution::Multi,
        Some(false) => Resolution::Single,
        None => match schema.multi_valued(attribute) {
            MultiValued::True => Resolution::Multi,
            MultiValued::False => Resolution::Single,
            MultiValued::Unknown => Resolution::Unknown,
        },
    }
}

/// Assemble the LIKE pattern for a substring assertion: `initial`, then `%`
/// before each `any` part and the final part. No other wildcards are added,
/// so `initial`-only becomes `x%` and an empty assertion is `%`.
#[must_use]
pub fn substring_like_pattern(sub: &Substring) -> String {
    let mut pattern = String::new();
    if let Some(initial) = &sub.initial {
        pattern.push_str(initial);
    }
    for any in &sub.any {
        pattern.push('%');
        pattern.push_str(any);
    }
    pattern.push('%');
    if let Some(final_part) = &sub.final_part {
        pattern.push_str(final_part);
    }

    pattern
}

///
/// InRewrite
///
/// An OR of plain equalities on one attribute, collapsed to an IN-list.
///

#[derive(Clone, Debug, PartialEq)]
pub struct InRewrite<'a> {
    pub attribute: &'a str,
    pub values: Vec<&'a Value>,
}

/// Detect whether an OR's children collapse to a single IN-list.
///
/// The rewrite applies only when every child is a plain equality on the
/// same attribute, no child carries an override, and the attribute is
/// resolved single-valued. Anything else keeps the literal OR, so the
/// conservative scalar fallback for unknown attributes is never observable
/// through a rewritten list.
#[must_use]
pub fn or_in_rewrite<'a>(children: &'a [Filter], schema: &EntitySchema) -> Option<InRewrite<'a>> {
    if children.len() < 2 {
        return None;
    }

    let mut attribute: Option<&str> = None;
    let mut values = Vec::with_capacity(children.len());

    for child in children {
        if !child.is_plain_equality() || child.multi_valued.is_some() {
            return None;
        }
        let FilterKind::Equality {
            target: Target::Attribute(attr),
            value,
        } = &child.kind
        else {
            return None;
        };
        match attribute {
            None => attribute = Some(attr),
            Some(prev) if prev.eq_ignore_ascii_case(attr) => {}
            Some(_) => return None,
        }
        values.push(value);
    }

    let attribute = attribute?;
    if schema.multi_valued(attribute) != MultiValued::False {
        return None;
    }

    Some(InRewrite { attribute, values })
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeMetadata;
    use proptest::prelude::*;

    fn schema() -> EntitySchema {
        EntitySchema::new(vec!["person".into()])
            .with_attribute(AttributeMetadata::new("uid", MultiValued::False))
            .with_attribute(AttributeMetadata::new("memberOf", MultiValued::True))
    }

    #[test]
    fn param_names_deduplicate_with_suffix() {
        let mut params = ParamTable::new();
        assert_eq!(params.bind("uid", Value::from("a")), "uid");
        assert_eq!(params.bind("uid", Value::from("b")), "uid_0");
        assert_eq!(params.bind("uid", Value::from("c")), "uid_1");
        assert_eq!(params.bind("mail", Value::from("d")), "mail");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn like_pattern_shapes() {
        let full = Substring {
            attribute: "cn".into(),
            initial: Some("a".into()),
            any: vec!["b".into(), "c".into()],
            final_part: Some("d".into()),
        };
        assert_eq!(substring_like_pattern(&full), "a%b%c%d");

        let initial_only = Substring {
            attribute: "cn".into(),
            initial: Some("x".into()),
            any: vec![],
            final_part: None,
        };
        assert_eq!(substring_like_pattern(&initial_only), "x%");

        let empty = Substring {
            attribute: "cn".into(),
            initial: None,
            any: vec![],
            final_part: None,
        };
        assert_eq!(substring_like_pattern(&empty), "%");
    }

    #[test]
    fn resolution_order_is_override_then_schema() {
        let schema = schema();
        let f = Filter::equality("memberOf", "x").single_valued();
        assert_eq!(
            resolve_multi_valued(&f, "memberOf", &schema),
            Resolution::Single
        );

        let f = Filter::equality("memberOf", "x");
        assert_eq!(
            resolve_multi_valued(&f, "memberOf", &schema),
            Resolution::Multi
        );

        let f = Filter::equality("mail", "x");
        assert_eq!(resolve_multi_valued(&f, "mail", &schema), Resolution::Unknown);
    }

    #[test]
    fn or_collapses_same_attribute_equalities() {
        let children = vec![
            Filter::equality("uid", "a"),
            Filter::equality("uid", "b"),
            Filter::equality("uid", "c"),
        ];
        let rewrite = or_in_rewrite(&children, &schema()).unwrap();
        assert_eq!(rewrite.attribute, "uid");
        assert_eq!(rewrite.values.len(), 3);
    }

    #[test]
    fn rewrite_refused_for_mixed_attributes() {
        let children = vec![Filter::equality("uid", "a"), Filter::equality("mail", "b")];
        assert!(or_in_rewrite(&children, &schema()).is_none());
    }

    #[test]
    fn rewrite_refused_for_multi_valued_or_unknown_attribute() {
        let schema = schema();
        let multi = vec![
            Filter::equality("memberOf", "a"),
            Filter::equality("memberOf", "b"),
        ];
        assert!(or_in_rewrite(&multi, &schema).is_none());

        let unknown = vec![Filter::equality("mail", "a"), Filter::equality("mail", "b")];
        assert!(or_in_rewrite(&unknown, &schema).is_none());
    }

    #[test]
    fn rewrite_refused_when_child_carries_override() {
        let children = vec![
            Filter::equality("uid", "a").multi_valued(),
            Filter::equality("uid", "b"),
        ];
        assert!(or_in_rewrite(&children, &schema()).is_none());
    }

    #[test]
    fn rewrite_refused_for_wrapped_targets() {
        let children = vec![
            Filter::equality_of(Filter::lowercase("uid"), "a"),
            Filter::equality("uid", "b"),
        ];
        assert!(or_in_rewrite(&children, &schema()).is_none());
    }

    proptest! {
        /// Membership in the rewritten IN-list is exactly the disjunction
        /// of the original equalities, for any stored scalar.
        #[test]
        fn in_rewrite_preserves_or_semantics(
            list in proptest::collection::vec("[a-z]{1,6}", 2..8),
            stored in "[a-z]{1,6}",
        ) {
            let children: Vec<Filter> = list
                .iter()
                .map(|v| Filter::equality("uid", v.as_str()))
                .collect();
            let rewrite = or_in_rewrite(&children, &schema()).unwrap();

            let stored_value = Value::from(stored.as_str());
            let or_matches = list.iter().any(|v| Value::from(v.as_str()) == stored_value);
            let in_matches = rewrite.values.contains(&&stored_value);

            prop_assert_eq!(or_matches, in_matches);
        }
    }
}

pub mod raw;

use crate::value::Value;

///
/// Filter
///
/// Immutable boolean predicate tree over entity attributes. Pure data with
/// no backend knowledge; backends compile it into their native query form.
///
/// Every node optionally carries an explicit multi-valued override, which
/// takes precedence over schema metadata during compilation.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub kind: FilterKind,
    pub multi_valued: Option<bool>,
}

///
/// FilterKind
///
/// `Raw` holds a legacy textual filter and is eagerly reparsed into the
/// structured variants before compilation; compilers never see it.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FilterKind {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { target: Target, value: Value },
    GreaterOrEqual { attribute: String, value: Value },
    LessOrEqual { attribute: String, value: Value },
    Presence { attribute: String },
    Substring(Substring),
    ApproximateMatch { attribute: String, value: Value },
    Lowercase { attribute: String },
    Raw(String),
}

///
/// Target
///
/// Left side of an equality: either a plain attribute or a wrapping
/// sub-filter (e.g. matching against the lower-cased attribute).
///

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Attribute(String),
    Wrapped(Box<Filter>),
}

///
/// Substring
///

#[derive(Clone, Debug, PartialEq)]
pub struct Substring {
    pub attribute: String,
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_part: Option<String>,
}

impl Filter {
    const fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            multi_valued: None,
        }
    }

    // --- Combinators ---

    #[must_use]
    pub const fn and(filters: Vec<Self>) -> Self {
        Self::new(FilterKind::And(filters))
    }

    #[must_use]
    pub const fn or(filters: Vec<Self>) -> Self {
        Self::new(FilterKind::Or(filters))
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(filter: Self) -> Self {
        Self::new(FilterKind::Not(Box::new(filter)))
    }

    // --- Leaves ---

    #[must_use]
    pub fn equality(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterKind::Equality {
            target: Target::Attribute(attribute.into()),
            value: value.into(),
        })
    }

    /// Equality whose left side is itself a filter, e.g.
    /// `equality_of(lowercase("uid"), "admin")`.
    #[must_use]
    pub fn equality_of(target: Self, value: impl Into<Value>) -> Self {
        Self::new(FilterKind::Equality {
            target: Target::Wrapped(Box::new(target)),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn greater_or_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterKind::GreaterOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn less_or_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterKind::LessOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn presence(attribute: impl Into<String>) -> Self {
        Self::new(FilterKind::Presence {
            attribute: attribute.into(),
        })
    }

    #[must_use]
    pub fn substring(
        attribute: impl Into<String>,
        initial: Option<&str>,
        any: &[&str],
        final_part: Option<&str>,
    ) -> Self {
        Self::new(FilterKind::Substring(Substring {
            attribute: attribute.into(),
            initial: initial.map(ToString::to_string),
            any: any.iter().map(ToString::to_string).collect(),
            final_part: final_part.map(ToString::to_string),
        }))
    }

    #[must_use]
    pub fn approximate_match(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterKind::ApproximateMatch {
            attribute: attribute.into(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn lowercase(attribute: impl Into<String>) -> Self {
        Self::new(FilterKind::Lowercase {
            attribute: attribute.into(),
        })
    }

    #[must_use]
    pub fn raw(filter: impl Into<String>) -> Self {
        Self::new(FilterKind::Raw(filter.into()))
    }

    // --- Multi-valued override ---

    /// Force the attribute to compile as multi-valued.
    #[must_use]
    pub const fn multi_valued(mut self) -> Self {
        self.multi_valued = Some(true);
        self
    }

    /// Force the attribute to compile as single-valued.
    #[must_use]
    pub const fn single_valued(mut self) -> Self {
        self.multi_valued = Some(false);
        self
    }

    // --- Introspection ---

    /// The attribute this node asserts against, descending through wrapped
    /// targets. Combinators have no attribute of their own.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Equality { target, .. } => match target {
                Target::Attribute(attr) => Some(attr),
                Target::Wrapped(inner) => inner.attribute_name(),
            },
            FilterKind::GreaterOrEqual { attribute, .. }
            | FilterKind::LessOrEqual { attribute, .. }
            | FilterKind::Presence { attribute }
            | FilterKind::ApproximateMatch { attribute, .. }
            | FilterKind::Lowercase { attribute } => Some(attribute),
            FilterKind::Substring(sub) => Some(&sub.attribute),
            FilterKind::And(_) | FilterKind::Or(_) | FilterKind::Not(_) | FilterKind::Raw(_) => {
                None
            }
        }
    }

    /// Plain equality on a named attribute with no wrapped target.
    #[must_use]
    pub const fn is_plain_equality(&self) -> bool {
        matches!(
            self.kind,
            FilterKind::Equality {
                target: Target::Attribute(_),
                ..
            }
        )
    }
}

///
/// TESTS
///

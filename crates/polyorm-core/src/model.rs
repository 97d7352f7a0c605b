use crate::value::Value;
use derive_more::Display;
use serde::Serialize;

///
/// AttributeData
///
/// One named attribute with its values. `multi_valued` is the writer's
/// declaration; `None` means unknown and the schema decides.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttributeData {
    pub name: String,
    pub values: Vec<Value>,
    pub multi_valued: Option<bool>,
}

impl AttributeData {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            multi_valued: None,
        }
    }

    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
            multi_valued: Some(false),
        }
    }

    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            multi_valued: Some(true),
        }
    }

    /// First value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.values.first()
    }

    #[must_use]
    pub fn name_eq(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

///
/// ModificationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModificationKind {
    Add,
    Replace,
    Remove,
}

///
/// AttributeModification
///
/// Field-level change produced by the merge diff. `attribute` is the new
/// state (absent for `Remove`), `old_attribute` the previous one.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeModification {
    pub kind: ModificationKind,
    pub attribute: Option<AttributeData>,
    pub old_attribute: Option<AttributeData>,
}

impl AttributeModification {
    #[must_use]
    pub const fn add(attribute: AttributeData) -> Self {
        Self {
            kind: ModificationKind::Add,
            attribute: Some(attribute),
            old_attribute: None,
        }
    }

    #[must_use]
    pub const fn replace(old: AttributeData, new: AttributeData) -> Self {
        Self {
            kind: ModificationKind::Replace,
            attribute: Some(new),
            old_attribute: Some(old),
        }
    }

    #[must_use]
    pub const fn remove(old: AttributeData) -> Self {
        Self {
            kind: ModificationKind::Remove,
            attribute: None,
            old_attribute: Some(old),
        }
    }

    /// Name of the attribute being modified.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        self.attribute
            .as_ref()
            .or(self.old_attribute.as_ref())
            .map_or("", |a| a.name.as_str())
    }
}

///
/// EntryRecord
///
/// Raw backend record: the distinguished name plus the attribute list, not
/// yet converted to a typed entity.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EntryRecord {
    pub dn: String,
    pub attributes: Vec<AttributeData>,
}

impl EntryRecord {
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: Vec<AttributeData>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeData> {
        self.attributes.iter().find(|a| a.name_eq(name))
    }

    /// First value of the named attribute rendered as text.
    #[must_use]
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(AttributeData::value)
            .and_then(Value::as_text)
    }
}

///
/// PagedResult
///

#[derive(Clone, Debug, Default)]
pub struct PagedResult<T> {
    pub entries: Vec<T>,
    /// Total matching entries, populated only for `SearchCount`/`Count`.
    pub total_entries_count: usize,
    pub start: usize,
    pub entries_count: usize,
}

impl<T> PagedResult<T> {
    /// Re-wrap with converted entries, keeping the paging bookkeeping.
    pub fn map_entries<U>(self, entries: Vec<U>) -> PagedResult<U> {
        PagedResult {
            entries,
            total_entries_count: self.total_entries_count,
            start: self.start,
            entries_count: self.entries_count,
        }
    }
}

///
/// SearchScope
///
/// Neither backend stores real branches, so `Sub` means "everything under
/// the base key" and `Base` means the key itself.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SearchScope {
    Base,
    #[default]
    Sub,
}

///
/// Sort
///
/// `SortOrder` displays as the SQL keyword, which both compilers splice
/// into their ORDER BY clause.
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    #[display("ASC")]
    Ascending,
    #[display("DESC")]
    Descending,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sort {
    pub attribute: String,
    pub order: SortOrder,
}

impl Sort {
    #[must_use]
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    #[must_use]
    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

///
/// SearchReturnKind
///
/// What a search materializes: the entries, the entries plus the total
/// count, or the count alone.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SearchReturnKind {
    #[default]
    Search,
    SearchCount,
    Count,
}

///
/// TESTS
///

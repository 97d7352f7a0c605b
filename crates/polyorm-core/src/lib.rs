//! Backend-neutral core for PolyORM: the filter algebra, attribute metadata,
//! key codec, record model, batch materialization, and the generic entry
//! manager orchestration shared by every backend.

// public exports are one module level down
pub mod auth;
pub mod batch;
pub mod compile;
pub mod error;
pub mod filter;
pub mod key;
pub mod manager;
pub mod mapper;
pub mod model;
pub mod observer;
pub mod schema;
pub mod value;

///
/// CONSTANTS
///

/// Attribute carrying the entry's type discriminator.
///
/// The first object class selects the storage table on the relational
/// backend and scopes searches on the document backend, so it is always
/// written with single-value semantics.
pub const OBJECT_CLASS: &str = "objectClass";

/// Attribute carrying the entry's distinguished name.
pub const DN: &str = "dn";

/// Attribute carrying the unique bind identifier used by `authenticate`.
pub const UID: &str = "uid";

/// Attribute carrying the stored credential. Its value is transformed to
/// storage form on write and must never appear in logs or error messages.
pub const USER_PASSWORD: &str = "userPassword";

/// Native primary-key column/field name.
pub const DOC_ID: &str = "doc_id";

/// Alias for the parent row/document in compiled expressions.
pub const DOC_ALIAS: &str = "doc";

///
/// Prelude
///
/// Domain vocabulary only. Errors, drivers, and helpers are imported from
/// their own modules.
///

pub mod prelude {
    pub use crate::{
        filter::Filter,
        manager::{Backend, EntryManager, SearchRequest},
        mapper::EntityMapping,
        model::{AttributeData, PagedResult, SearchScope, Sort, SortOrder},
        schema::{AttributeMetadata, EntitySchema, MultiValued},
        value::Value,
    };
}

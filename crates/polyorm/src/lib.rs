//! ## Crate layout
//! - `core`: the filter algebra, schema metadata, key codec, record model,
//!   and the generic entry manager.
//! - `document`: the document-store backend and its N1QL-style compiler.
//! - `relational`: the relational backend with table mappings, joins, and
//!   the SQL compiler.
//!
//! The `prelude` module mirrors the surface a typical caller needs to wire
//! an entry manager onto one of the backends.

pub use polyorm_core as core;
pub use polyorm_document as document;
pub use polyorm_relational as relational;

pub mod prelude {
    pub use polyorm_core::prelude::*;
    pub use polyorm_document::{DocumentBackend, DocumentDriver, DocumentOperationService};
    pub use polyorm_relational::{
        RelationalBackend, RelationalDriver, RelationalOperationService,
    };
}

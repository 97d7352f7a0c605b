//! Relational backend: compiles filters to SQL over per-type tables with
//! array columns and child tables, executed through a `RelationalDriver`.

pub mod backend;
pub mod compiler;
pub mod driver;
pub mod mapping;
pub mod operation;

pub use backend::RelationalBackend;
pub use compiler::{JoinSpec, SqlCompiler, SqlExpression};
pub use driver::{RelationalDriver, SqlCell, SqlParam, SqlRow};
pub use mapping::{ColumnKind, MappingSource, TableMapping, TableMappingRegistry};
pub use operation::RelationalOperationService;
